// ABOUTME: Deduplicating, rate-limited work queue keyed by resource identity.
// ABOUTME: A key is never handed to two workers at once; re-adds during processing are deferred.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::backoff::Backoff;

/// Work queue shared by the event router (producers) and a worker pool (consumers).
///
/// Semantics:
/// - `add` of a key that is already waiting is a no-op.
/// - A key handed out by `get` is "processing" until `done`. Adding it again
///   in the meantime marks it dirty; it is queued again on `done`.
/// - `add_rate_limited` re-adds after a per-key exponential delay;
///   `forget` clears the key's failure history.
pub struct WorkQueue<K> {
    name: &'static str,
    state: Mutex<QueueState<K>>,
    notify: Notify,
    backoff: Backoff,
}

struct QueueState<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(name: &'static str, backoff: Backoff) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            backoff,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Mark `key` as needing reconciliation.
    pub fn add(&self, key: K) {
        {
            let mut state = self.state.lock();
            if state.shutting_down {
                return;
            }
            if !state.dirty.insert(key.clone()) {
                return;
            }
            if state.processing.contains(&key) {
                return;
            }
            state.queue.push_back(key);
        }
        self.notify.notify_one();
    }

    /// Add `key` after `delay`.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Record a failure for `key` and add it back after its backoff delay.
    pub fn add_rate_limited(self: &Arc<Self>, key: K) {
        let failures = {
            let mut state = self.state.lock();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            *failures
        };
        self.add_after(key, self.backoff.delay(failures));
    }

    /// Clear the failure history of `key`.
    pub fn forget(&self, key: &K) {
        self.state.lock().failures.remove(key);
    }

    /// Consecutive failures recorded for `key`.
    pub fn failures(&self, key: &K) -> u32 {
        self.state.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Finish processing `key`, re-queueing it if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.state.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys; every waiting `get` returns `None`.
    pub fn shut_down(&self) {
        self.state.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Number of keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when nothing is waiting and nothing is being processed.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && state.processing.is_empty()
    }
}
