// ABOUTME: Reconciliation machinery shared by every controller kind.
// ABOUTME: Work queues, backoff, the worker driver, event routing and the manager.

pub mod backoff;
pub mod driver;
pub mod error;
pub mod events;
pub mod index;
pub mod manager;
pub mod queue;

pub use backoff::Backoff;
pub use driver::{Controller, Reconciler};
pub use error::{ReconcileError, ReconcileErrorKind};
pub use events::{EventRouter, Queues, Routed};
pub use index::{Indices, ReferenceIndex};
pub use manager::ControllerManager;
pub use queue::WorkQueue;
