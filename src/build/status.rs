// ABOUTME: Rolls per-container build states up into a single Build state.
// ABOUTME: Pure functions so the aggregation table can be tested exhaustively.

use chrono::{DateTime, Utc};

use super::cache::ResolvedContainers;
use crate::model::{Build, BuildState, BuildStatus, ContainerBuildRefs, ContainerBuildState};
use crate::types::ServicePath;

/// Any Failed wins; otherwise Succeeded only if every state is Succeeded
/// (true for no containers at all); otherwise Running.
pub fn aggregate_state(states: impl IntoIterator<Item = ContainerBuildState>) -> BuildState {
    let mut all_succeeded = true;
    for state in states {
        match state {
            ContainerBuildState::Failed => return BuildState::Failed,
            ContainerBuildState::Succeeded => {}
            ContainerBuildState::Pending
            | ContainerBuildState::Queued
            | ContainerBuildState::Running => all_succeeded = false,
        }
    }
    if all_succeeded {
        BuildState::Succeeded
    } else {
        BuildState::Running
    }
}

/// Status `build` should have given the resolved container builds.
///
/// Timestamps are set once and then carried over, so recomputing from an
/// unchanged world yields an identical status.
pub fn next_status(build: &Build, resolved: &ResolvedContainers, now: DateTime<Utc>) -> BuildStatus {
    let mut status = build.status.clone();
    status.services = resolved.services.clone();
    status.jobs = resolved.jobs.clone();
    status.container_builds = resolved
        .container_builds
        .iter()
        .map(|(id, cb)| (id.clone(), cb.status.clone()))
        .collect();

    status.state = aggregate_state(status.container_builds.values().map(|s| s.state));
    status.observed_generation = build.meta.generation;
    status.started_at.get_or_insert(now);
    if status.state.is_terminal() {
        status.completed_at.get_or_insert(now);
    } else {
        status.completed_at = None;
    }
    status.message = match status.state {
        BuildState::Failed => failure_message(&status),
        _ => None,
    };
    status
}

fn failure_message(status: &BuildStatus) -> Option<String> {
    let workloads = status
        .services
        .iter()
        .map(|(path, refs)| ("service", path, refs))
        .chain(status.jobs.iter().map(|(path, refs)| ("job", path, refs)));

    for (kind, path, refs) in workloads {
        if let Some(message) = failed_container(status, kind, path, refs) {
            return Some(message);
        }
    }
    None
}

fn failed_container(
    status: &BuildStatus,
    kind: &str,
    path: &ServicePath,
    refs: &ContainerBuildRefs,
) -> Option<String> {
    let containers = std::iter::once(("main", &refs.main))
        .chain(refs.sidecars.iter().map(|(name, id)| (name.as_str(), id)));
    for (container, id) in containers {
        let Some(cb) = status.container_builds.get(id) else {
            continue;
        };
        if cb.state != ContainerBuildState::Failed {
            continue;
        }
        let detail = cb
            .failure
            .as_ref()
            .map(|f| f.message.as_str())
            .unwrap_or("no failure detail reported");
        return Some(format!(
            "container {container} of {kind} {path} failed (container build {id}): {detail}"
        ));
    }
    None
}
