// ABOUTME: Lifecycle actions (Deploy, Teardown) and the per-System claim that serializes them.
// ABOUTME: Each action is a level-triggered state machine driven by its own controller.

mod claim;
mod deploy;
mod error;
mod teardown;

pub use claim::{ClaimManager, ClaimOutcome};
pub use deploy::{DeployController, desired_workloads};
pub use error::{ClaimError, ClaimErrorKind};
pub use teardown::TeardownController;

use crate::model::{ServiceState, System, SystemState};

/// How a System rollout started by an action is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rollout {
    /// The written generation is not processed yet, or services are still moving.
    Waiting,
    Stable,
    /// Names the failed services.
    Degraded(String),
}

pub(crate) fn rollout(system: &System, generation: u64) -> Rollout {
    if !system.update_processed(generation) {
        return Rollout::Waiting;
    }
    match system.status.state {
        SystemState::Updating | SystemState::Scaling => Rollout::Waiting,
        SystemState::Stable => Rollout::Stable,
        SystemState::Degraded => {
            let failed: Vec<String> = system
                .status
                .services
                .iter()
                .filter(|(_, status)| status.state == ServiceState::Failed)
                .map(|(path, status)| match &status.message {
                    Some(message) => format!("{path} ({message})"),
                    None => path.to_string(),
                })
                .collect();
            Rollout::Degraded(format!(
                "System {} degraded: failed services {}",
                system.meta.id,
                failed.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceStatus;
    use crate::types::{ServicePath, SystemId};

    fn system(state: SystemState, observed_generation: u64) -> System {
        let mut system = System::new(SystemId::new("petstore"));
        system.meta.generation = 2;
        system.status.state = state;
        system.status.observed_generation = observed_generation;
        system
    }

    #[test]
    fn unprocessed_generation_waits_regardless_of_state() {
        assert_eq!(rollout(&system(SystemState::Stable, 1), 2), Rollout::Waiting);
    }

    #[test]
    fn processed_generation_follows_state() {
        assert_eq!(rollout(&system(SystemState::Updating, 2), 2), Rollout::Waiting);
        assert_eq!(rollout(&system(SystemState::Scaling, 2), 2), Rollout::Waiting);
        assert_eq!(rollout(&system(SystemState::Stable, 2), 2), Rollout::Stable);
    }

    #[test]
    fn degraded_names_failed_services() {
        let mut degraded = system(SystemState::Degraded, 2);
        let mut failed = ServiceStatus::new(ServiceState::Failed, 2);
        failed.message = Some("crash loop".into());
        degraded
            .status
            .services
            .insert(ServicePath::new("/petstore/api").unwrap(), failed);

        match rollout(&degraded, 2) {
            Rollout::Degraded(message) => {
                assert!(message.contains("/petstore/api (crash loop)"));
            }
            other => panic!("expected degraded, got {other:?}"),
        }
    }
}
