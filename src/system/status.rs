// ABOUTME: Rolls per-service observed status up into one System state.
// ABOUTME: Precedence is Degraded > Updating > Scaling > Stable.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::model::{ServiceState, ServiceStatus, System, SystemSpec, SystemState, SystemStatus};
use crate::types::ServicePath;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("service {path} reports a state this controller does not understand")]
    UnknownServiceState { path: ServicePath },

    #[error("service {path} observed generation {observed} ahead of its generation {generation}")]
    GenerationAhead {
        path: ServicePath,
        observed: u64,
        generation: u64,
    },
}

pub type Result<T> = std::result::Result<T, AggregateError>;

#[derive(Default)]
struct Flags {
    degraded: bool,
    updating: bool,
    scaling: bool,
}

/// Aggregate state of `observed` against the desired `spec` at spec
/// generation `generation`.
///
/// Service statuses carry the System generation they were computed for; a
/// status stamped with an older generation has not seen the current spec.
pub fn aggregate(
    generation: u64,
    spec: &SystemSpec,
    observed: &BTreeMap<ServicePath, ServiceStatus>,
) -> Result<SystemState> {
    let mut flags = Flags::default();

    // Desired but not reported yet: the downstream reconciler has not started.
    if spec.services.keys().any(|path| !observed.contains_key(path)) {
        flags.updating = true;
    }

    for (path, status) in observed {
        if status.observed_generation > status.generation {
            return Err(AggregateError::GenerationAhead {
                path: path.clone(),
                observed: status.observed_generation,
                generation: status.generation,
            });
        }
        if status.observed_generation < status.generation || status.generation < generation {
            flags.updating = true;
            continue;
        }
        match status.state {
            ServiceState::Failed => flags.degraded = true,
            ServiceState::Updating | ServiceState::Pending | ServiceState::Deleting => {
                flags.updating = true
            }
            ServiceState::Scaling => flags.scaling = true,
            ServiceState::Stable => {}
            ServiceState::Unknown => {
                return Err(AggregateError::UnknownServiceState { path: path.clone() })
            }
        }
        // Reported but no longer desired: still being removed.
        if !spec.services.contains_key(path) {
            flags.updating = true;
        }
    }

    Ok(if flags.degraded {
        SystemState::Degraded
    } else if flags.updating {
        SystemState::Updating
    } else if flags.scaling {
        SystemState::Scaling
    } else {
        SystemState::Stable
    })
}

/// Status `system` should have: aggregated state, with the current spec
/// generation marked as processed.
pub fn next_status(system: &System) -> Result<SystemStatus> {
    let state = aggregate(system.meta.generation, &system.spec, &system.status.services)?;
    Ok(SystemStatus {
        state,
        observed_generation: system.meta.generation,
        services: system.status.services.clone(),
    })
}
