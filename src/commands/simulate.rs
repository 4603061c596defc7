// ABOUTME: Simulate command implementation.
// ABOUTME: Replays a scenario file and reports each action's outcome.

use keel::config::Config;
use keel::error::{Error, Result};
use keel::output::Output;
use keel::sim::{ActionReport, Scenario};
use std::path::Path;
use std::time::Duration;

/// Replay the scenario at `path`. Fails when any action does not succeed.
pub async fn simulate(path: &Path, config: Config, timeout: Duration, mut output: Output) -> Result<()> {
    let scenario = Scenario::load(path)?;
    output.start_timer();
    output.progress(&format!(
        "Replaying {} action(s) from {}",
        scenario.actions.len(),
        path.display()
    ));

    let report = scenario
        .run(config, timeout, |action| {
            output.record("action", &describe(action), action)
        })
        .await?;

    for warning in &report.warnings {
        output.record(
            "warning",
            &format!("  ! {} {}: {}", warning.resource, warning.key, warning.message),
            warning,
        );
    }

    let total = report.actions.len();
    let failed = report.actions.iter().filter(|a| !a.succeeded()).count();
    if failed > 0 {
        return Err(Error::ActionsFailed { failed, total });
    }

    output.success(&format!(
        "{total} action(s) succeeded, {} container build(s) created",
        report.container_builds
    ));
    Ok(())
}

fn describe(action: &ActionReport) -> String {
    match &action.message {
        Some(message) => format!("  {} ({}): {} - {message}", action.action, action.system, action.state),
        None => format!("  {} ({}): {}", action.action, action.system, action.state),
    }
}
