// ABOUTME: In-process stand-ins for the image builder and service rollout.
// ABOUTME: Lets scenarios exercise the controllers without external systems.

mod builder;
mod rollout;
mod scenario;

pub use builder::FakeBuilder;
pub use rollout::FakeRollout;
pub use scenario::{
    ActionReport, BuilderSettings, RolloutSettings, Scenario, ScenarioAction, ScenarioReport,
    VersionEntry,
};
