// ABOUTME: Compile-fail test verifying BuildId and DeployId are not interchangeable.
// ABOUTME: This test should fail to compile, validating type safety.

use keel::types::{BuildId, DeployId};

fn takes_build_id(_id: BuildId) {}

fn main() {
    let deploy_id = DeployId::new("d1");
    takes_build_id(deploy_id); // ERROR: expected BuildId, found DeployId
}
