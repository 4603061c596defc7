// ABOUTME: Command module aggregator for the keel CLI.
// ABOUTME: Re-exports hash and simulate command handlers.

mod hash;
mod simulate;

pub use hash::hash;
pub use simulate::simulate;
