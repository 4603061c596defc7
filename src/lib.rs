// ABOUTME: Library root for keel - build and deploy lifecycle controllers.
// ABOUTME: The main binary is in main.rs.

pub mod build;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod output;
pub mod resolver;
pub mod sim;
pub mod store;
pub mod system;
pub mod types;
