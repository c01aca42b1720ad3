//! Command-line entry point: argument parsing, telemetry setup and the
//! actions the binary runs.

pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod start;
pub mod telemetry;

pub use start::start;
