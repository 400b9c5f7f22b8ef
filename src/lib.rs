//! codelens library crate
//!
//! Exposes the review pipeline and the execution poller so benchmarks and
//! other front ends can drive them without going through the CLI.

pub mod config;
pub mod error;
pub mod execute;
pub mod progress;
pub mod review;
pub mod session;
pub mod source;
pub mod util;
