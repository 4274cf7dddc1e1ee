//! Test doubles for the host: in-memory filesystem, scripted command runner
//! and ready-made host scenarios.

mod filesystem;
mod runner;
pub mod scenarios;

pub use filesystem::MockFs;
pub use runner::{MockResponse, MockRunner};
