//! Tutorboard Sandbox
//!
//! Host-side sandbox management: launching a sandbox for a whiteboard
//! session, probing it until healthy, and publishing its lifecycle status.

pub mod controller;
pub mod launcher;
pub mod probe;

pub use controller::{ControllerError, SandboxController};
pub use launcher::{HttpLauncher, LaunchError, SandboxLauncher};
pub use probe::{HealthCheck, HealthProber, HttpHealthCheck, ProbeConfig, ProbeError};
