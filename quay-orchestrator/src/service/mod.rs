//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and contain domain logic.

pub mod log;
pub mod run;

pub use run::{RunError, RunService};
