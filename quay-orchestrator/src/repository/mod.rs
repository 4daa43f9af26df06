//! Repository Module
//!
//! In-memory storage for runs and their logs. Nothing survives a restart.

pub mod log;
pub mod run;

pub use log::LogRepository;
pub use run::{RepositoryError, RunRepository};
