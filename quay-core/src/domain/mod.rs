//! Core domain types
//!
//! This module contains the core domain structures used across Quay services.
//! These types are shared between the orchestrator (which schedules and records
//! runs) and the runner (which executes individual jobs).

pub mod artifact;
pub mod job;
pub mod log;
pub mod permissions;
pub mod pipeline;
pub mod run;
pub mod trigger;
