//! Quay Core
//!
//! Core types and abstractions for the Quay pages deployment pipeline.
//!
//! This crate contains:
//! - Domain types: Runs, Jobs, Artifacts, Triggers and Permissions
//! - The job dependency graph used by the orchestrator's scheduler
//! - DTOs: Data transfer objects for the orchestrator API

pub mod domain;
pub mod dto;
pub mod graph;

pub use graph::{GraphError, JobGraph};
