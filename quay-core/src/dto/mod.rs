//! Data Transfer Objects for the orchestrator API
//!
//! DTOs are lightweight representations of domain entities shaped for the
//! HTTP boundary between the orchestrator, the client crate and the CLI.

pub mod event;
pub mod run;
