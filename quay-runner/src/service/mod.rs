//! Service layer
//!
//! Log collection shared between the runner and the orchestrator.

mod log_buffer;

pub use log_buffer::{InMemoryLogBuffer, LogSink};
