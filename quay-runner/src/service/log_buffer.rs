//! Log sinks
//!
//! Jobs write user-visible log entries through a `LogSink`. The orchestrator
//! supplies a sink that appends to the run's log; tests use the in-memory buffer.

use quay_core::domain::log::LogEntry;
use std::sync::{Arc, Mutex, MutexGuard};

/// Destination for job log entries
pub trait LogSink: Send + Sync {
    /// Adds a log entry
    fn add_entry(&self, entry: LogEntry);
}

/// In-memory implementation of LogSink
///
/// Uses Arc<Mutex<Vec<LogEntry>>> for thread-safe access across tasks.
#[derive(Clone, Default)]
pub struct InMemoryLogBuffer {
    buffer: Arc<Mutex<Vec<LogEntry>>>,
}

impl InMemoryLogBuffer {
    /// Creates a new in-memory log buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any buffered message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|e| e.message.contains(needle))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LogSink for InMemoryLogBuffer {
    fn add_entry(&self, entry: LogEntry) {
        self.lock().push(entry);
    }
}
