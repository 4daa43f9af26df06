//! Log Service
//!
//! Routes job and run log lines into the log repository.

use quay_core::domain::log::{LogEntry, LogLevel};
use quay_runner::LogSink;
use uuid::Uuid;

use crate::repository::LogRepository;

/// Validation limit for a single message; longer messages are truncated
const MAX_MESSAGE_LENGTH: usize = 10_000;

/// `LogSink` that stores entries under one run
#[derive(Clone)]
pub struct RunLogWriter {
    run_id: Uuid,
    logs: LogRepository,
}

impl RunLogWriter {
    pub fn new(run_id: Uuid, logs: LogRepository) -> Self {
        Self { run_id, logs }
    }

    /// Entry emitted by the orchestrator rather than a job
    pub fn run_event(&self, level: LogLevel, message: impl Into<String>) {
        self.add_entry(LogEntry::new(level, "run", message));
    }
}

impl LogSink for RunLogWriter {
    fn add_entry(&self, mut entry: LogEntry) {
        if entry.message.len() > MAX_MESSAGE_LENGTH {
            let mut cut = MAX_MESSAGE_LENGTH;
            while !entry.message.is_char_boundary(cut) {
                cut -= 1;
            }
            entry.message.truncate(cut);
        }
        self.logs.add_entry(self.run_id, entry);
    }
}

/// All entries for a run
pub fn get_run_logs(logs: &LogRepository, run_id: Uuid) -> Vec<LogEntry> {
    logs.find_by_run(run_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_tags_run_events() {
        let logs = LogRepository::new();
        let run_id = Uuid::new_v4();
        let writer = RunLogWriter::new(run_id, logs.clone());

        writer.run_event(LogLevel::Info, "Run started");
        writer.add_entry(LogEntry::new(LogLevel::Warning, "build", "slow"));

        let entries = get_run_logs(&logs, run_id);
        assert_eq!(entries[0].source, "run");
        assert_eq!(entries[1].level, LogLevel::Warning);
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let logs = LogRepository::new();
        let run_id = Uuid::new_v4();
        let writer = RunLogWriter::new(run_id, logs.clone());

        writer.add_entry(LogEntry::new(LogLevel::Info, "build", "é".repeat(MAX_MESSAGE_LENGTH)));

        let entries = get_run_logs(&logs, run_id);
        assert!(entries[0].message.len() <= MAX_MESSAGE_LENGTH);
    }
}
