//! Log Repository
//!
//! Log entries per run, in the order they were written.

use quay_core::domain::log::LogEntry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct LogRepository {
    entries: Arc<RwLock<HashMap<Uuid, Vec<LogEntry>>>>,
}

impl LogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry for a run
    pub fn add_entry(&self, run_id: Uuid, entry: LogEntry) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(run_id)
            .or_default()
            .push(entry);
    }

    /// All entries for a run, oldest first
    pub fn find_by_run(&self, run_id: Uuid) -> Vec<LogEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&run_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_core::domain::log::LogLevel;

    #[test]
    fn test_entries_are_kept_per_run_in_order() {
        let repo = LogRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        repo.add_entry(a, LogEntry::new(LogLevel::Info, "build", "first"));
        repo.add_entry(b, LogEntry::new(LogLevel::Info, "build", "other"));
        repo.add_entry(a, LogEntry::new(LogLevel::Error, "deploy", "second"));

        let logs = repo.find_by_run(a);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "first");
        assert_eq!(logs[1].source, "deploy");
        assert_eq!(repo.find_by_run(b).len(), 1);
        assert!(repo.find_by_run(Uuid::new_v4()).is_empty());
    }
}
