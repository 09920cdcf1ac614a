//! Bounded execution history — an in-memory ring of the last 50 fires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Newest records kept; oldest evicted first.
pub const HISTORY_CAPACITY: usize = 50;

/// One completed (or failed) fire.
///
/// The schedule name is denormalized on purpose: a later rename must not
/// rewrite old records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub schedule_id: String,
    pub schedule_name: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Append-only ring buffer of execution records.
///
/// Internal storage is chronological (append = newest last); readers get
/// reverse-chronological order for display.
#[derive(Debug, Default)]
pub struct ExecutionHistory {
    records: VecDeque<ExecutionRecord>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, evicting the oldest past capacity.
    pub fn push(&mut self, record: ExecutionRecord) {
        self.records.push_back(record);
        while self.records.len() > HISTORY_CAPACITY {
            self.records.pop_front();
        }
    }

    pub fn record_success(&mut self, schedule_id: &str, schedule_name: &str) {
        self.push(ExecutionRecord {
            schedule_id: schedule_id.into(),
            schedule_name: schedule_name.into(),
            timestamp: Utc::now(),
            success: true,
            error: None,
        });
    }

    pub fn record_failure(&mut self, schedule_id: &str, schedule_name: &str, error: &str) {
        self.push(ExecutionRecord {
            schedule_id: schedule_id.into(),
            schedule_name: schedule_name.into(),
            timestamp: Utc::now(),
            success: false,
            error: Some(error.into()),
        });
    }

    /// Records newest-first, for the API and UI.
    pub fn recent(&self) -> Vec<ExecutionRecord> {
        self.records.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize, success: bool) -> ExecutionRecord {
        ExecutionRecord {
            schedule_id: format!("fire-{n}"),
            schedule_name: format!("Fire {n}"),
            timestamp: Utc::now(),
            success,
            error: (!success).then(|| "boom".into()),
        }
    }

    #[test]
    fn test_eviction_keeps_newest_fifty() {
        let mut history = ExecutionHistory::new();
        for n in 1..=60 {
            history.push(record(n, true));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        // Oldest surviving record is fire #11.
        let recent = history.recent();
        assert_eq!(recent.last().unwrap().schedule_id, "fire-11");
        assert_eq!(recent.first().unwrap().schedule_id, "fire-60");
    }

    #[test]
    fn test_recent_is_reverse_chronological() {
        let mut history = ExecutionHistory::new();
        history.push(record(1, true));
        history.push(record(2, false));
        history.push(record(3, true));
        let ids: Vec<_> = history.recent().iter().map(|r| r.schedule_id.clone()).collect();
        assert_eq!(ids, vec!["fire-3", "fire-2", "fire-1"]);
    }

    #[test]
    fn test_failure_carries_error() {
        let mut history = ExecutionHistory::new();
        history.record_failure("a", "A", "Failed after 4 attempts");
        let recent = history.recent();
        assert!(!recent[0].success);
        assert_eq!(recent[0].error.as_deref(), Some("Failed after 4 attempts"));
    }
}
