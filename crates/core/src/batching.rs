//! Batch partitioning and commit accounting.
//!
//! The async executor drives the store; this module owns the arithmetic:
//! deterministic batch boundaries, per-batch results, and the running
//! [`MigrationSummary`].

use serde::{Deserialize, Serialize};

use crate::types::{RowIndex, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_BATCH_SIZE: usize = 25;
pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 500;

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

/// Split `items` into contiguous, order-preserving batches of `batch_size`.
///
/// The last batch may be shorter. A zero size is treated as 1.
pub fn partition<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let size = batch_size.max(MIN_BATCH_SIZE);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size);
    for item in items {
        current.push(item);
        if current.len() == size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

// ---------------------------------------------------------------------------
// Batch results
// ---------------------------------------------------------------------------

/// Why one row of a failed batch was not committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    pub row_index: RowIndex,
    pub reason: String,
}

/// Outcome of committing one batch. A batch succeeds or fails as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// 0-based position of the batch in the run.
    pub batch_index: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BatchError>,
    /// Store calls made for this batch, including retries.
    pub attempts: u32,
}

impl BatchResult {
    pub fn success(batch_index: usize, rows: usize, attempts: u32) -> Self {
        Self {
            batch_index,
            attempted: rows,
            succeeded: rows,
            failed: 0,
            errors: Vec::new(),
            attempts,
        }
    }

    /// Every row of the batch fails with the same store-level reason.
    pub fn failure(batch_index: usize, row_indices: &[RowIndex], reason: &str, attempts: u32) -> Self {
        Self {
            batch_index,
            attempted: row_indices.len(),
            succeeded: 0,
            failed: row_indices.len(),
            errors: row_indices
                .iter()
                .map(|&row_index| BatchError {
                    row_index,
                    reason: reason.to_string(),
                })
                .collect(),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn failed_rows(&self) -> Vec<RowIndex> {
        self.errors.iter().map(|e| e.row_index).collect()
    }
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: Timestamp,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            level,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Running and final accounting of a commit.
///
/// `total_attempted == total_succeeded + total_failed` holds after every
/// update. A cancelled run leaves `total_planned` above
/// `total_attempted + total_skipped`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub total_planned: usize,
    pub total_attempted: usize,
    pub total_succeeded: usize,
    pub total_failed: usize,
    pub total_skipped: usize,
    pub batches_succeeded: usize,
    pub batches_failed: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub log: Vec<LogEntry>,
}

impl MigrationSummary {
    pub fn new(total_planned: usize, total_skipped: usize) -> Self {
        Self {
            total_planned,
            total_skipped,
            ..Self::default()
        }
    }

    /// Fold one batch result into the totals and log it.
    pub fn record_batch(&mut self, result: &BatchResult) {
        self.total_attempted += result.attempted;
        self.total_succeeded += result.succeeded;
        self.total_failed += result.failed;

        if result.is_success() {
            self.batches_succeeded += 1;
            self.add_log(
                LogLevel::Info,
                format!(
                    "Batch {} committed: {} record(s)",
                    result.batch_index + 1,
                    result.succeeded
                ),
            );
        } else {
            self.batches_failed += 1;
            let reason = result
                .errors
                .first()
                .map(|e| e.reason.as_str())
                .unwrap_or("unknown error");
            self.add_log(
                LogLevel::Error,
                format!(
                    "Batch {} failed ({} record(s), rows {}): {reason}",
                    result.batch_index + 1,
                    result.failed,
                    format_rows(&result.failed_rows()),
                ),
            );
        }
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
        let remaining = self.remaining();
        self.add_log(
            LogLevel::Warning,
            format!("Cancelled; {remaining} record(s) were not submitted"),
        );
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.log.push(LogEntry::new(level, message));
    }

    pub fn batches_submitted(&self) -> usize {
        self.batches_succeeded + self.batches_failed
    }

    /// Planned records neither attempted nor skipped.
    pub fn remaining(&self) -> usize {
        self.total_planned
            .saturating_sub(self.total_attempted + self.total_skipped)
    }
}

/// Compact row list for log lines: `1-3, 7, 9-10`.
pub fn format_rows(rows: &[RowIndex]) -> String {
    let mut sorted = rows.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts: Vec<String> = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        parts.push(if start == end {
            start.to_string()
        } else {
            format!("{start}-{end}")
        });
    }
    parts.join(", ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_is_contiguous_and_deterministic() {
        let items: Vec<u32> = (1..=23).collect();
        let first = partition(items.clone(), 10);
        let second = partition(items.clone(), 10);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first[2], vec![21, 22, 23]);
        assert_eq!(first.concat(), items);
    }

    #[test]
    fn partition_edge_sizes() {
        assert!(partition(Vec::<u8>::new(), 5).is_empty());
        assert_eq!(partition(vec![1, 2, 3], 0).len(), 3);
        assert_eq!(partition(vec![1, 2, 3], 3), vec![vec![1, 2, 3]]);
        assert_eq!(partition(vec![1, 2], 500).len(), 1);
    }

    #[test]
    fn summary_accounts_partial_failure() {
        let mut summary = MigrationSummary::new(30, 0);
        let rows: Vec<RowIndex> = (11..=20).collect();
        summary.record_batch(&BatchResult::success(0, 10, 1));
        summary.record_batch(&BatchResult::failure(1, &rows, "constraint violation", 1));
        summary.record_batch(&BatchResult::success(2, 10, 1));

        assert_eq!(summary.total_attempted, 30);
        assert_eq!(summary.total_succeeded, 20);
        assert_eq!(summary.total_failed, 10);
        assert_eq!(summary.total_attempted, summary.total_succeeded + summary.total_failed);
        assert_eq!(summary.batches_failed, 1);
        assert_eq!(summary.batches_submitted(), 3);
        assert_eq!(summary.log.len(), 3);
        assert_eq!(summary.log[1].level, LogLevel::Error);
        assert!(summary.log[1].message.contains("rows 11-20"));
        assert!(summary.log[1].message.contains("constraint violation"));
    }

    #[test]
    fn cancellation_leaves_remaining_records() {
        let mut summary = MigrationSummary::new(25, 5);
        summary.record_batch(&BatchResult::success(0, 10, 1));
        summary.mark_cancelled();
        assert!(summary.cancelled);
        assert_eq!(summary.remaining(), 10);
        assert!(summary.total_planned > summary.total_attempted + summary.total_skipped);
        assert_eq!(summary.total_attempted, summary.total_succeeded + summary.total_failed);
    }

    #[test]
    fn failure_lists_every_row() {
        let result = BatchResult::failure(4, &[3, 4], "timeout", 3);
        assert_eq!(result.failed, 2);
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.failed_rows(), vec![3, 4]);
        assert!(!result.is_success());
    }

    #[test]
    fn row_ranges_are_compacted() {
        assert_eq!(format_rows(&[9, 1, 2, 3, 7, 10]), "1-3, 7, 9-10");
        assert_eq!(format_rows(&[]), "");
    }
}
