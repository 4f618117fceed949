// src/models/run.rs

//! Sync run audit records and pass results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a sync run. Every run starts `Running` and is finalized to a
/// terminal status even when the pass body fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters accumulated over one pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunCounters {
    /// Listing pages successfully fetched
    pub pages_scanned: u32,

    /// Lot entries parsed from listing pages
    pub lots_scanned: u32,

    /// Lot rows written this pass (full and degraded; touches excluded)
    pub lots_updated: u32,
}

/// Audit row persisted for every pass, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRun {
    pub id: i64,
    pub auction_code: String,
    pub started_at: DateTime<Utc>,

    /// Set by finalization; `None` only while the run is in flight
    pub finished_at: Option<DateTime<Utc>>,

    pub status: RunStatus,
    pub counters: RunCounters,
    pub error_count: u32,
    pub errors: Vec<String>,
    pub max_pages: Option<u32>,
    pub dry_run: bool,
}

/// Summary returned to the caller after one pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRunResult {
    pub run_id: i64,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub errors: Vec<String>,
}

impl SyncRunResult {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

impl std::fmt::Display for SyncRunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "run {} {}: {} pages, {} lots scanned, {} updated, {} errors",
            self.run_id,
            self.status,
            self.counters.pages_scanned,
            self.counters.lots_scanned,
            self.counters.lots_updated,
            self.errors.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_result_summary_line() {
        let result = SyncRunResult {
            run_id: 7,
            status: RunStatus::Success,
            counters: RunCounters {
                pages_scanned: 3,
                lots_scanned: 42,
                lots_updated: 5,
            },
            errors: vec!["detail fetch failed".to_string()],
        };
        assert_eq!(
            result.to_string(),
            "run 7 success: 3 pages, 42 lots scanned, 5 updated, 1 errors"
        );
    }
}
