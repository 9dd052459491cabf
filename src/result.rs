// ==============================================================================
// result.rs - Write Result Aggregation
// ==============================================================================
// Description: Per-batch write counters, their thread-safe aggregation and
//              the final run report
// Created: 2026-10-13
// Modified: 2026-10-15
// Version: 1.0.1
// ==============================================================================
// Every staged record ends in exactly one outcome counter:
//   new | updated | missing (fill gaps) | missing (no fill gaps) |
//   skipped | non inserted | insert conflicts
// overlapped_variants and duplicated_calls are diagnostics, not outcomes
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Counters and timings of merged writes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Stage records seen by the merge
    pub staged_records: u64,

    /// Loci written for a study that had no data there
    pub new_variants: u64,

    /// Existing-study loci updated from a direct call
    pub updated_variants: u64,

    /// Existing-study loci only gap-filled (overlapped calls, padding, ids)
    pub missing_variants: u64,

    /// Loci with nothing to write for the study
    pub missing_variants_no_fill_gaps: u64,

    /// Loci whose only calls had an unsupported type
    pub skipped_variants: u64,

    /// New-study loci dropped because their calls were duplicated
    pub non_inserted_variants: u64,

    /// New-study loci that already existed (tolerated on resume)
    pub insert_conflicts: u64,

    /// Loci with no call of their own but data at an overlapping locus
    pub overlapped_variants: u64,

    /// Calls discarded because a file had several at one locus
    pub duplicated_calls: u64,

    pub new_study_time: Duration,
    pub existing_study_time: Duration,
    pub cleanup_time: Duration,
}

impl WriteResult {
    /// Add another result's counters and timings into this one
    pub fn merge(&mut self, other: &WriteResult) {
        self.staged_records += other.staged_records;
        self.new_variants += other.new_variants;
        self.updated_variants += other.updated_variants;
        self.missing_variants += other.missing_variants;
        self.missing_variants_no_fill_gaps += other.missing_variants_no_fill_gaps;
        self.skipped_variants += other.skipped_variants;
        self.non_inserted_variants += other.non_inserted_variants;
        self.insert_conflicts += other.insert_conflicts;
        self.overlapped_variants += other.overlapped_variants;
        self.duplicated_calls += other.duplicated_calls;
        self.new_study_time += other.new_study_time;
        self.existing_study_time += other.existing_study_time;
        self.cleanup_time += other.cleanup_time;
    }

    pub fn outcomes(&self) -> u64 {
        self.new_variants
            + self.updated_variants
            + self.missing_variants
            + self.missing_variants_no_fill_gaps
            + self.skipped_variants
            + self.non_inserted_variants
            + self.insert_conflicts
    }

    /// Each staged record was assigned exactly one outcome
    pub fn is_balanced(&self) -> bool {
        self.outcomes() == self.staged_records
    }
}

/// Shared accumulator the workers fold their batch results into
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    inner: Arc<Mutex<WriteResult>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, result: &WriteResult) {
        let mut total = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        total.merge(result);
    }

    pub fn snapshot(&self) -> WriteResult {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Summary of one merge run, printed by the binary
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub run_id: Uuid,
    pub study_id: u32,
    pub file_ids: Vec<u32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub result: WriteResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_counters_and_timings() {
        let mut total = WriteResult {
            staged_records: 3,
            new_variants: 2,
            skipped_variants: 1,
            new_study_time: Duration::from_millis(10),
            ..Default::default()
        };
        let batch = WriteResult {
            staged_records: 2,
            updated_variants: 1,
            insert_conflicts: 1,
            overlapped_variants: 1,
            new_study_time: Duration::from_millis(5),
            ..Default::default()
        };

        total.merge(&batch);
        assert_eq!(total.staged_records, 5);
        assert_eq!(total.outcomes(), 5);
        assert!(total.is_balanced());
        assert_eq!(total.overlapped_variants, 1);
        assert_eq!(total.new_study_time, Duration::from_millis(15));
    }

    #[test]
    fn test_unbalanced_result() {
        let result = WriteResult {
            staged_records: 2,
            new_variants: 1,
            duplicated_calls: 3,
            ..Default::default()
        };
        assert!(!result.is_balanced());
    }

    #[tokio::test]
    async fn test_aggregator_across_tasks() {
        let aggregator = ResultAggregator::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let aggregator = aggregator.clone();
            handles.push(tokio::spawn(async move {
                aggregator.add(&WriteResult {
                    staged_records: 1,
                    new_variants: 1,
                    ..Default::default()
                });
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let total = aggregator.snapshot();
        assert_eq!(total.new_variants, 8);
        assert!(total.is_balanced());
    }

    #[test]
    fn test_report_serializes_result() {
        let now = Utc::now();
        let report = MergeReport {
            run_id: Uuid::new_v4(),
            study_id: 1,
            file_ids: vec![1, 2],
            started_at: now,
            finished_at: now,
            success: true,
            error: None,
            result: WriteResult::default(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["result"]["new_variants"], 0);
        assert!(json.get("error").is_none());
    }
}
