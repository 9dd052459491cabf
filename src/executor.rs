// ==============================================================================
// executor.rs - Write Executor
// ==============================================================================
// Description: Runs one batch's operations against the store in phase order
//              and turns store outcomes into counters or fatal errors
// Created: 2026-10-13
// Modified: 2026-10-17
// Version: 1.2.0
// ==============================================================================
// Phases:
//   1. Stage secondary alternates (a guard miss is fatal)
//   2. New-study upserts (duplicate keys retried once without the conflicts)
//   3. Existing-study updates (matched count must equal operations)
//   4. Stage cleanup: null consumed files, then drop pending (warn only).
//      Loci whose insert conflicted under resume keep their payloads and
//      pending pairs; only the study is flipped to existing
// ==============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::error::{MergeError, StoreError};
use crate::operations::{BatchOperations, CleanStep, LocusFilter, WriteOperation};
use crate::result::WriteResult;
use crate::store::VariantStore;

pub struct WriteExecutor<S: ?Sized> {
    store: Arc<S>,
    resume: bool,
}

impl<S: ?Sized> Clone for WriteExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            resume: self.resume,
        }
    }
}

impl<S: VariantStore + ?Sized> WriteExecutor<S> {
    pub fn new(store: Arc<S>, resume: bool) -> Self {
        Self { store, resume }
    }

    pub async fn execute(&self, mut operations: BatchOperations) -> Result<WriteResult, MergeError> {
        let mut result = operations.counters.clone();

        self.update_alternates(&operations.secondary_alternates).await?;

        let start = Instant::now();
        let conflicts = self.insert_new_studies(&operations.new_study).await?;
        if !conflicts.is_empty() {
            let count = conflicts.len() as u64;
            result.insert_conflicts += count;
            result.new_variants = result.new_variants.saturating_sub(count);
            keep_conflicting_stage(&mut operations, &conflicts);
        }
        result.new_study_time = start.elapsed();

        let start = Instant::now();
        self.update_existing_studies(&operations.existing_study).await?;
        result.existing_study_time = start.elapsed();

        let start = Instant::now();
        self.clean_stage("files", &operations.clean_files).await;
        self.clean_stage("pending", &operations.clean_pending).await;
        result.cleanup_time = start.elapsed();

        debug!(
            "Batch written: {} new, {} updated, {} gap-filled, {} conflicts",
            result.new_variants, result.updated_variants, result.missing_variants, result.insert_conflicts
        );
        Ok(result)
    }

    async fn update_alternates(&self, operations: &[WriteOperation]) -> Result<(), MergeError> {
        if operations.is_empty() {
            return Ok(());
        }
        let outcome = self.store.update_stage(operations).await?;
        if outcome.unmatched.is_empty() {
            return Ok(());
        }
        error!(
            "Secondary alternates guard rejected {} of {} stage records: {:?}",
            outcome.unmatched.len(),
            operations.len(),
            outcome.unmatched
        );
        Err(MergeError::AlternatesConflict {
            ids: outcome.unmatched,
        })
    }

    /// Returns the ids of tolerated conflicts (resume only)
    async fn insert_new_studies(&self, operations: &[WriteOperation]) -> Result<HashSet<String>, MergeError> {
        if operations.is_empty() {
            return Ok(HashSet::new());
        }

        let keys = match self.store.upsert_new_studies(operations).await {
            Ok(_) => return Ok(HashSet::new()),
            Err(StoreError::DuplicateKey { keys }) => keys,
            Err(e) => return Err(e.into()),
        };

        warn!(
            "{} duplicate key conflicts inserting new study data, retrying the other {} operations",
            keys.len(),
            operations.len().saturating_sub(keys.len())
        );
        let remainder: Vec<WriteOperation> = {
            let conflicting: HashSet<&str> = keys.iter().map(String::as_str).collect();
            operations
                .iter()
                .filter(|op| !conflicting.contains(op.target_id()))
                .cloned()
                .collect()
        };

        if !remainder.is_empty() {
            match self.store.upsert_new_studies(&remainder).await {
                Ok(_) => {}
                Err(StoreError::DuplicateKey { keys: again }) => {
                    error!("Duplicate key conflicts persisted after retry: {:?}", again);
                    return Err(MergeError::PersistentConflict { ids: again });
                }
                Err(e) => return Err(e.into()),
            }
        }

        if self.resume {
            warn!("Ignoring {} variants already loaded by an interrupted run", keys.len());
            Ok(keys.into_iter().collect())
        } else {
            Err(MergeError::DuplicateKey { ids: keys })
        }
    }

    async fn update_existing_studies(&self, operations: &[WriteOperation]) -> Result<(), MergeError> {
        if operations.is_empty() {
            return Ok(());
        }

        let outcome = self.store.update_existing_studies(operations).await?;
        if outcome.matched == operations.len() as u64 {
            return Ok(());
        }

        let filters: Vec<LocusFilter> = operations.iter().filter_map(|op| op.locus_filter().cloned()).collect();
        let found: HashSet<String> = self.store.find_matching(&filters).await?.into_iter().collect();
        let ids: Vec<String> = filters
            .into_iter()
            .map(|f| f.id)
            .filter(|id| !found.contains(id))
            .collect();

        error!(
            "Existing-study update matched {} of {} variants, missing: {:?}",
            outcome.matched,
            operations.len(),
            ids
        );
        Err(MergeError::MissingDocuments {
            phase: "existing study",
            ids,
        })
    }

    async fn clean_stage(&self, step: &str, operations: &[WriteOperation]) {
        if operations.is_empty() {
            return;
        }
        match self.store.update_stage(operations).await {
            Ok(outcome) if outcome.matched < operations.len() as u64 => warn!(
                "Stage cleanup ({}) matched {} of {} records",
                step,
                outcome.matched,
                operations.len()
            ),
            Ok(_) => {}
            Err(e) => warn!("Stage cleanup ({}) failed: {}", step, e),
        }
    }
}

/// Leave the staged calls of conflicting loci for a later run, which merges
/// them into the existing study entry
fn keep_conflicting_stage(operations: &mut BatchOperations, conflicts: &HashSet<String>) {
    for operation in &mut operations.clean_files {
        if let WriteOperation::CleanStageEntry { stage_id, step, .. } = operation {
            if conflicts.contains(stage_id.as_str()) {
                *step = CleanStep::NullFiles {
                    files: Vec::new(),
                    mark_not_new: true,
                };
            }
        }
    }
    operations
        .clean_pending
        .retain(|op| !conflicts.contains(op.target_id()));
}
