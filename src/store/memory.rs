// ==============================================================================
// store/memory.rs - In-Memory Document Store
// ==============================================================================
// Description: Mutex-guarded variants and stage collections used by tests and
//              by the binary's dry-run mode
// Created: 2026-10-13
// Modified: 2026-10-17
// Version: 1.1.1
// ==============================================================================

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use super::{BulkOutcome, StageSource, VariantStore};
use crate::error::StoreError;
use crate::grouper::next_window_cut;
use crate::models::{StageRecord, StudyId, VariantDocument};
use crate::operations::{apply_to_stage, apply_to_variant, ApplyOutcome, LocusFilter, WriteOperation};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    variants: Mutex<BTreeMap<String, VariantDocument>>,
    stage: Mutex<BTreeMap<String, StageRecord>>,
    /// Lookups that should time out before the store answers
    failing_fetches: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(records: impl IntoIterator<Item = StageRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.put_stage_record(record);
        }
        store
    }

    /// Load stage records from a JSON array file
    pub fn from_stage_json(path: &Path) -> Result<Self, StoreError> {
        let contents = std::fs::read_to_string(path)?;
        let records: Vec<StageRecord> = serde_json::from_str(&contents)?;
        Ok(Self::with_stage(records))
    }

    pub fn put_stage_record(&self, record: StageRecord) {
        lock(&self.stage).insert(record.id.clone(), record);
    }

    pub fn put_variant(&self, document: VariantDocument) {
        lock(&self.variants).insert(document.id.clone(), document);
    }

    pub fn variant(&self, id: &str) -> Option<VariantDocument> {
        lock(&self.variants).get(id).cloned()
    }

    pub fn variants(&self) -> Vec<VariantDocument> {
        lock(&self.variants).values().cloned().collect()
    }

    pub fn stage_record(&self, id: &str) -> Option<StageRecord> {
        lock(&self.stage).get(id).cloned()
    }

    /// Make the next `count` lookups time out
    pub fn fail_next_fetches(&self, count: u32) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Snapshot of the stage records holding the study, as a batched source
    pub fn stage_source(&self, study_id: StudyId, batch_size: usize) -> VecStageSource {
        let records = lock(&self.stage)
            .values()
            .filter(|r| r.studies.contains_key(&study_id))
            .cloned()
            .collect();
        VecStageSource::new(records, batch_size)
    }
}

#[async_trait]
impl VariantStore for InMemoryStore {
    async fn upsert_new_studies(&self, operations: &[WriteOperation]) -> Result<BulkOutcome, StoreError> {
        let mut variants = lock(&self.variants);
        let mut staged = variants.clone();
        let mut outcome = BulkOutcome::default();
        let mut conflicts = Vec::new();

        for operation in operations {
            let id = operation.target_id().to_string();
            let mut document = staged.remove(&id);
            match apply_to_variant(&mut document, operation) {
                Ok(ApplyOutcome::Inserted) => outcome.upserted += 1,
                Ok(ApplyOutcome::Modified) => {
                    outcome.matched += 1;
                    outcome.modified += 1;
                }
                Ok(ApplyOutcome::Unchanged) => outcome.matched += 1,
                Ok(ApplyOutcome::NotMatched) => {}
                Err(conflict) => conflicts.push(conflict.0),
            }
            if let Some(document) = document {
                staged.insert(id, document);
            }
        }

        if !conflicts.is_empty() {
            return Err(StoreError::DuplicateKey { keys: conflicts });
        }
        *variants = staged;
        Ok(outcome)
    }

    async fn update_existing_studies(&self, operations: &[WriteOperation]) -> Result<BulkOutcome, StoreError> {
        let mut variants = lock(&self.variants);
        let mut outcome = BulkOutcome::default();

        for operation in operations {
            let id = operation.target_id().to_string();
            let mut document = variants.remove(&id);
            match apply_to_variant(&mut document, operation) {
                Ok(ApplyOutcome::Modified) => {
                    outcome.matched += 1;
                    outcome.modified += 1;
                }
                Ok(ApplyOutcome::Unchanged) => outcome.matched += 1,
                Ok(_) => outcome.unmatched.push(id.clone()),
                Err(conflict) => {
                    if let Some(document) = document {
                        variants.insert(id, document);
                    }
                    return Err(StoreError::DuplicateKey { keys: vec![conflict.0] });
                }
            }
            if let Some(document) = document {
                variants.insert(id, document);
            }
        }
        Ok(outcome)
    }

    async fn find_matching(&self, filters: &[LocusFilter]) -> Result<Vec<String>, StoreError> {
        let variants = lock(&self.variants);
        Ok(filters
            .iter()
            .filter(|f| variants.get(&f.id).is_some_and(|d| f.matches(d)))
            .map(|f| f.id.clone())
            .collect())
    }

    async fn fetch_variant(
        &self,
        id: &str,
        study_id: StudyId,
        timeout: Duration,
    ) -> Result<Option<VariantDocument>, StoreError> {
        let failing = self.failing_fetches.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_fetches.store(failing - 1, Ordering::SeqCst);
            debug!("Simulated timeout fetching {}", id);
            return Err(StoreError::Timeout(timeout));
        }

        Ok(self.variant(id).map(|mut document| {
            document.studies.retain(|s| s.study_id == study_id);
            document
        }))
    }

    async fn update_stage(&self, operations: &[WriteOperation]) -> Result<BulkOutcome, StoreError> {
        let mut stage = lock(&self.stage);
        let mut outcome = BulkOutcome::default();

        for operation in operations {
            let Some(record) = stage.get_mut(operation.target_id()) else {
                outcome.unmatched.push(operation.target_id().to_string());
                continue;
            };
            match apply_to_stage(record, operation) {
                ApplyOutcome::Modified | ApplyOutcome::Inserted => {
                    outcome.matched += 1;
                    outcome.modified += 1;
                }
                ApplyOutcome::Unchanged => outcome.matched += 1,
                ApplyOutcome::NotMatched => outcome.unmatched.push(operation.target_id().to_string()),
            }
        }
        Ok(outcome)
    }
}

/// Stage source over records held in memory
#[derive(Debug)]
pub struct VecStageSource {
    records: Vec<StageRecord>,
    batch_size: usize,
}

impl VecStageSource {
    pub fn new(mut records: Vec<StageRecord>, batch_size: usize) -> Self {
        records.sort_by(|a, b| a.position_key().cmp(&b.position_key()));
        Self {
            records,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl StageSource for VecStageSource {
    async fn next_batch(&mut self) -> Result<Option<Vec<StageRecord>>, StoreError> {
        if self.records.is_empty() {
            return Ok(None);
        }
        let cut = next_window_cut(&self.records, self.batch_size).unwrap_or(self.records.len());
        Ok(Some(self.records.drain(..cut).collect()))
    }
}
