// ==============================================================================
// store/mod.rs - Document Store Interfaces
// ==============================================================================
// Description: Variants store and stage source traits shared by the executor,
//              the loader and both backends
// Created: 2026-10-13
// Modified: 2026-10-17
// Version: 1.1.0
// ==============================================================================

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;
use crate::models::{StageRecord, StudyId, VariantDocument};
use crate::operations::{LocusFilter, WriteOperation};

pub use memory::{InMemoryStore, VecStageSource};
pub use postgres::{PgStageSource, PgVariantStore};

/// Counts returned by a bulk write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted: u64,
    /// Target ids of operations whose filter matched nothing
    pub unmatched: Vec<String>,
}

impl BulkOutcome {
    /// Operations that found or created their document
    pub fn applied(&self) -> u64 {
        self.matched + self.upserted
    }
}

/// Canonical variants store plus the stage bookkeeping writes
#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Apply new-study upserts atomically.
    ///
    /// Fails with `StoreError::DuplicateKey` listing every conflicting id
    /// and writes nothing when any operation collides.
    async fn upsert_new_studies(&self, operations: &[WriteOperation]) -> Result<BulkOutcome, StoreError>;

    /// Apply existing-study updates; filters that match nothing are listed in `unmatched`
    async fn update_existing_studies(&self, operations: &[WriteOperation]) -> Result<BulkOutcome, StoreError>;

    /// Ids of the documents matching each filter
    async fn find_matching(&self, filters: &[LocusFilter]) -> Result<Vec<String>, StoreError>;

    /// Fetch one document, restricted to a study's entry, within a time limit
    async fn fetch_variant(
        &self,
        id: &str,
        study_id: StudyId,
        timeout: Duration,
    ) -> Result<Option<VariantDocument>, StoreError>;

    /// Apply stage operations (secondary alternates, cleanup steps)
    async fn update_stage(&self, operations: &[WriteOperation]) -> Result<BulkOutcome, StoreError>;
}

/// Position-ordered batches of stage records for one study
#[async_trait]
pub trait StageSource: Send {
    /// Next batch, cut only where no overlap cluster is split; `None` when exhausted
    async fn next_batch(&mut self) -> Result<Option<Vec<StageRecord>>, StoreError>;
}
