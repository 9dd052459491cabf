// ==============================================================================
// store/postgres.rs - PostgreSQL Document Store
// ==============================================================================
// Description: Variants and stage collections as JSONB rows, with per-phase
//              transactions and savepoint-isolated upserts
// Created: 2026-10-13
// Modified: 2026-10-17
// Version: 1.1.1
// ==============================================================================
// Schema:
//   variants(id TEXT PK, chromosome TEXT, start BIGINT, document JSONB)
//   variant_stage(id TEXT PK, chromosome TEXT, start BIGINT, document JSONB)
// Stage reads use keyset pagination on (chromosome, start, id)
// ==============================================================================

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Acquire, PgConnection, PgPool};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{BulkOutcome, StageSource, VariantStore};
use crate::error::StoreError;
use crate::grouper::next_window_cut;
use crate::models::{StageRecord, StudyId, VariantDocument};
use crate::operations::{apply_to_stage, apply_to_variant, ApplyOutcome, LocusFilter, WriteOperation};

const CREATE_VARIANTS: &str = r#"
CREATE TABLE IF NOT EXISTS variants (
    id TEXT PRIMARY KEY,
    chromosome TEXT NOT NULL,
    start BIGINT NOT NULL,
    document JSONB NOT NULL
)"#;

const CREATE_STAGE: &str = r#"
CREATE TABLE IF NOT EXISTS variant_stage (
    id TEXT PRIMARY KEY,
    chromosome TEXT NOT NULL,
    start BIGINT NOT NULL,
    document JSONB NOT NULL
)"#;

const CREATE_STAGE_POSITION_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS variant_stage_position_idx ON variant_stage (chromosome, start, id)";

fn position(start: u64) -> i64 {
    i64::try_from(start).unwrap_or(i64::MAX)
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[derive(Clone)]
pub struct PgVariantStore {
    pool: PgPool,
}

impl PgVariantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_VARIANTS).execute(&self.pool).await?;
        sqlx::query(CREATE_STAGE).execute(&self.pool).await?;
        sqlx::query(CREATE_STAGE_POSITION_INDEX).execute(&self.pool).await?;
        info!("Variant store schema ready");
        Ok(())
    }

    /// Write (or replace) a stage record
    pub async fn put_stage_record(&self, record: &StageRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO variant_stage (id, chromosome, start, document)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document
            "#,
        )
        .bind(&record.id)
        .bind(&record.locus.chromosome)
        .bind(position(record.locus.start))
        .bind(Json(record))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stage records holding the study, in batches cut at window boundaries
    pub fn stage_source(&self, study_id: StudyId, batch_size: usize) -> PgStageSource {
        PgStageSource::new(self.pool.clone(), study_id, batch_size)
    }

    async fn load_variant(conn: &mut PgConnection, id: &str) -> Result<Option<VariantDocument>, StoreError> {
        let row: Option<(Json<VariantDocument>,)> =
            sqlx::query_as("SELECT document FROM variants WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(row.map(|(Json(document),)| document))
    }

    async fn insert_variant(conn: &mut PgConnection, document: &VariantDocument) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO variants (id, chromosome, start, document) VALUES ($1, $2, $3, $4)")
            .bind(&document.id)
            .bind(&document.locus.chromosome)
            .bind(position(document.locus.start))
            .bind(Json(document))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn replace_variant(conn: &mut PgConnection, document: &VariantDocument) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE variants SET document = $2 WHERE id = $1")
            .bind(&document.id)
            .bind(Json(document))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VariantStore for PgVariantStore {
    async fn upsert_new_studies(&self, operations: &[WriteOperation]) -> Result<BulkOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BulkOutcome::default();
        let mut conflicts = Vec::new();

        for operation in operations {
            let id = operation.target_id();
            let mut savepoint = Acquire::begin(&mut tx).await?;
            let mut document = Self::load_variant(&mut savepoint, id).await?;

            match apply_to_variant(&mut document, operation) {
                Ok(ApplyOutcome::Inserted) => {
                    let Some(created) = document.as_ref() else {
                        savepoint.rollback().await?;
                        continue;
                    };
                    match Self::insert_variant(&mut savepoint, created).await {
                        Ok(()) => {
                            savepoint.commit().await?;
                            outcome.upserted += 1;
                        }
                        // Another writer inserted the id between our read and write
                        Err(e) if is_unique_violation(&e) => {
                            savepoint.rollback().await?;
                            conflicts.push(id.to_string());
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(ApplyOutcome::Modified) => {
                    if let Some(updated) = document.as_ref() {
                        Self::replace_variant(&mut savepoint, updated).await?;
                    }
                    savepoint.commit().await?;
                    outcome.matched += 1;
                    outcome.modified += 1;
                }
                Ok(ApplyOutcome::Unchanged) => {
                    savepoint.commit().await?;
                    outcome.matched += 1;
                }
                Ok(ApplyOutcome::NotMatched) => savepoint.commit().await?,
                Err(conflict) => {
                    savepoint.rollback().await?;
                    conflicts.push(conflict.0);
                }
            }
        }

        if !conflicts.is_empty() {
            tx.rollback().await?;
            return Err(StoreError::DuplicateKey { keys: conflicts });
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn update_existing_studies(&self, operations: &[WriteOperation]) -> Result<BulkOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BulkOutcome::default();

        for operation in operations {
            let mut document = Self::load_variant(&mut tx, operation.target_id()).await?;
            match apply_to_variant(&mut document, operation) {
                Ok(ApplyOutcome::Modified) => {
                    if let Some(updated) = document.as_ref() {
                        Self::replace_variant(&mut tx, updated).await?;
                    }
                    outcome.matched += 1;
                    outcome.modified += 1;
                }
                Ok(ApplyOutcome::Unchanged) => outcome.matched += 1,
                Ok(_) => outcome.unmatched.push(operation.target_id().to_string()),
                Err(conflict) => {
                    tx.rollback().await?;
                    return Err(StoreError::DuplicateKey { keys: vec![conflict.0] });
                }
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn find_matching(&self, filters: &[LocusFilter]) -> Result<Vec<String>, StoreError> {
        let ids: Vec<String> = filters.iter().map(|f| f.id.clone()).collect();
        let rows: Vec<(String, Json<VariantDocument>)> =
            sqlx::query_as("SELECT id, document FROM variants WHERE id = ANY($1)")
                .bind(&ids)
                .fetch_all(&self.pool)
                .await?;

        Ok(filters
            .iter()
            .filter(|f| rows.iter().any(|(id, Json(document))| *id == f.id && f.matches(document)))
            .map(|f| f.id.clone())
            .collect())
    }

    async fn fetch_variant(
        &self,
        id: &str,
        study_id: StudyId,
        timeout: Duration,
    ) -> Result<Option<VariantDocument>, StoreError> {
        let query = sqlx::query_as::<_, (Json<VariantDocument>,)>("SELECT document FROM variants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool);

        let row = tokio::time::timeout(timeout, query)
            .await
            .map_err(|_| StoreError::Timeout(timeout))??;

        Ok(row.map(|(Json(mut document),)| {
            document.studies.retain(|s| s.study_id == study_id);
            document
        }))
    }

    async fn update_stage(&self, operations: &[WriteOperation]) -> Result<BulkOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BulkOutcome::default();

        for operation in operations {
            let row: Option<(Json<StageRecord>,)> =
                sqlx::query_as("SELECT document FROM variant_stage WHERE id = $1 FOR UPDATE")
                    .bind(operation.target_id())
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some((Json(mut record),)) = row else {
                warn!("Stage record {} vanished before update", operation.target_id());
                outcome.unmatched.push(operation.target_id().to_string());
                continue;
            };

            match apply_to_stage(&mut record, operation) {
                ApplyOutcome::Modified | ApplyOutcome::Inserted => {
                    sqlx::query("UPDATE variant_stage SET document = $2 WHERE id = $1")
                        .bind(&record.id)
                        .bind(Json(&record))
                        .execute(&mut *tx)
                        .await?;
                    outcome.matched += 1;
                    outcome.modified += 1;
                }
                ApplyOutcome::Unchanged => outcome.matched += 1,
                ApplyOutcome::NotMatched => outcome.unmatched.push(operation.target_id().to_string()),
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

/// Keyset-paginated reader over the stage table
pub struct PgStageSource {
    pool: PgPool,
    study_id: StudyId,
    batch_size: usize,
    buffer: Vec<StageRecord>,
    cursor: (String, i64, String),
    exhausted: bool,
}

impl PgStageSource {
    pub fn new(pool: PgPool, study_id: StudyId, batch_size: usize) -> Self {
        Self {
            pool,
            study_id,
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            cursor: (String::new(), -1, String::new()),
            exhausted: false,
        }
    }

    async fn fetch_page(&mut self) -> Result<(), StoreError> {
        let limit = i64::try_from(self.batch_size).unwrap_or(i64::MAX);
        let rows: Vec<(String, String, i64, Json<StageRecord>)> = sqlx::query_as(
            r#"
            SELECT id, chromosome, start, document
            FROM variant_stage
            WHERE jsonb_exists(document->'studies', $1)
              AND (chromosome, start, id) > ($2, $3, $4)
            ORDER BY chromosome, start, id
            LIMIT $5
            "#,
        )
        .bind(self.study_id.to_string())
        .bind(&self.cursor.0)
        .bind(self.cursor.1)
        .bind(&self.cursor.2)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        if rows.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some((id, chromosome, start, _)) = rows.last() {
            self.cursor = (chromosome.clone(), *start, id.clone());
        }
        debug!("Fetched {} stage records for study {}", rows.len(), self.study_id);
        self.buffer.extend(rows.into_iter().map(|(_, _, _, Json(record))| record));
        Ok(())
    }
}

#[async_trait]
impl StageSource for PgStageSource {
    async fn next_batch(&mut self) -> Result<Option<Vec<StageRecord>>, StoreError> {
        loop {
            if let Some(cut) = next_window_cut(&self.buffer, self.batch_size) {
                return Ok(Some(self.buffer.drain(..cut).collect()));
            }
            if self.exhausted {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.buffer)));
            }
            self.fetch_page().await?;
        }
    }
}
