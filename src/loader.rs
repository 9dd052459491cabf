// ==============================================================================
// loader.rs - Concurrent Merge Loader
// ==============================================================================
// Description: Producer/worker pipeline that streams stage batches through
//              grouping, prefetch, merge, operation building and execution
// Created: 2026-10-13
// Modified: 2026-10-16
// Version: 1.2.0
// ==============================================================================
// Concurrency:
//   - One producer reads position-ordered batches into a bounded channel
//   - N workers share the receiver; a batch is handled by a single worker
//   - Batches never split an overlap cluster, so workers never touch the
//     same locus concurrently
//   - The first fatal error aborts every worker; counters collected so far
//     are returned with the error
// ==============================================================================

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{MergeConfig, MergePlan};
use crate::error::{MergeError, MergeFailure, StoreError};
use crate::executor::WriteExecutor;
use crate::grouper::OverlapGrouper;
use crate::merger::{FetchedVariants, LocusMerger};
use crate::models::StageRecord;
use crate::operations::OperationBuilder;
use crate::result::{ResultAggregator, WriteResult};
use crate::store::{StageSource, VariantStore};

/// "first_id..last_id" of a batch, for error context
fn batch_range(batch: &[StageRecord]) -> String {
    match (batch.first(), batch.last()) {
        (Some(first), Some(last)) => format!("{}..{}", first.id, last.id),
        _ => "<empty>".to_string(),
    }
}

/// Everything a worker needs to take one batch from stage to store
pub struct BatchProcessor<S: ?Sized> {
    store: Arc<S>,
    plan: Arc<MergePlan>,
    grouper: OverlapGrouper,
    merger: LocusMerger,
    builder: OperationBuilder,
    executor: WriteExecutor<S>,
    config: MergeConfig,
}

impl<S: ?Sized> Clone for BatchProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            plan: Arc::clone(&self.plan),
            grouper: self.grouper.clone(),
            merger: self.merger.clone(),
            builder: self.builder.clone(),
            executor: self.executor.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: VariantStore + ?Sized> BatchProcessor<S> {
    pub fn new(store: Arc<S>, plan: Arc<MergePlan>, config: &MergeConfig) -> Self {
        Self {
            grouper: OverlapGrouper::new(plan.study_id(), plan.check_overlaps),
            merger: LocusMerger::new(Arc::clone(&plan), config),
            builder: OperationBuilder::new(plan.study_id(), config.release, plan.resume),
            executor: WriteExecutor::new(Arc::clone(&store), plan.resume),
            store,
            plan,
            config: config.clone(),
        }
    }

    /// Merge and write one batch
    pub async fn process(&self, batch: Vec<StageRecord>) -> Result<WriteResult, MergeError> {
        let range = batch_range(&batch);
        self.process_inner(batch)
            .await
            .map_err(|e| MergeError::in_batch(range, e))
    }

    async fn process_inner(&self, batch: Vec<StageRecord>) -> Result<WriteResult, MergeError> {
        let records = batch.len();
        let groups = self.grouper.group(batch);
        let fetched = self.prefetch(self.merger.required_fetches(&groups)).await?;
        let merged = self.merger.merge(&groups, &fetched)?;
        let operations = self.builder.build(merged);
        debug!("Batch of {} stage records grouped into {} units", records, groups.len());
        self.executor.execute(operations).await
    }

    /// Fetch the canonical documents the merge needs, retrying timeouts
    async fn prefetch(&self, ids: Vec<String>) -> Result<FetchedVariants, MergeError> {
        let mut fetched = FetchedVariants::with_capacity(ids.len());
        let timeout = self.config.fetch_timeout();

        for id in ids {
            let mut attempt = 1;
            loop {
                match self.store.fetch_variant(&id, self.plan.study_id(), timeout).await {
                    Ok(Some(document)) => {
                        fetched.insert(id, document);
                        break;
                    }
                    // The merger reports the missing document with its locus
                    Ok(None) => break,
                    Err(StoreError::Timeout(after)) if attempt < self.config.fetch_attempts => {
                        warn!(
                            "Timed out after {:?} fetching {} (attempt {}/{}), retrying",
                            after, id, attempt, self.config.fetch_attempts
                        );
                        attempt += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(fetched)
    }
}

/// Runs a full merge of one plan against a store
pub struct MergeLoader<S: ?Sized> {
    processor: BatchProcessor<S>,
    config: MergeConfig,
}

impl<S: VariantStore + ?Sized + 'static> MergeLoader<S> {
    pub fn new(store: Arc<S>, plan: MergePlan, config: MergeConfig) -> Result<Self, MergeError> {
        config.validate()?;
        Ok(Self {
            processor: BatchProcessor::new(store, Arc::new(plan), &config),
            config,
        })
    }

    pub async fn run<P: StageSource + 'static>(&self, source: P) -> Result<WriteResult, MergeFailure> {
        let plan = &self.processor.plan;
        info!(
            "Merging files {:?} of study {} with {} workers (batch size {})",
            plan.file_ids,
            plan.study_id(),
            self.config.threads,
            self.config.batch_size
        );

        let aggregator = ResultAggregator::new();
        let (tx, rx) = mpsc::channel::<Vec<StageRecord>>(self.config.queue_capacity());
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.threads {
            let processor = self.processor.clone();
            let rx = Arc::clone(&rx);
            let aggregator = aggregator.clone();
            workers.spawn(async move {
                let mut batches = 0usize;
                loop {
                    let batch = rx.lock().await.recv().await;
                    let Some(batch) = batch else {
                        break;
                    };
                    let result = processor.process(batch).await?;
                    aggregator.add(&result);
                    batches += 1;
                }
                debug!("Worker {} finished after {} batches", worker_id, batches);
                Ok::<(), MergeError>(())
            });
        }
        drop(rx);

        let producer = tokio::spawn(async move {
            let mut source = source;
            let mut batches = 0usize;
            while let Some(batch) = source.next_batch().await? {
                if batch.is_empty() {
                    continue;
                }
                if tx.send(batch).await.is_err() {
                    // Every worker stopped, nothing left to feed
                    break;
                }
                batches += 1;
            }
            Ok::<usize, MergeError>(batches)
        });

        let mut failure: Option<MergeError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if failure.is_none() {
                        error!("Merge failed: {}", e);
                        workers.abort_all();
                        producer.abort();
                        failure = Some(e);
                    }
                }
                Err(join_error) if join_error.is_cancelled() => {}
                Err(join_error) => {
                    if failure.is_none() {
                        workers.abort_all();
                        producer.abort();
                        failure = Some(MergeError::Worker(join_error.to_string()));
                    }
                }
            }
        }

        match producer.await {
            Ok(Ok(batches)) => debug!("Producer queued {} batches", batches),
            Ok(Err(e)) => {
                error!("Reading stage failed: {}", e);
                failure.get_or_insert(e);
            }
            Err(join_error) if join_error.is_cancelled() => {}
            Err(join_error) => {
                failure.get_or_insert(MergeError::Worker(join_error.to_string()));
            }
        }

        let result = aggregator.snapshot();
        if let Some(source) = failure {
            return Err(MergeFailure { source, partial: result });
        }

        info!(
            "Merge complete: {} staged, {} new, {} updated, {} gap-filled, {} no-op, {} skipped, {} non-inserted, {} conflicts, {} overlapped",
            result.staged_records,
            result.new_variants,
            result.updated_variants,
            result.missing_variants,
            result.missing_variants_no_fill_gaps,
            result.skipped_variants,
            result.non_inserted_variants,
            result.insert_conflicts,
            result.overlapped_variants
        );
        if !result.is_balanced() {
            warn!(
                "Outcome counters ({}) do not add up to staged records ({})",
                result.outcomes(),
                result.staged_records
            );
        }
        Ok(result)
    }
}
