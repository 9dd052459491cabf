// ==============================================================================
// config.rs - Merge Configuration and Plan
// ==============================================================================
// Description: Run settings, study metadata loading and merge plan validation
// Created: 2026-10-12
// Modified: 2026-10-15
// Version: 1.1.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::MergeError;
use crate::models::{FileId, SampleId, StudyId, StudyMetadata};

/// Tunable settings of a merge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Stage records per batch (batches are cut only at non-overlapping boundaries)
    pub batch_size: usize,

    /// Worker tasks merging batches concurrently
    pub threads: usize,

    /// Bounded producer queue capacity (defaults to threads * 2)
    pub queue_capacity: Option<usize>,

    /// Re-run after an interruption: tolerate indexed files and insert conflicts
    pub resume: bool,

    /// Treat every record as a singleton even when loci overlap
    pub ignore_overlapping: bool,

    /// Do not write sample genotypes
    pub exclude_genotypes: bool,

    /// Genotype assigned to samples of files with no call at a locus
    pub unknown_genotype: Option<String>,

    /// Timeout for a single canonical-store lookup
    pub fetch_timeout_ms: u64,

    /// Lookup attempts before a timeout becomes fatal
    pub fetch_attempts: u32,

    /// Release number stamped on written documents
    pub release: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            threads: 4,
            queue_capacity: None,
            resume: false,
            ignore_overlapping: false,
            exclude_genotypes: false,
            unknown_genotype: None,
            fetch_timeout_ms: 30_000,
            fetch_attempts: 2,
            release: 1,
        }
    }
}

impl MergeConfig {
    pub fn validate(&self) -> Result<(), MergeError> {
        if self.batch_size == 0 {
            return Err(MergeError::Config("batch_size must be greater than zero".to_string()));
        }
        if self.threads == 0 {
            return Err(MergeError::Config("threads must be greater than zero".to_string()));
        }
        if self.queue_capacity == Some(0) {
            return Err(MergeError::Config("queue_capacity must be greater than zero".to_string()));
        }
        if self.fetch_attempts == 0 {
            return Err(MergeError::Config("fetch_attempts must be greater than zero".to_string()));
        }
        if matches!(self.unknown_genotype.as_deref(), Some(gt) if gt.trim().is_empty()) {
            return Err(MergeError::Config("unknown_genotype must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.threads * 2).max(1)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Load study metadata from a JSON file
pub fn load_study_metadata(path: &Path) -> Result<StudyMetadata, MergeError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| MergeError::Config(format!("Failed to read study metadata {}: {}", path.display(), e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| MergeError::Config(format!("Invalid study metadata {}: {}", path.display(), e)))
}

/// A validated request to merge a set of files of one study
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub study: StudyMetadata,
    pub file_ids: Vec<FileId>,
    pub resume: bool,
    /// Group overlapping loci into clusters
    pub check_overlaps: bool,
}

impl MergePlan {
    /// Validate the file list against the study metadata
    pub fn new(study: StudyMetadata, file_ids: Vec<FileId>, config: &MergeConfig) -> Result<Self, MergeError> {
        if file_ids.is_empty() {
            return Err(MergeError::InvalidPlan("no files to merge".to_string()));
        }

        let mut seen = BTreeSet::new();
        for &file_id in &file_ids {
            if !seen.insert(file_id) {
                return Err(MergeError::InvalidPlan(format!("file {} listed twice", file_id)));
            }
            if !study.files.contains_key(&file_id) {
                return Err(MergeError::InvalidPlan(format!(
                    "file {} does not belong to study {}",
                    file_id, study.study_id
                )));
            }
            if study.indexed_files.contains(&file_id) {
                if config.resume {
                    warn!("File {} already indexed in study {}, resuming", file_id, study.study_id);
                } else {
                    return Err(MergeError::InvalidPlan(format!(
                        "file {} already indexed in study {} (use resume)",
                        file_id, study.study_id
                    )));
                }
            }
        }

        let check_overlaps =
            !config.ignore_overlapping && (file_ids.len() > 1 || !study.indexed_files.is_empty());

        info!(
            "Merge plan: study {} files {:?} ({} indexed, overlap check {})",
            study.study_id,
            file_ids,
            study.indexed_files.len(),
            check_overlaps
        );

        Ok(Self {
            study,
            file_ids,
            resume: config.resume,
            check_overlaps,
        })
    }

    pub fn study_id(&self) -> StudyId {
        self.study.study_id
    }

    pub fn samples_in_file(&self, file_id: FileId) -> &[SampleId] {
        self.study.samples_in_file(file_id)
    }

    /// Files already merged, excluding the ones being (re)loaded
    pub fn indexed_files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.study
            .indexed_files
            .iter()
            .copied()
            .filter(|f| !self.file_ids.contains(f))
    }

    pub fn has_indexed_files(&self) -> bool {
        self.indexed_files().next().is_some()
    }
}
