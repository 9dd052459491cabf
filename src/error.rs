// ==============================================================================
// error.rs - Merge Error Taxonomy
// ==============================================================================
// Description: Store, codec and merge errors for the variant merge core
// Created: 2026-10-12
// Modified: 2026-10-15
// Version: 1.1.0
// ==============================================================================
// Taxonomy:
//   - Transient store errors (timeouts) are retried by the caller, then fatal
//   - Duplicate-key conflicts on new-study inserts are retried once
//   - Consistency errors (vanished documents, matched-count mismatch) are fatal
//   - Recoverable skips (unsupported types, duplicated calls) are only counted
// ==============================================================================

use std::time::Duration;
use thiserror::Error;

use crate::genotype::GenotypeError;
use crate::result::WriteResult;

/// Errors raised by a backing document store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Duplicate key conflict on {} document(s): {}", keys.len(), keys.join(", "))]
    DuplicateKey { keys: Vec<String> },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors decoding stage payloads or locus identifiers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Invalid locus id: '{0}' (expected chromosome:start:reference:alternate)")]
    InvalidLocusId(String),

    #[error("Invalid call payload for file {file_id}: {message}")]
    InvalidPayload { file_id: u32, message: String },

    #[error("Invalid original call '{0}'")]
    InvalidOriginalCall(String),
}

/// Errors that abort a merge run (or a single batch)
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Genotype error: {0}")]
    Genotype(#[from] GenotypeError),

    #[error("Variant {id} not found in the variants store")]
    VariantNotFound { id: String },

    #[error("Error merging locus {locus}: {source}")]
    Locus {
        locus: String,
        #[source]
        source: Box<MergeError>,
    },

    #[error("Error loading batch {range}: {source}")]
    Batch {
        range: String,
        #[source]
        source: Box<MergeError>,
    },

    #[error("Duplicate key conflict inserting new study data for: {}", ids.join(", "))]
    DuplicateKey { ids: Vec<String> },

    #[error("Duplicate key conflict persisted after retry for: {}", ids.join(", "))]
    PersistentConflict { ids: Vec<String> },

    #[error("Missing variants for {phase} update: {}", ids.join(", "))]
    MissingDocuments { phase: &'static str, ids: Vec<String> },

    #[error("Secondary alternates were rewritten concurrently for: {}", ids.join(", "))]
    AlternatesConflict { ids: Vec<String> },

    #[error("Invalid merge plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Inconsistent merge state: {0}")]
    IllegalState(String),
}

impl MergeError {
    /// Attach the offending locus to a merge error
    pub fn at_locus(locus: impl Into<String>, source: MergeError) -> Self {
        MergeError::Locus {
            locus: locus.into(),
            source: Box::new(source),
        }
    }

    /// Attach a batch key range to a merge error
    pub fn in_batch(range: impl Into<String>, source: MergeError) -> Self {
        MergeError::Batch {
            range: range.into(),
            source: Box::new(source),
        }
    }
}

/// A fatal merge error together with every counter accumulated before it
#[derive(Error, Debug)]
#[error("Merge aborted: {source}")]
pub struct MergeFailure {
    #[source]
    pub source: MergeError,
    pub partial: WriteResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_message_lists_keys() {
        let err = StoreError::DuplicateKey {
            keys: vec!["1:100:A:C".to_string(), "1:200:G:T".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Duplicate key conflict on 2 document(s): 1:100:A:C, 1:200:G:T"
        );
    }

    #[test]
    fn test_batch_context_wraps_locus_context() {
        let inner = MergeError::VariantNotFound {
            id: "1:100:A:C".to_string(),
        };
        let err = MergeError::in_batch("1:100:A:C..1:900:T:G", MergeError::at_locus("1:100:A:C", inner));

        let message = err.to_string();
        assert!(message.starts_with("Error loading batch 1:100:A:C..1:900:T:G"));
        assert!(message.contains("Error merging locus 1:100:A:C"));
    }
}
