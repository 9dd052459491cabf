// ==============================================================================
// lib.rs - Variant Merge Library
// ==============================================================================
// Description: Merges staged per-file variant calls of a study into the
//              canonical multi-study variant store
// Created: 2026-10-12
// Modified: 2026-10-16
// Version: 1.2.0
// ==============================================================================

pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod genotype;
pub mod grouper;
pub mod loader;
pub mod merger;
pub mod models;
pub mod operations;
pub mod result;
pub mod store;

pub use config::{MergeConfig, MergePlan};
pub use error::{MergeError, MergeFailure, StoreError};
pub use loader::MergeLoader;
pub use result::{MergeReport, WriteResult};
