// ==============================================================================
// operations.rs - Write Operation Builder
// ==============================================================================
// Description: Turns merged loci into conditional upserts/updates against the
//              variants store plus stage bookkeeping, and defines how each
//              operation applies to a document
// Created: 2026-10-13
// Modified: 2026-10-16
// Version: 1.2.0
// ==============================================================================
// Operation kinds:
//   InsertNewLocus / AppendNewStudyToLocus  filter {id, study absent}, upsert
//   UpdateExistingStudy                     filter {id, study present}
//   UpdateSecondaryAlternates               stage, guarded by recorded list
//   CleanStageEntry                         stage, null files then drop pending
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::merger::MergedLocus;
use crate::models::{
    AlternateCoordinate, FileDocument, FileId, GenotypeBuckets, Locus, StageRecord, StudyDocument, StudyId,
    VariantDocument,
};
use crate::result::WriteResult;

/// Match a variant document by id and presence of the study
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocusFilter {
    pub id: String,
    pub study_id: StudyId,
    pub study_present: bool,
}

impl LocusFilter {
    pub fn matches(&self, document: &VariantDocument) -> bool {
        document.id == self.id && document.study(self.study_id).is_some() == self.study_present
    }
}

/// Study data written where the study had nothing yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStudyUpdate {
    /// Identity fields, used only when the document is created
    pub locus: Locus,
    pub ids: BTreeSet<String>,
    pub study: StudyDocument,
    pub release: u32,
}

/// Additions to an existing study entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingStudyUpdate {
    pub ids: BTreeSet<String>,
    pub files: Vec<FileDocument>,
    pub genotypes: GenotypeBuckets,
    pub secondary_alternates: Vec<AlternateCoordinate>,
    pub release: Option<u32>,
    /// Add-to-set semantics for resumed loads
    pub add_to_set: bool,
}

impl ExistingStudyUpdate {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.files.is_empty()
            && self.genotypes.is_empty()
            && self.secondary_alternates.is_empty()
    }
}

/// Stage alternates guard: the recorded list must be absent or one of these prefixes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternatesFilter {
    pub stage_id: String,
    pub study_id: StudyId,
    pub accepted: Vec<Vec<AlternateCoordinate>>,
}

impl AlternatesFilter {
    /// Accept an absent list or any non-empty prefix of the new list
    pub fn for_list(stage_id: &str, study_id: StudyId, alternates: &[AlternateCoordinate]) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            study_id,
            accepted: (1..=alternates.len()).map(|n| alternates[..n].to_vec()).collect(),
        }
    }

    pub fn accepts(&self, recorded: &[AlternateCoordinate]) -> bool {
        recorded.is_empty() || self.accepted.iter().any(|prefix| prefix.as_slice() == recorded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CleanStep {
    /// Null the consumed file payloads; flip the new-study flag when data was written
    NullFiles { files: Vec<FileId>, mark_not_new: bool },
    /// Remove (study, file) pairs from the pending list
    DropPending { files: Vec<FileId> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOperation {
    InsertNewLocus {
        filter: LocusFilter,
        update: NewStudyUpdate,
    },
    AppendNewStudyToLocus {
        filter: LocusFilter,
        update: NewStudyUpdate,
    },
    UpdateExistingStudy {
        filter: LocusFilter,
        update: ExistingStudyUpdate,
    },
    UpdateSecondaryAlternates {
        filter: AlternatesFilter,
        alternates: Vec<AlternateCoordinate>,
    },
    CleanStageEntry {
        stage_id: String,
        study_id: StudyId,
        step: CleanStep,
    },
}

impl WriteOperation {
    /// Id of the document the operation targets
    pub fn target_id(&self) -> &str {
        match self {
            WriteOperation::InsertNewLocus { filter, .. }
            | WriteOperation::AppendNewStudyToLocus { filter, .. }
            | WriteOperation::UpdateExistingStudy { filter, .. } => &filter.id,
            WriteOperation::UpdateSecondaryAlternates { filter, .. } => &filter.stage_id,
            WriteOperation::CleanStageEntry { stage_id, .. } => stage_id,
        }
    }

    pub fn locus_filter(&self) -> Option<&LocusFilter> {
        match self {
            WriteOperation::InsertNewLocus { filter, .. }
            | WriteOperation::AppendNewStudyToLocus { filter, .. }
            | WriteOperation::UpdateExistingStudy { filter, .. } => Some(filter),
            _ => None,
        }
    }
}

/// What applying one operation did to its document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Modified,
    /// Matched but already up to date
    Unchanged,
    NotMatched,
}

impl ApplyOutcome {
    pub fn matched(&self) -> bool {
        matches!(self, ApplyOutcome::Modified | ApplyOutcome::Unchanged)
    }
}

/// An upsert whose filter missed a document that holds the id (duplicate key)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey(pub String);

/// Apply a variants-store operation to the (possibly absent) document with its id
pub fn apply_to_variant(
    document: &mut Option<VariantDocument>,
    operation: &WriteOperation,
) -> Result<ApplyOutcome, DuplicateKey> {
    match operation {
        WriteOperation::InsertNewLocus { filter, update }
        | WriteOperation::AppendNewStudyToLocus { filter, update } => match document {
            Some(doc) if filter.matches(doc) => {
                doc.ids.extend(update.ids.iter().cloned());
                doc.studies.push(update.study.clone());
                doc.release.insert(update.release);
                Ok(ApplyOutcome::Modified)
            }
            // The filter excludes documents holding the study: the upsert collides on id
            Some(_) => Err(DuplicateKey(filter.id.clone())),
            None => {
                *document = Some(VariantDocument {
                    id: filter.id.clone(),
                    locus: update.locus.clone(),
                    ids: update.ids.clone(),
                    studies: vec![update.study.clone()],
                    release: BTreeSet::from([update.release]),
                });
                Ok(ApplyOutcome::Inserted)
            }
        },
        WriteOperation::UpdateExistingStudy { filter, update } => {
            let Some(doc) = document.as_mut().filter(|d| filter.matches(d)) else {
                return Ok(ApplyOutcome::NotMatched);
            };
            let mut changed = false;

            for id in &update.ids {
                changed |= doc.ids.insert(id.clone());
            }
            if let Some(release) = update.release {
                changed |= doc.release.insert(release);
            }

            let Some(study) = doc.study_mut(filter.study_id) else {
                return Ok(ApplyOutcome::NotMatched);
            };
            for file in &update.files {
                if !update.add_to_set || !study.files.contains(file) {
                    study.files.push(file.clone());
                    changed = true;
                }
            }
            for (genotype, samples) in &update.genotypes {
                let bucket = study.genotypes.entry(genotype.clone()).or_default();
                for &sample in samples {
                    if !update.add_to_set || !bucket.contains(&sample) {
                        bucket.push(sample);
                        changed = true;
                    }
                }
            }
            for alternate in &update.secondary_alternates {
                if !study.secondary_alternates.contains(alternate) {
                    study.secondary_alternates.push(alternate.clone());
                    changed = true;
                }
            }

            Ok(if changed {
                ApplyOutcome::Modified
            } else {
                ApplyOutcome::Unchanged
            })
        }
        WriteOperation::UpdateSecondaryAlternates { .. } | WriteOperation::CleanStageEntry { .. } => {
            Ok(ApplyOutcome::NotMatched)
        }
    }
}

/// Apply a stage operation to a stage record
pub fn apply_to_stage(record: &mut StageRecord, operation: &WriteOperation) -> ApplyOutcome {
    match operation {
        WriteOperation::UpdateSecondaryAlternates { filter, alternates } => {
            let Some(study) = record.study_mut(filter.study_id) else {
                return ApplyOutcome::NotMatched;
            };
            if !filter.accepts(&study.secondary_alternates) {
                return ApplyOutcome::NotMatched;
            }
            if &study.secondary_alternates == alternates {
                return ApplyOutcome::Unchanged;
            }
            study.secondary_alternates = alternates.clone();
            ApplyOutcome::Modified
        }
        WriteOperation::CleanStageEntry { study_id, step, .. } => match step {
            CleanStep::NullFiles { files, mark_not_new } => {
                let Some(study) = record.study_mut(*study_id) else {
                    return ApplyOutcome::NotMatched;
                };
                let mut changed = false;
                for file_id in files {
                    if let Some(slot) = study.files.get_mut(file_id) {
                        changed |= slot.take().is_some();
                    }
                }
                if *mark_not_new && study.new_study {
                    study.new_study = false;
                    changed = true;
                }
                if changed {
                    ApplyOutcome::Modified
                } else {
                    ApplyOutcome::Unchanged
                }
            }
            CleanStep::DropPending { files } => {
                let before = record.pending.len();
                record
                    .pending
                    .retain(|p| !(p.study_id == *study_id && files.contains(&p.file_id)));
                if record.pending.len() < before {
                    ApplyOutcome::Modified
                } else {
                    ApplyOutcome::Unchanged
                }
            }
        },
        _ => ApplyOutcome::NotMatched,
    }
}

/// Everything one batch writes, in execution order
#[derive(Debug, Clone, Default)]
pub struct BatchOperations {
    pub secondary_alternates: Vec<WriteOperation>,
    pub new_study: Vec<WriteOperation>,
    pub existing_study: Vec<WriteOperation>,
    pub clean_files: Vec<WriteOperation>,
    pub clean_pending: Vec<WriteOperation>,
    /// Outcome counters decided at build time
    pub counters: WriteResult,
}

impl BatchOperations {
    pub fn is_empty(&self) -> bool {
        self.secondary_alternates.is_empty()
            && self.new_study.is_empty()
            && self.existing_study.is_empty()
            && self.clean_files.is_empty()
            && self.clean_pending.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct OperationBuilder {
    study_id: StudyId,
    release: u32,
    resume: bool,
}

impl OperationBuilder {
    pub fn new(study_id: StudyId, release: u32, resume: bool) -> Self {
        Self {
            study_id,
            release,
            resume,
        }
    }

    pub fn build(&self, merged: Vec<MergedLocus>) -> BatchOperations {
        let mut ops = BatchOperations::default();

        for locus in merged {
            ops.counters.staged_records += 1;
            ops.counters.duplicated_calls += locus.duplicated_calls as u64;
            if locus.overlapped {
                ops.counters.overlapped_variants += 1;
            }

            let written = if locus.already_processed {
                ops.counters.missing_variants_no_fill_gaps += 1;
                false
            } else if locus.new_study {
                self.build_new_study(&locus, &mut ops)
            } else {
                self.build_existing_study(&locus, &mut ops)
            };

            if written
                && !locus.files.is_empty()
                && !locus.secondary_alternates.is_empty()
                && locus.secondary_alternates.len() != locus.recorded_alternates
            {
                ops.secondary_alternates.push(WriteOperation::UpdateSecondaryAlternates {
                    filter: AlternatesFilter::for_list(&locus.id, self.study_id, &locus.secondary_alternates),
                    alternates: locus.secondary_alternates.clone(),
                });
            }

            if !locus.consumed_files.is_empty() {
                ops.clean_files.push(WriteOperation::CleanStageEntry {
                    stage_id: locus.id.clone(),
                    study_id: self.study_id,
                    step: CleanStep::NullFiles {
                        files: locus.consumed_files.clone(),
                        mark_not_new: written && locus.new_study,
                    },
                });
            }
            if !locus.pending_files.is_empty() {
                ops.clean_pending.push(WriteOperation::CleanStageEntry {
                    stage_id: locus.id.clone(),
                    study_id: self.study_id,
                    step: CleanStep::DropPending {
                        files: locus.pending_files.clone(),
                    },
                });
            }
        }

        debug!(
            "Built {} new-study, {} existing-study and {} stage operations",
            ops.new_study.len(),
            ops.existing_study.len(),
            ops.secondary_alternates.len() + ops.clean_files.len() + ops.clean_pending.len()
        );
        ops
    }

    fn count_unwritten(locus: &MergedLocus, counters: &mut WriteResult) {
        if locus.duplicated_files > 0 {
            counters.non_inserted_variants += 1;
        } else if locus.skipped_files > 0 {
            counters.skipped_variants += 1;
        } else {
            counters.missing_variants_no_fill_gaps += 1;
        }
    }

    fn build_new_study(&self, locus: &MergedLocus, ops: &mut BatchOperations) -> bool {
        if locus.files.is_empty() {
            Self::count_unwritten(locus, &mut ops.counters);
            return false;
        }

        let filter = LocusFilter {
            id: locus.id.clone(),
            study_id: self.study_id,
            study_present: false,
        };
        let update = NewStudyUpdate {
            locus: locus.locus.clone(),
            ids: locus.ids.clone(),
            study: StudyDocument {
                study_id: self.study_id,
                files: locus.files.clone(),
                genotypes: locus.genotypes.clone(),
                secondary_alternates: locus.secondary_alternates.clone(),
            },
            release: self.release,
        };

        ops.new_study.push(if locus.new_variant {
            WriteOperation::InsertNewLocus { filter, update }
        } else {
            WriteOperation::AppendNewStudyToLocus { filter, update }
        });
        ops.counters.new_variants += 1;
        true
    }

    fn build_existing_study(&self, locus: &MergedLocus, ops: &mut BatchOperations) -> bool {
        let has_files = !locus.files.is_empty();
        let update = ExistingStudyUpdate {
            ids: locus.ids.clone(),
            files: locus.files.clone(),
            genotypes: locus.genotypes.clone(),
            secondary_alternates: if has_files {
                locus.secondary_alternates.clone()
            } else {
                Vec::new()
            },
            release: has_files.then_some(self.release),
            add_to_set: self.resume,
        };

        if update.is_empty() {
            Self::count_unwritten(locus, &mut ops.counters);
            return false;
        }

        if has_files && locus.direct_calls > 0 {
            ops.counters.updated_variants += 1;
        } else {
            ops.counters.missing_variants += 1;
        }
        ops.existing_study.push(WriteOperation::UpdateExistingStudy {
            filter: LocusFilter {
                id: locus.id.clone(),
                study_id: self.study_id,
                study_present: true,
            },
            update,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudyFile;
    use std::collections::BTreeMap;

    fn merged(id_start: u64, new_study: bool) -> MergedLocus {
        let locus = Locus::new("1", id_start, "A", "C");
        MergedLocus {
            id: locus.id(),
            locus,
            new_study,
            new_variant: new_study,
            already_processed: false,
            ids: BTreeSet::new(),
            files: Vec::new(),
            genotypes: GenotypeBuckets::new(),
            secondary_alternates: Vec::new(),
            recorded_alternates: 0,
            direct_calls: 0,
            missing_files: 0,
            duplicated_files: 0,
            duplicated_calls: 0,
            skipped_files: 0,
            overlapped: false,
            consumed_files: vec![1],
            pending_files: vec![1],
        }
    }

    fn file(file_id: FileId, overlapped: bool) -> FileDocument {
        FileDocument {
            file_id,
            overlapped,
            call: None,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_new_variant_becomes_insert() {
        let mut locus = merged(100, true);
        locus.files = vec![file(1, false)];
        locus.direct_calls = 1;

        let ops = OperationBuilder::new(1, 3, false).build(vec![locus]);
        assert_eq!(ops.new_study.len(), 1);
        assert!(matches!(ops.new_study[0], WriteOperation::InsertNewLocus { .. }));
        assert_eq!(ops.counters.new_variants, 1);
        assert!(ops.counters.is_balanced());

        assert!(matches!(
            &ops.clean_files[0],
            WriteOperation::CleanStageEntry { step: CleanStep::NullFiles { mark_not_new: true, .. }, .. }
        ));
        assert!(matches!(
            &ops.clean_pending[0],
            WriteOperation::CleanStageEntry { study_id: 1, step: CleanStep::DropPending { files }, .. } if files == &vec![1]
        ));
    }

    #[test]
    fn test_new_study_on_existing_locus_appends() {
        let mut locus = merged(100, true);
        locus.new_variant = false;
        locus.files = vec![file(1, false)];

        let ops = OperationBuilder::new(1, 1, false).build(vec![locus]);
        assert!(matches!(ops.new_study[0], WriteOperation::AppendNewStudyToLocus { .. }));
    }

    #[test]
    fn test_unwritten_new_study_outcomes() {
        let mut duplicated = merged(100, true);
        duplicated.duplicated_files = 1;
        duplicated.duplicated_calls = 2;
        let mut skipped = merged(200, true);
        skipped.skipped_files = 1;
        let empty = merged(300, true);

        let ops = OperationBuilder::new(1, 1, false).build(vec![duplicated, skipped, empty]);
        assert!(ops.new_study.is_empty());
        assert_eq!(ops.counters.non_inserted_variants, 1);
        assert_eq!(ops.counters.skipped_variants, 1);
        assert_eq!(ops.counters.missing_variants_no_fill_gaps, 1);
        assert_eq!(ops.counters.duplicated_calls, 2);
        assert!(ops.counters.is_balanced());

        // Stage payloads are still consumed, the locus stays new
        assert!(ops.clean_files.iter().all(|op| matches!(
            op,
            WriteOperation::CleanStageEntry { step: CleanStep::NullFiles { mark_not_new: false, .. }, .. }
        )));
    }

    #[test]
    fn test_existing_study_updated_vs_gap_filled() {
        let mut direct = merged(100, false);
        direct.files = vec![file(1, false)];
        direct.direct_calls = 1;
        let mut overlapped = merged(200, false);
        overlapped.files = vec![file(1, true)];
        overlapped.overlapped = true;
        let mut padded = merged(300, false);
        padded.genotypes.insert("?/?".into(), vec![1]);
        let nothing = merged(400, false);

        let ops = OperationBuilder::new(1, 1, true).build(vec![direct, overlapped, padded, nothing]);
        assert_eq!(ops.existing_study.len(), 3);
        assert_eq!(ops.counters.updated_variants, 1);
        assert_eq!(ops.counters.missing_variants, 2);
        assert_eq!(ops.counters.missing_variants_no_fill_gaps, 1);
        assert_eq!(ops.counters.overlapped_variants, 1);
        assert!(ops.counters.is_balanced());

        let WriteOperation::UpdateExistingStudy { update, .. } = &ops.existing_study[2] else {
            panic!("expected existing-study update");
        };
        assert!(update.add_to_set);
        assert_eq!(update.release, None);
    }

    #[test]
    fn test_alternates_update_only_when_list_grew() {
        let coord = |alt: &str| Locus::new("1", 100, "A", alt).to_coordinate();

        let mut grown = merged(100, false);
        grown.files = vec![file(1, false)];
        grown.direct_calls = 1;
        grown.secondary_alternates = vec![coord("G"), coord("T")];
        grown.recorded_alternates = 1;

        let mut same = grown.clone();
        same.id = "1:100:A:T".into();
        same.recorded_alternates = 2;

        let ops = OperationBuilder::new(1, 1, false).build(vec![grown, same]);
        assert_eq!(ops.secondary_alternates.len(), 1);

        let WriteOperation::UpdateSecondaryAlternates { filter, .. } = &ops.secondary_alternates[0] else {
            panic!("expected alternates update");
        };
        assert!(filter.accepts(&[]));
        assert!(filter.accepts(&[coord("G")]));
        assert!(filter.accepts(&[coord("G"), coord("T")]));
        assert!(!filter.accepts(&[coord("T")]));
    }

    #[test]
    fn test_already_processed_only_cleans_pending() {
        let mut locus = merged(100, true);
        locus.already_processed = true;
        locus.consumed_files.clear();

        let ops = OperationBuilder::new(1, 1, false).build(vec![locus]);
        assert!(ops.clean_files.is_empty());
        assert_eq!(ops.clean_pending.len(), 1);
        assert_eq!(ops.counters.missing_variants_no_fill_gaps, 1);
    }

    #[test]
    fn test_apply_new_study_conflicts_when_study_present() {
        let mut locus = merged(100, true);
        locus.files = vec![file(1, false)];
        let ops = OperationBuilder::new(1, 1, false).build(vec![locus]);
        let op = &ops.new_study[0];

        let mut document = None;
        assert_eq!(apply_to_variant(&mut document, op), Ok(ApplyOutcome::Inserted));
        assert_eq!(document.as_ref().map(|d| d.studies.len()), Some(1));

        assert_eq!(
            apply_to_variant(&mut document, op),
            Err(DuplicateKey("1:100:A:C".to_string()))
        );
    }

    #[test]
    fn test_apply_existing_study_add_to_set() {
        let mut locus = merged(100, false);
        locus.files = vec![file(2, false)];
        locus.direct_calls = 1;
        locus.genotypes.insert("0/1".into(), vec![5]);
        let ops = OperationBuilder::new(1, 1, true).build(vec![locus]);
        let op = &ops.existing_study[0];

        let mut missing = None;
        assert_eq!(apply_to_variant(&mut missing, op), Ok(ApplyOutcome::NotMatched));

        let base = Locus::new("1", 100, "A", "C");
        let mut document = Some(VariantDocument {
            id: base.id(),
            locus: base,
            ids: BTreeSet::new(),
            studies: vec![StudyDocument {
                study_id: 1,
                files: vec![file(1, false)],
                genotypes: GenotypeBuckets::new(),
                secondary_alternates: vec![],
            }],
            release: BTreeSet::new(),
        });
        assert_eq!(apply_to_variant(&mut document, op), Ok(ApplyOutcome::Modified));
        assert_eq!(apply_to_variant(&mut document, op), Ok(ApplyOutcome::Unchanged));

        let study = document.as_ref().and_then(|d| d.study(1)).unwrap();
        assert_eq!(study.files.len(), 2);
        assert_eq!(study.genotypes.get("0/1"), Some(&vec![5]));
    }

    #[test]
    fn test_apply_stage_cleanup_steps() {
        let mut record = StageRecord::new(Locus::new("1", 100, "A", "C"));
        record.stage_call(1, 1, serde_json::json!({}));
        record.stage_call(2, 1, serde_json::json!({}));

        let null_files = WriteOperation::CleanStageEntry {
            stage_id: record.id.clone(),
            study_id: 1,
            step: CleanStep::NullFiles { files: vec![1], mark_not_new: true },
        };
        let drop_pending = WriteOperation::CleanStageEntry {
            stage_id: record.id.clone(),
            study_id: 1,
            step: CleanStep::DropPending { files: vec![1] },
        };

        assert_eq!(apply_to_stage(&mut record, &null_files), ApplyOutcome::Modified);
        assert_eq!(apply_to_stage(&mut record, &null_files), ApplyOutcome::Unchanged);
        assert_eq!(apply_to_stage(&mut record, &drop_pending), ApplyOutcome::Modified);

        let study = record.study(1).unwrap();
        assert!(!study.new_study);
        assert_eq!(study.files.get(&1), Some(&None));
        assert_eq!(record.pending, vec![StudyFile { study_id: 2, file_id: 1 }]);
        assert!(record.is_new_study(2));
    }

    #[test]
    fn test_apply_stage_alternates_guard() {
        let coord = |alt: &str| Locus::new("1", 100, "A", alt).to_coordinate();
        let mut record = StageRecord::new(Locus::new("1", 100, "A", "C"));
        record.stage_call(1, 1, serde_json::json!({}));
        if let Some(study) = record.study_mut(1) {
            study.secondary_alternates = vec![coord("T")];
        }

        let new_list = vec![coord("G"), coord("T")];
        let op = WriteOperation::UpdateSecondaryAlternates {
            filter: AlternatesFilter::for_list(&record.id, 1, &new_list),
            alternates: new_list.clone(),
        };
        assert_eq!(apply_to_stage(&mut record, &op), ApplyOutcome::NotMatched);

        if let Some(study) = record.study_mut(1) {
            study.secondary_alternates = vec![coord("G")];
        }
        assert_eq!(apply_to_stage(&mut record, &op), ApplyOutcome::Modified);
        assert_eq!(record.study(1).unwrap().secondary_alternates, new_list);
    }
}
