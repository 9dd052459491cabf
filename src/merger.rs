// ==============================================================================
// merger.rs - Locus Merger
// ==============================================================================
// Description: Combines the staged calls of the files being loaded into one
//              merged locus per stage record (pure, no store access)
// Created: 2026-10-12
// Modified: 2026-10-17
// Version: 1.3.1
// ==============================================================================
// Singletons:
//   - Per file: no payload = missing, several payloads = duplicated (discarded),
//     one payload = merged; skipped types are counted and dropped
//   - Genotypes are remapped into the locus' canonical allele order
// Clusters (one merged locus per record, that record being the "main" one):
//   - A file with no call at the main locus contributes the overlapping call,
//     flagged as overlapped; with several calls the one at the main locus wins
//   - When part of the region is already in the canonical store, the stored
//     document of the first non-new overlapping record supplies the data of
//     previously indexed files (fetched ahead of time by the batch processor)
// ==============================================================================

use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::codec;
use crate::config::{MergeConfig, MergePlan};
use crate::error::MergeError;
use crate::genotype::{self, AlleleMapping};
use crate::grouper::OverlapGroup;
use crate::models::{
    AlternateCoordinate, FileCall, FileDocument, FileId, GenotypeBuckets, Locus, StageRecord, StageStudy,
};

/// Canonical documents prefetched for a batch, keyed by locus id
pub type FetchedVariants = HashMap<String, crate::models::VariantDocument>;

/// The merge result for one stage record
#[derive(Debug, Clone, PartialEq)]
pub struct MergedLocus {
    pub id: String,
    pub locus: Locus,

    /// The study has no canonical data at this locus yet
    pub new_study: bool,

    /// No study has canonical data at this locus yet
    pub new_variant: bool,

    /// A previous run already consumed the staged calls
    pub already_processed: bool,

    pub ids: BTreeSet<String>,
    pub files: Vec<FileDocument>,
    pub genotypes: GenotypeBuckets,
    pub secondary_alternates: Vec<AlternateCoordinate>,

    /// Length of the secondary alternate list recorded on the stage record
    pub recorded_alternates: usize,

    /// Files merged from a call at this exact locus
    pub direct_calls: usize,
    pub missing_files: usize,
    pub duplicated_files: usize,
    pub duplicated_calls: usize,
    pub skipped_files: usize,

    /// All files lacked a call here but an overlapping locus had data
    pub overlapped: bool,

    /// Files whose staged payloads this merge consumes
    pub consumed_files: Vec<FileId>,

    /// Files still listed as pending on the stage record
    pub pending_files: Vec<FileId>,
}

enum FileSlot<'r> {
    Missing,
    Consumed,
    Duplicated(usize),
    Single(&'r Value),
}

fn file_slot(study: &StageStudy, file_id: FileId) -> FileSlot<'_> {
    match study.files.get(&file_id) {
        None => FileSlot::Missing,
        Some(None) => FileSlot::Consumed,
        Some(Some(payloads)) => match payloads.as_slice() {
            [] => FileSlot::Missing,
            [payload] => FileSlot::Single(payload),
            _ => FileSlot::Duplicated(payloads.len()),
        },
    }
}

/// Allele mapping from a call's alleles into the canonical list (which may grow)
fn call_mapping(
    main: &AlternateCoordinate,
    call: &FileCall,
    alternates: &mut Vec<AlternateCoordinate>,
) -> AlleleMapping {
    let mut source = Vec::with_capacity(call.data.secondary_alternates.len() + 1);
    source.push(call.locus.to_coordinate());
    source.extend(call.data.secondary_alternates.iter().cloned());
    genotype::build_allele_mapping(&source, main, alternates)
}

#[derive(Debug, Clone)]
pub struct LocusMerger {
    plan: Arc<MergePlan>,
    exclude_genotypes: bool,
    unknown_genotype: Option<String>,
}

impl LocusMerger {
    pub fn new(plan: Arc<MergePlan>, config: &MergeConfig) -> Self {
        Self {
            plan,
            exclude_genotypes: config.exclude_genotypes,
            unknown_genotype: config.unknown_genotype.clone(),
        }
    }

    /// Merge every group of a batch, in order
    pub fn merge(&self, groups: &[OverlapGroup], fetched: &FetchedVariants) -> Result<Vec<MergedLocus>, MergeError> {
        let mut merged = Vec::new();

        for group in groups {
            match group {
                OverlapGroup::Single(record) => {
                    let locus = self
                        .merge_single(record)
                        .map_err(|e| MergeError::at_locus(&record.id, e))?;
                    merged.push(locus);
                }
                OverlapGroup::Cluster(records) => {
                    if self.cluster_processed(records) {
                        debug!("Cluster starting at {} already processed", records[0].id);
                        for record in records {
                            let study = self
                                .stage_study(record)
                                .map_err(|e| MergeError::at_locus(&record.id, e))?;
                            let mut locus = self.start(record, study);
                            locus.already_processed = true;
                            merged.push(locus);
                        }
                        continue;
                    }
                    for main in records {
                        let locus = self
                            .merge_overlapping(main, records, fetched)
                            .map_err(|e| MergeError::at_locus(&main.id, e))?;
                        merged.push(locus);
                    }
                }
            }
        }

        Ok(merged)
    }

    /// Ids of the canonical documents the clusters of a batch need
    pub fn required_fetches(&self, groups: &[OverlapGroup]) -> Vec<String> {
        let mut ids = BTreeSet::new();

        for group in groups {
            let OverlapGroup::Cluster(records) = group else {
                continue;
            };
            if self.cluster_processed(records) {
                continue;
            }
            for main in records {
                let overlapping = overlapping_records(main, records);
                if let Some(source) = self.authoritative_source(&overlapping) {
                    ids.insert(source.id.clone());
                }
            }
        }

        ids.into_iter().collect()
    }

    fn stage_study<'r>(&self, record: &'r StageRecord) -> Result<&'r StageStudy, MergeError> {
        record.study(self.plan.study_id()).ok_or_else(|| {
            MergeError::IllegalState(format!(
                "stage record {} has no data for study {}",
                record.id,
                self.plan.study_id()
            ))
        })
    }

    fn start(&self, record: &StageRecord, study: &StageStudy) -> MergedLocus {
        let study_id = self.plan.study_id();
        let new_variant = study.new_study
            && record
                .studies
                .iter()
                .all(|(&id, other)| id == study_id || other.new_study);

        let consumed_files = self
            .plan
            .file_ids
            .iter()
            .copied()
            .filter(|f| matches!(study.files.get(f), Some(Some(_))))
            .collect();
        let pending_files = record
            .pending
            .iter()
            .filter(|p| p.study_id == study_id && self.plan.file_ids.contains(&p.file_id))
            .map(|p| p.file_id)
            .collect();

        MergedLocus {
            id: record.id.clone(),
            locus: record.locus.clone(),
            new_study: study.new_study,
            new_variant,
            already_processed: false,
            ids: BTreeSet::new(),
            files: Vec::new(),
            genotypes: GenotypeBuckets::new(),
            secondary_alternates: study.secondary_alternates.clone(),
            recorded_alternates: study.secondary_alternates.len(),
            direct_calls: 0,
            missing_files: 0,
            duplicated_files: 0,
            duplicated_calls: 0,
            skipped_files: 0,
            overlapped: false,
            consumed_files,
            pending_files,
        }
    }

    /// A file being loaded was already consumed at this record
    fn already_processed(&self, record: &StageRecord) -> bool {
        record.study(self.plan.study_id()).is_some_and(|study| {
            self.plan
                .file_ids
                .iter()
                .any(|f| matches!(file_slot(study, *f), FileSlot::Consumed))
        })
    }

    fn cluster_processed(&self, records: &[StageRecord]) -> bool {
        records.iter().any(|r| self.already_processed(r))
    }

    /// Whether the record holds exactly one call for some file being loaded
    fn has_valid_call(&self, record: &StageRecord) -> bool {
        record.study(self.plan.study_id()).is_some_and(|study| {
            self.plan
                .file_ids
                .iter()
                .any(|f| matches!(file_slot(study, *f), FileSlot::Single(_)))
        })
    }

    /// First non-new record of a partially indexed region
    fn authoritative_source<'r>(&self, overlapping: &[&'r StageRecord]) -> Option<&'r StageRecord> {
        let study_id = self.plan.study_id();
        let new_region = overlapping.iter().any(|r| r.is_new_study(study_id));
        let completely_new = overlapping.iter().all(|r| r.is_new_study(study_id));

        if completely_new || !new_region || !self.plan.has_indexed_files() {
            return None;
        }
        overlapping.iter().copied().find(|r| !r.is_new_study(study_id))
    }

    fn pad_missing(&self, file_id: FileId, genotypes: &mut GenotypeBuckets) {
        if self.exclude_genotypes {
            return;
        }
        if let Some(unknown) = &self.unknown_genotype {
            for &sample in self.plan.samples_in_file(file_id) {
                genotype::add_sample(genotypes, unknown.clone(), sample);
            }
        }
    }

    fn add_call(
        &self,
        merged: &mut MergedLocus,
        call: &FileCall,
        overlapped: bool,
        mapping: &AlleleMapping,
    ) -> Result<(), MergeError> {
        merged.files.push(FileDocument {
            file_id: call.file_id,
            overlapped,
            call: call.data.call.clone(),
            attributes: call.data.attributes.clone(),
        });

        if !self.exclude_genotypes {
            genotype::bucket_genotypes(
                &call.data.genotypes,
                self.plan.samples_in_file(call.file_id),
                mapping,
                &mut merged.genotypes,
            )?;
        }
        Ok(())
    }

    fn add_ids(merged: &mut MergedLocus, call: &FileCall) {
        merged
            .ids
            .extend(call.data.ids.iter().filter(|id| !id.is_empty()).cloned());
    }

    fn merge_single(&self, record: &StageRecord) -> Result<MergedLocus, MergeError> {
        let study = self.stage_study(record)?;
        let mut merged = self.start(record, study);

        if self.already_processed(record) {
            merged.already_processed = true;
            return Ok(merged);
        }

        let main = record.locus.to_coordinate();
        let mut alternates = std::mem::take(&mut merged.secondary_alternates);

        for &file_id in &self.plan.file_ids {
            match file_slot(study, file_id) {
                FileSlot::Missing | FileSlot::Consumed => {
                    merged.missing_files += 1;
                    self.pad_missing(file_id, &mut merged.genotypes);
                }
                FileSlot::Duplicated(calls) => {
                    warn!("Found {} calls of file {} at {}, discarding them", calls, file_id, record.id);
                    merged.duplicated_files += 1;
                    merged.duplicated_calls += calls;
                    self.pad_missing(file_id, &mut merged.genotypes);
                }
                FileSlot::Single(payload) => {
                    let call = codec::decode_call(record, file_id, payload)?;
                    if call.variant_type().is_skipped() {
                        debug!("Skipping {} call of file {} at {}", call.variant_type().as_str(), file_id, record.id);
                        merged.skipped_files += 1;
                        continue;
                    }

                    let mapping = call_mapping(&main, &call, &mut alternates);
                    Self::add_ids(&mut merged, &call);
                    self.add_call(&mut merged, &call, false, &mapping)?;
                    merged.direct_calls += 1;
                }
            }
        }

        merged.secondary_alternates = alternates;
        Ok(merged)
    }

    fn merge_overlapping(
        &self,
        main: &StageRecord,
        cluster: &[StageRecord],
        fetched: &FetchedVariants,
    ) -> Result<MergedLocus, MergeError> {
        let study_id = self.plan.study_id();
        let study = self.stage_study(main)?;
        let mut merged = self.start(main, study);
        let overlapping = overlapping_records(main, cluster);

        for &file_id in &self.plan.file_ids {
            match file_slot(study, file_id) {
                FileSlot::Missing | FileSlot::Consumed => merged.missing_files += 1,
                FileSlot::Duplicated(calls) => {
                    warn!("Found {} calls of file {} at {}, discarding them", calls, file_id, main.id);
                    merged.duplicated_files += 1;
                    merged.duplicated_calls += calls;
                }
                FileSlot::Single(_) => {}
            }
        }

        if merged.missing_files + merged.duplicated_files == self.plan.file_ids.len() {
            if merged.new_study {
                // Nothing of this study at the main locus, and nothing to update
                return Ok(merged);
            }
            if overlapping.iter().any(|r| self.has_valid_call(r)) {
                merged.overlapped = true;
            }
        }

        let main_coord = main.locus.to_coordinate();
        let mut alternates = std::mem::take(&mut merged.secondary_alternates);

        for &file_id in &self.plan.file_ids {
            let mut calls = Vec::new();
            for record in &overlapping {
                let Some(other) = record.study(study_id) else {
                    continue;
                };
                if let FileSlot::Single(payload) = file_slot(other, file_id) {
                    calls.push(codec::decode_call(record, file_id, payload)?);
                }
            }

            let chosen = match calls.len() {
                0 => None,
                1 => {
                    let call = calls.swap_remove(0);
                    let overlapped = !call.locus.same_allele(&main.locus);
                    Some((call, overlapped))
                }
                _ => {
                    let provenance: HashSet<_> = calls.iter().map(|c| c.data.call.as_ref()).collect();
                    if provenance.len() > 1 {
                        warn!(
                            "File {} has {} overlapping calls with different origins around {}",
                            file_id,
                            calls.len(),
                            main.id
                        );
                    }
                    match calls.iter().position(|c| c.locus.same_allele(&main.locus)) {
                        Some(pos) => Some((calls.swap_remove(pos), false)),
                        None => Some((calls.swap_remove(0), true)),
                    }
                }
            };

            let Some((call, overlapped)) = chosen else {
                self.pad_missing(file_id, &mut merged.genotypes);
                continue;
            };
            if call.variant_type().is_skipped() {
                if !overlapped {
                    merged.skipped_files += 1;
                }
                continue;
            }

            let mapping = call_mapping(&main_coord, &call, &mut alternates);
            if !overlapped {
                Self::add_ids(&mut merged, &call);
                merged.direct_calls += 1;
            }
            self.add_call(&mut merged, &call, overlapped, &mapping)?;
        }

        if let Some(source) = self.authoritative_source(&overlapping) {
            self.merge_indexed(&mut merged, &main_coord, source, fetched, &mut alternates)?;
        }

        merged.secondary_alternates = alternates;
        Ok(merged)
    }

    /// Fold the stored data of previously indexed files into the merged locus
    fn merge_indexed(
        &self,
        merged: &mut MergedLocus,
        main_coord: &AlternateCoordinate,
        source: &StageRecord,
        fetched: &FetchedVariants,
        alternates: &mut Vec<AlternateCoordinate>,
    ) -> Result<(), MergeError> {
        let study_id = self.plan.study_id();
        let not_found = || MergeError::VariantNotFound { id: source.id.clone() };
        let document = fetched.get(&source.id).ok_or_else(not_found)?;
        let stored = document.study(study_id).ok_or_else(not_found)?;

        let mut source_alleles = Vec::with_capacity(stored.secondary_alternates.len() + 1);
        source_alleles.push(document.locus.to_coordinate());
        source_alleles.extend(stored.secondary_alternates.iter().cloned());
        let mapping = genotype::build_allele_mapping(&source_alleles, main_coord, alternates);

        // An existing study already holds this data at the main locus
        if !merged.new_study {
            return Ok(());
        }

        for file in &stored.files {
            if self.plan.file_ids.contains(&file.file_id) {
                continue;
            }
            let overlapped = match &file.call {
                None => !document.locus.same_allele(&merged.locus),
                Some(call) => !codec::call_matches_locus(call, &merged.locus)?,
            };
            merged.files.push(FileDocument {
                overlapped,
                ..file.clone()
            });
        }

        if !self.exclude_genotypes {
            let reloaded: BTreeSet<_> = self
                .plan
                .file_ids
                .iter()
                .flat_map(|f| self.plan.samples_in_file(*f).iter().copied())
                .collect();
            let mut kept = GenotypeBuckets::new();
            for (gt, samples) in &stored.genotypes {
                let samples: Vec<_> = samples.iter().copied().filter(|s| !reloaded.contains(s)).collect();
                if !samples.is_empty() {
                    kept.insert(gt.clone(), samples);
                }
            }
            genotype::remap_buckets(&kept, &mapping, &mut merged.genotypes)?;
        }
        Ok(())
    }
}

fn overlapping_records<'r>(main: &StageRecord, cluster: &'r [StageRecord]) -> Vec<&'r StageRecord> {
    cluster
        .iter()
        .filter(|r| r.locus.overlaps_locus(&main.locus))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouper::OverlapGrouper;
    use crate::models::{FileMetadata, OriginalCall, StudyDocument, StudyMetadata, VariantDocument};
    use serde_json::json;
    use std::collections::BTreeMap;

    const STUDY: u32 = 1;

    fn plan(file_ids: Vec<FileId>, indexed: &[FileId], resume: bool) -> Arc<MergePlan> {
        let mut files = BTreeMap::new();
        files.insert(1, FileMetadata { name: "f1.vcf".into(), samples: vec![1, 2] });
        files.insert(2, FileMetadata { name: "f2.vcf".into(), samples: vec![3, 4] });
        files.insert(3, FileMetadata { name: "f3.vcf".into(), samples: vec![5] });
        let study = StudyMetadata {
            study_id: STUDY,
            name: "test".into(),
            files,
            indexed_files: indexed.iter().copied().collect(),
        };
        let config = MergeConfig { resume, ..Default::default() };
        Arc::new(MergePlan::new(study, file_ids, &config).unwrap())
    }

    fn merger(plan: Arc<MergePlan>) -> LocusMerger {
        LocusMerger::new(plan, &MergeConfig::default())
    }

    fn record(start: u64, reference: &str, alternate: &str) -> StageRecord {
        StageRecord::new(Locus::new("1", start, reference, alternate))
    }

    fn run(merger: &LocusMerger, records: Vec<StageRecord>, fetched: &FetchedVariants) -> Vec<MergedLocus> {
        let groups = OverlapGrouper::new(STUDY, merger.plan.check_overlaps).group(records);
        merger.merge(&groups, fetched).unwrap()
    }

    #[test]
    fn test_singleton_merges_both_files() {
        let mut r = record(100, "A", "C");
        r.stage_call(STUDY, 1, json!({"genotypes": ["0/1", "0/0"], "ids": ["rs1"]}));
        r.stage_call(STUDY, 2, json!({"genotypes": ["1/1", "0/1"]}));

        let merged = run(&merger(plan(vec![1, 2], &[], false)), vec![r], &FetchedVariants::new());
        assert_eq!(merged.len(), 1);
        let locus = &merged[0];

        assert!(locus.new_study && locus.new_variant);
        assert_eq!(locus.direct_calls, 2);
        assert_eq!(locus.files.len(), 2);
        assert!(locus.files.iter().all(|f| !f.overlapped));
        assert_eq!(locus.genotypes.get("0/1"), Some(&vec![1, 4]));
        assert_eq!(locus.genotypes.get("0/0"), Some(&vec![2]));
        assert_eq!(locus.genotypes.get("1/1"), Some(&vec![3]));
        assert!(locus.ids.contains("rs1"));
        assert_eq!(locus.consumed_files, vec![1, 2]);
        assert_eq!(locus.pending_files, vec![1, 2]);
    }

    #[test]
    fn test_singleton_reconciles_secondary_alternates() {
        let main = Locus::new("1", 100, "A", "C");
        let x = Locus::new("1", 100, "A", "G").to_coordinate();
        let y = Locus::new("1", 100, "A", "T").to_coordinate();

        let mut r = StageRecord::new(main);
        r.stage_call(STUDY, 1, json!({"genotypes": ["0/2", "0/1"], "secondary_alternates": [x]}));
        r.stage_call(STUDY, 2, json!({"genotypes": ["1/2", "0/0"], "secondary_alternates": [y]}));

        let merged = run(&merger(plan(vec![1, 2], &[], false)), vec![r], &FetchedVariants::new());
        let locus = &merged[0];

        assert_eq!(locus.secondary_alternates, vec![x, y]);
        assert_eq!(locus.genotypes.get("0/2"), Some(&vec![1]));
        assert_eq!(locus.genotypes.get("1/3"), Some(&vec![3]));
        assert_eq!(locus.recorded_alternates, 0);
    }

    #[test]
    fn test_singleton_missing_duplicated_and_skipped() {
        let mut r = record(100, "A", "C");
        r.stage_call(STUDY, 1, json!({"genotypes": ["0/1", "0/1"]}));
        r.stage_call(STUDY, 1, json!({"genotypes": ["1/1", "1/1"]}));
        r.stage_call(STUDY, 3, json!({"genotypes": ["0/0"], "variant_type": "NO_VARIATION"}));

        let config = MergeConfig { unknown_genotype: Some("?/?".into()), ..Default::default() };
        let merger = LocusMerger::new(plan(vec![1, 2, 3], &[], false), &config);
        let merged = run(&merger, vec![r], &FetchedVariants::new());
        let locus = &merged[0];

        assert_eq!(locus.duplicated_files, 1);
        assert_eq!(locus.duplicated_calls, 2);
        assert_eq!(locus.missing_files, 1);
        assert_eq!(locus.skipped_files, 1);
        assert!(locus.files.is_empty());
        // File 1 (duplicated) and file 2 (missing) samples are padded
        assert_eq!(locus.genotypes.get("?/?"), Some(&vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_processed_cluster_error_names_locus() {
        let mut a = record(100, "A", "C");
        a.stage_call(STUDY, 1, json!({}));
        if let Some(study) = a.study_mut(STUDY) {
            study.files.insert(1, None);
        }
        let mut b = record(100, "A", "G");
        b.stage_call(2, 1, json!({}));

        let groups = vec![OverlapGroup::Cluster(vec![a, b])];
        let err = merger(plan(vec![1], &[], false))
            .merge(&groups, &FetchedVariants::new())
            .unwrap_err();
        assert!(matches!(err, MergeError::Locus { ref locus, .. } if locus == "1:100:A:G"));
    }

    #[test]
    fn test_consumed_record_is_already_processed() {
        let mut r = record(100, "A", "C");
        r.stage_call(STUDY, 1, json!({}));
        if let Some(study) = r.study_mut(STUDY) {
            study.files.insert(1, None);
        }

        let merged = run(&merger(plan(vec![1], &[], false)), vec![r], &FetchedVariants::new());
        assert!(merged[0].already_processed);
        assert!(merged[0].consumed_files.is_empty());
        assert_eq!(merged[0].pending_files, vec![1]);
    }

    #[test]
    fn test_cluster_prefers_call_at_main_locus() {
        let mut a = record(100, "A", "C");
        a.stage_call(STUDY, 1, json!({"genotypes": ["0/1", "0/0"]}));
        a.stage_call(STUDY, 2, json!({"genotypes": ["1/1", "0/1"]}));
        let mut b = record(100, "A", "G");
        b.stage_call(STUDY, 2, json!({"genotypes": ["0/1", "0/0"]}));

        let merged = run(&merger(plan(vec![1, 2], &[], false)), vec![a, b], &FetchedVariants::new());
        assert_eq!(merged.len(), 2);

        let at_a = &merged[0];
        assert_eq!(at_a.direct_calls, 2);
        assert!(at_a.files.iter().all(|f| !f.overlapped));

        // File 1 has no call at B: it contributes A's call as overlapped
        let at_b = &merged[1];
        assert_eq!(at_b.direct_calls, 1);
        let file1 = at_b.files.iter().find(|f| f.file_id == 1).unwrap();
        assert!(file1.overlapped);
        assert_eq!(at_b.secondary_alternates, vec![Locus::new("1", 100, "A", "C").to_coordinate()]);
        assert_eq!(at_b.genotypes.get("0/2"), Some(&vec![1]));
        assert!(!at_b.overlapped);
    }

    #[test]
    fn test_new_study_without_calls_at_main_is_empty() {
        let mut a = record(100, "A", "C");
        a.stage_call(STUDY, 1, json!({"genotypes": ["0/1", "0/0"]}));
        let mut b = record(100, "A", "G");
        b.stage_call(STUDY, 1, json!({"genotypes": ["0/1", "0/0"]}));
        b.stage_call(STUDY, 1, json!({"genotypes": ["1/1", "0/0"]}));

        let merged = run(&merger(plan(vec![1, 2], &[], false)), vec![a, b], &FetchedVariants::new());
        let at_b = &merged[1];
        assert!(at_b.files.is_empty());
        assert_eq!(at_b.duplicated_calls, 2);
        assert_eq!(at_b.missing_files, 1);
    }

    #[test]
    fn test_partially_indexed_region_uses_stored_document() {
        // Locus A holds indexed file 1; file 2 is loaded with a call at B only
        let locus_a = Locus::new("1", 100, "A", "C");
        let locus_b = Locus::new("1", 100, "A", "G");

        let mut a = StageRecord::new(locus_a.clone());
        a.studies.insert(STUDY, StageStudy { new_study: false, ..Default::default() });
        let mut b = StageRecord::new(locus_b.clone());
        b.stage_call(STUDY, 2, json!({"genotypes": ["0/1", "1/1"]}));

        let stored = VariantDocument {
            id: locus_a.id(),
            locus: locus_a.clone(),
            ids: BTreeSet::new(),
            studies: vec![StudyDocument {
                study_id: STUDY,
                files: vec![FileDocument {
                    file_id: 1,
                    overlapped: false,
                    call: None,
                    attributes: BTreeMap::new(),
                }],
                genotypes: BTreeMap::from([("0/1".to_string(), vec![1]), ("0/0".to_string(), vec![2])]),
                secondary_alternates: vec![],
            }],
            release: BTreeSet::from([1]),
        };

        let merger = merger(plan(vec![2], &[1], false));
        let groups = OverlapGrouper::new(STUDY, true).group(vec![a, b]);
        assert_eq!(merger.required_fetches(&groups), vec![locus_a.id()]);

        // Missing prefetch is fatal
        assert!(matches!(
            merger.merge(&groups, &FetchedVariants::new()),
            Err(MergeError::Locus { .. })
        ));

        let fetched = FetchedVariants::from([(locus_a.id(), stored)]);
        let merged = merger.merge(&groups, &fetched).unwrap();

        let at_a = &merged[0];
        assert!(!at_a.new_study);
        assert!(at_a.overlapped);
        assert_eq!(at_a.direct_calls, 0);
        assert_eq!(at_a.files.len(), 1);
        assert!(at_a.files[0].overlapped);
        assert_eq!(at_a.genotypes.get("0/2"), Some(&vec![3]));
        assert_eq!(at_a.genotypes.get("2/2"), Some(&vec![4]));
        assert_eq!(at_a.secondary_alternates, vec![locus_b.to_coordinate()]);

        let at_b = &merged[1];
        assert!(at_b.new_study);
        assert!(at_b.new_variant);
        let indexed = at_b.files.iter().find(|f| f.file_id == 1).unwrap();
        assert!(indexed.overlapped);
        assert_eq!(at_b.genotypes.get("0/2"), Some(&vec![1]));
        assert_eq!(at_b.genotypes.get("0/1"), Some(&vec![3]));
        assert_eq!(at_b.genotypes.get("1/1"), Some(&vec![4]));
    }

    #[test]
    fn test_stored_call_provenance_decides_overlap() {
        let locus_a = Locus::new("1", 101, "C", "T");
        let mut a = StageRecord::new(locus_a.clone());
        a.studies.insert(STUDY, StageStudy { new_study: false, ..Default::default() });
        let mut b = record(101, "C", "");
        b.stage_call(STUDY, 2, json!({"genotypes": ["0/1", "0/0"]}));

        // The stored call comes from a multi-allelic line covering both loci
        let stored = VariantDocument {
            id: locus_a.id(),
            locus: locus_a.clone(),
            ids: BTreeSet::new(),
            studies: vec![StudyDocument {
                study_id: STUDY,
                files: vec![FileDocument {
                    file_id: 1,
                    overlapped: false,
                    call: Some(OriginalCall { variant_id: "1:100:AC:AT,A".into(), allele_index: 0 }),
                    attributes: BTreeMap::new(),
                }],
                genotypes: BTreeMap::new(),
                secondary_alternates: vec![],
            }],
            release: BTreeSet::new(),
        };

        let merger = merger(plan(vec![2], &[1], false));
        let fetched = FetchedVariants::from([(locus_a.id(), stored)]);
        let merged = run(&merger, vec![a, b], &fetched);

        let at_b = &merged[1];
        let indexed = at_b.files.iter().find(|f| f.file_id == 1).unwrap();
        assert!(!indexed.overlapped);
    }
}
