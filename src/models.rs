// ==============================================================================
// models.rs - Variant Merge Data Models
// ==============================================================================
// Description: Loci, stage records, canonical variant documents and study metadata
// Created: 2026-10-12
// Modified: 2026-10-17
// Version: 1.2.1
// ==============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::codec;

/// Study identifier (small per-study integer)
pub type StudyId = u32;

/// Input file identifier, unique within a study
pub type FileId = u32;

/// Sample identifier, unique within a study
pub type SampleId = u32;

/// Genotype string -> samples carrying it (e.g. "0/1" -> [3, 7])
pub type GenotypeBuckets = BTreeMap<String, Vec<SampleId>>;

/// Variant classification used for grouping and skip decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantType {
    #[default]
    Snv,
    Mnv,
    Indel,
    Insertion,
    Deletion,
    /// Reference-only call (no alternate allele)
    NoVariation,
    /// Symbolic allele such as `<DEL>` or `<*>`
    Symbolic,
    Cnv,
    Duplication,
    Inversion,
    Translocation,
    Breakend,
    /// Generic structural variant
    Sv,
}

impl VariantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantType::Snv => "SNV",
            VariantType::Mnv => "MNV",
            VariantType::Indel => "INDEL",
            VariantType::Insertion => "INSERTION",
            VariantType::Deletion => "DELETION",
            VariantType::NoVariation => "NO_VARIATION",
            VariantType::Symbolic => "SYMBOLIC",
            VariantType::Cnv => "CNV",
            VariantType::Duplication => "DUPLICATION",
            VariantType::Inversion => "INVERSION",
            VariantType::Translocation => "TRANSLOCATION",
            VariantType::Breakend => "BREAKEND",
            VariantType::Sv => "SV",
        }
    }

    /// Structural variants never join an overlap cluster
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            VariantType::Sv
                | VariantType::Cnv
                | VariantType::Duplication
                | VariantType::Inversion
                | VariantType::Translocation
                | VariantType::Breakend
        )
    }

    /// Types whose overlap window ends at their start position
    pub fn uses_start_as_end(&self) -> bool {
        matches!(self, VariantType::Symbolic | VariantType::Cnv)
    }

    /// Types the merge never writes (counted as skipped)
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            VariantType::NoVariation | VariantType::Symbolic | VariantType::Translocation
        )
    }

    /// Infer the type from reference and alternate alleles
    pub fn infer(reference: &str, alternate: &str) -> Self {
        if alternate.contains('[') || alternate.contains(']') {
            return VariantType::Breakend;
        }
        if let Some(symbol) = alternate.strip_prefix('<') {
            let symbol = symbol.trim_end_matches('>');
            return if symbol.starts_with("CN") {
                VariantType::Cnv
            } else if symbol.starts_with("DUP") {
                VariantType::Duplication
            } else if symbol.starts_with("INV") {
                VariantType::Inversion
            } else {
                VariantType::Symbolic
            };
        }
        if alternate == "." || alternate == reference {
            return VariantType::NoVariation;
        }

        match (reference.len(), alternate.len()) {
            (1, 1) => VariantType::Snv,
            (0, _) => VariantType::Insertion,
            (_, 0) => VariantType::Deletion,
            (r, a) if r == a => VariantType::Mnv,
            _ => VariantType::Indel,
        }
    }
}

/// A genomic locus with its main alternate allele
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locus {
    /// Chromosome name (e.g., "1", "X", "MT")
    pub chromosome: String,

    /// 1-based start position
    pub start: u64,

    /// 1-based inclusive end position
    pub end: u64,

    /// Reference allele (empty for insertions)
    pub reference: String,

    /// Main alternate allele (empty for deletions)
    pub alternate: String,

    #[serde(default)]
    pub variant_type: VariantType,
}

impl Locus {
    /// Build a locus inferring end and type from the alleles
    pub fn new(
        chromosome: impl Into<String>,
        start: u64,
        reference: impl Into<String>,
        alternate: impl Into<String>,
    ) -> Self {
        let reference = reference.into();
        let alternate = alternate.into();
        let variant_type = VariantType::infer(&reference, &alternate);
        let end = if variant_type.uses_start_as_end() {
            start
        } else if reference.is_empty() {
            // Insertions sit between start - 1 and start
            start.saturating_sub(1)
        } else {
            start + reference.len() as u64 - 1
        };

        Self {
            chromosome: chromosome.into(),
            start,
            end,
            reference,
            alternate,
            variant_type,
        }
    }

    /// Override the end position (structural calls carry an explicit END)
    pub fn with_end(mut self, end: u64) -> Self {
        self.end = end;
        self
    }

    /// Override the inferred type
    pub fn with_type(mut self, variant_type: VariantType) -> Self {
        self.variant_type = variant_type;
        self
    }

    /// Stable string identifier shared by stage records and variant documents
    pub fn id(&self) -> String {
        codec::locus_id(&self.chromosome, self.start, &self.reference, &self.alternate)
    }

    /// Right edge of the overlap window covered by this locus
    pub fn span_end(&self) -> u64 {
        if self.variant_type.uses_start_as_end() {
            self.start
        } else {
            self.end.max(self.start)
        }
    }

    /// Inclusive interval overlap on the same chromosome
    pub fn overlaps(&self, chromosome: &str, start: u64, end: u64) -> bool {
        self.chromosome == chromosome && self.start <= end && start <= self.span_end()
    }

    pub fn overlaps_locus(&self, other: &Locus) -> bool {
        self.overlaps(&other.chromosome, other.start, other.span_end())
    }

    /// Same chromosome, start and alleles
    pub fn same_allele(&self, other: &Locus) -> bool {
        self.chromosome == other.chromosome
            && self.start == other.start
            && self.reference == other.reference
            && self.alternate == other.alternate
    }

    pub fn to_coordinate(&self) -> AlternateCoordinate {
        AlternateCoordinate {
            chromosome: self.chromosome.clone(),
            start: self.start,
            end: self.end,
            reference: self.reference.clone(),
            alternate: self.alternate.clone(),
            variant_type: self.variant_type,
        }
    }
}

/// Coordinates of an alternate allele (main or secondary)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlternateCoordinate {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub reference: String,
    pub alternate: String,
    #[serde(default)]
    pub variant_type: VariantType,
}

impl AlternateCoordinate {
    /// Allele identity ignoring end and type
    pub fn same_allele(&self, other: &AlternateCoordinate) -> bool {
        self.chromosome == other.chromosome
            && self.start == other.start
            && self.reference == other.reference
            && self.alternate == other.alternate
    }
}

/// Provenance of a call: the multi-allelic source line and allele index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginalCall {
    /// "chr:pos:ref:alt1,alt2,..." as written in the input file
    pub variant_id: String,
    pub allele_index: u32,
}

/// One file's call at a locus, as stored in a stage payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagedCall {
    /// External identifiers (e.g., rsIDs)
    #[serde(default)]
    pub ids: Vec<String>,

    /// Overrides the locus type when present
    #[serde(default)]
    pub variant_type: Option<VariantType>,

    /// Secondary alternates referenced by this file's genotypes (indexes 2..)
    #[serde(default)]
    pub secondary_alternates: Vec<AlternateCoordinate>,

    #[serde(default)]
    pub call: Option<OriginalCall>,

    /// One genotype per sample, in the file's sample order
    #[serde(default)]
    pub genotypes: Vec<String>,

    /// Per-file attributes (QUAL, FILTER, INFO fields)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// A decoded call bound to its file and locus
#[derive(Debug, Clone, PartialEq)]
pub struct FileCall {
    pub file_id: FileId,
    pub locus: Locus,
    pub data: StagedCall,
}

impl FileCall {
    pub fn variant_type(&self) -> VariantType {
        self.data.variant_type.unwrap_or(self.locus.variant_type)
    }
}

/// Per-study section of a stage record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStudy {
    /// True while the study has no canonical data at this locus
    #[serde(default = "default_new_study")]
    pub new_study: bool,

    /// Secondary alternates already recorded by an earlier batch
    #[serde(default)]
    pub secondary_alternates: Vec<AlternateCoordinate>,

    /// File -> staged payloads; `None` means already consumed by a merge
    #[serde(default)]
    pub files: BTreeMap<FileId, Option<Vec<Value>>>,
}

fn default_new_study() -> bool {
    true
}

impl Default for StageStudy {
    fn default() -> Self {
        Self {
            new_study: true,
            secondary_alternates: Vec::new(),
            files: BTreeMap::new(),
        }
    }
}

/// (study, file) pair still waiting to be merged at a stage record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudyFile {
    pub study_id: StudyId,
    pub file_id: FileId,
}

/// A staged locus: every study's uncommitted calls at one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: String,
    pub locus: Locus,
    #[serde(default)]
    pub studies: BTreeMap<StudyId, StageStudy>,
    #[serde(default)]
    pub pending: Vec<StudyFile>,
}

impl StageRecord {
    pub fn new(locus: Locus) -> Self {
        Self {
            id: locus.id(),
            locus,
            studies: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn study(&self, study_id: StudyId) -> Option<&StageStudy> {
        self.studies.get(&study_id)
    }

    pub fn study_mut(&mut self, study_id: StudyId) -> Option<&mut StageStudy> {
        self.studies.get_mut(&study_id)
    }

    /// Whether the study has no canonical data at this locus yet
    pub fn is_new_study(&self, study_id: StudyId) -> bool {
        self.study(study_id).map(|s| s.new_study).unwrap_or(true)
    }

    /// Stage one encoded payload for a file and mark it pending
    pub fn stage_call(&mut self, study_id: StudyId, file_id: FileId, payload: Value) {
        let study = self.studies.entry(study_id).or_default();
        study
            .files
            .entry(file_id)
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(payload);

        let pair = StudyFile { study_id, file_id };
        if !self.pending.contains(&pair) {
            self.pending.push(pair);
        }
    }

    /// Key used to order stage records by position
    pub fn position_key(&self) -> (&str, u64, &str) {
        (&self.locus.chromosome, self.locus.start, &self.id)
    }
}

/// Per-file entry in a canonical variant document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDocument {
    pub file_id: FileId,

    /// True when the file had no call at this exact locus (data comes from an overlapping call)
    #[serde(default)]
    pub overlapped: bool,

    #[serde(default)]
    pub call: Option<OriginalCall>,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Study section of a canonical variant document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyDocument {
    pub study_id: StudyId,
    #[serde(default)]
    pub files: Vec<FileDocument>,
    #[serde(default)]
    pub genotypes: GenotypeBuckets,
    #[serde(default)]
    pub secondary_alternates: Vec<AlternateCoordinate>,
}

/// Canonical merged variant, keyed by locus id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDocument {
    pub id: String,
    pub locus: Locus,
    #[serde(default)]
    pub ids: BTreeSet<String>,
    #[serde(default)]
    pub studies: Vec<StudyDocument>,
    #[serde(default)]
    pub release: BTreeSet<u32>,
}

impl VariantDocument {
    pub fn study(&self, study_id: StudyId) -> Option<&StudyDocument> {
        self.studies.iter().find(|s| s.study_id == study_id)
    }

    pub fn study_mut(&mut self, study_id: StudyId) -> Option<&mut StudyDocument> {
        self.studies.iter_mut().find(|s| s.study_id == study_id)
    }
}

/// Input file description: name and ordered sample ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub samples: Vec<SampleId>,
}

/// Study description used to plan and validate a merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyMetadata {
    pub study_id: StudyId,
    #[serde(default)]
    pub name: String,
    pub files: BTreeMap<FileId, FileMetadata>,
    /// Files already merged into the canonical store
    #[serde(default)]
    pub indexed_files: BTreeSet<FileId>,
}

impl StudyMetadata {
    pub fn samples_in_file(&self, file_id: FileId) -> &[SampleId] {
        self.files
            .get(&file_id)
            .map(|f| f.samples.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_variant_types() {
        assert_eq!(VariantType::infer("A", "C"), VariantType::Snv);
        assert_eq!(VariantType::infer("AC", "GT"), VariantType::Mnv);
        assert_eq!(VariantType::infer("", "T"), VariantType::Insertion);
        assert_eq!(VariantType::infer("TA", ""), VariantType::Deletion);
        assert_eq!(VariantType::infer("TA", "G"), VariantType::Indel);
        assert_eq!(VariantType::infer("A", "<CN0>"), VariantType::Cnv);
        assert_eq!(VariantType::infer("A", "<DEL>"), VariantType::Symbolic);
        assert_eq!(VariantType::infer("A", "A]2:300]"), VariantType::Breakend);
        assert_eq!(VariantType::infer("A", "."), VariantType::NoVariation);
    }

    #[test]
    fn test_skipped_and_structural_types() {
        assert!(VariantType::NoVariation.is_skipped());
        assert!(VariantType::Symbolic.is_skipped());
        assert!(VariantType::Translocation.is_skipped());
        assert!(!VariantType::Snv.is_skipped());

        assert!(VariantType::Breakend.is_structural());
        assert!(VariantType::Cnv.is_structural());
        assert!(!VariantType::Indel.is_structural());
    }

    #[test]
    fn test_locus_end_and_overlap() {
        let deletion = Locus::new("1", 100, "ACGT", "A");
        assert_eq!(deletion.end, 103);
        assert_eq!(deletion.span_end(), 103);

        let snv = Locus::new("1", 102, "G", "T");
        assert!(deletion.overlaps_locus(&snv));
        assert!(snv.overlaps_locus(&deletion));

        let other_chromosome = Locus::new("2", 102, "G", "T");
        assert!(!deletion.overlaps_locus(&other_chromosome));

        // Insertion end sits before its start, the window still covers the start
        let insertion = Locus::new("1", 104, "", "TT");
        assert_eq!(insertion.end, 103);
        assert_eq!(insertion.span_end(), 104);
        assert!(!insertion.overlaps_locus(&Locus::new("1", 105, "A", "C")));
    }

    #[test]
    fn test_cnv_window_uses_start() {
        let cnv = Locus::new("1", 100, "A", "<CN3>").with_end(5000);
        assert_eq!(cnv.span_end(), 100);
        assert!(!cnv.overlaps_locus(&Locus::new("1", 200, "C", "G")));
    }

    #[test]
    fn test_stage_call_marks_pending_once() {
        let mut record = StageRecord::new(Locus::new("1", 100, "A", "C"));
        record.stage_call(1, 7, serde_json::json!({"genotypes": ["0/1"]}));
        record.stage_call(1, 7, serde_json::json!({"genotypes": ["1/1"]}));

        assert_eq!(record.id, "1:100:A:C");
        assert_eq!(record.pending, vec![StudyFile { study_id: 1, file_id: 7 }]);
        let payloads = record.study(1).and_then(|s| s.files.get(&7)).cloned().flatten();
        assert_eq!(payloads.map(|p| p.len()), Some(2));
        assert!(record.is_new_study(1));
    }

    #[test]
    fn test_stage_study_defaults_to_new() {
        let study: StageStudy = serde_json::from_str(r#"{"files": {"3": null}}"#).unwrap();
        assert!(study.new_study);
        assert_eq!(study.files.get(&3), Some(&None));
    }
}
