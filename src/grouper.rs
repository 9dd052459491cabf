// ==============================================================================
// grouper.rs - Overlap Grouper
// ==============================================================================
// Description: Splits a position-ordered batch of stage records into singletons
//              and clusters of overlapping loci
// Created: 2026-10-12
// Modified: 2026-10-17
// Version: 1.0.3
// ==============================================================================
// Rules:
//   - Records without the study being merged are ignored
//   - Structural variants are always emitted alone
//   - A record joins the open group when it overlaps the running window
//     [min start, max span end] on the same chromosome (inclusive)
//   - With overlap checking off every record is a singleton
// ==============================================================================

use crate::models::{Locus, StageRecord, StudyId};

/// A unit of merge work
#[derive(Debug, Clone, PartialEq)]
pub enum OverlapGroup {
    Single(StageRecord),
    Cluster(Vec<StageRecord>),
}

impl OverlapGroup {
    pub fn records(&self) -> &[StageRecord] {
        match self {
            OverlapGroup::Single(record) => std::slice::from_ref(record),
            OverlapGroup::Cluster(records) => records,
        }
    }
}

/// Running overlap window of an open group
#[derive(Debug, Clone)]
struct Window {
    chromosome: String,
    start: u64,
    end: u64,
}

impl Window {
    fn open(locus: &Locus) -> Self {
        Self {
            chromosome: locus.chromosome.clone(),
            start: locus.start,
            end: locus.span_end(),
        }
    }

    fn admits(&self, locus: &Locus) -> bool {
        locus.overlaps(&self.chromosome, self.start, self.end)
    }

    fn extend(&mut self, locus: &Locus) {
        self.start = self.start.min(locus.start);
        self.end = self.end.max(locus.span_end());
    }
}

#[derive(Debug, Clone)]
pub struct OverlapGrouper {
    study_id: StudyId,
    check_overlaps: bool,
}

impl OverlapGrouper {
    pub fn new(study_id: StudyId, check_overlaps: bool) -> Self {
        Self {
            study_id,
            check_overlaps,
        }
    }

    /// Group a batch sorted by (chromosome, start)
    pub fn group(&self, batch: Vec<StageRecord>) -> Vec<OverlapGroup> {
        let mut groups = Vec::new();
        let mut open: Vec<StageRecord> = Vec::new();
        let mut window: Option<Window> = None;

        for record in batch {
            if !record.studies.contains_key(&self.study_id) {
                continue;
            }
            if record.locus.variant_type.is_structural() {
                groups.push(OverlapGroup::Single(record));
                continue;
            }

            match window.as_mut() {
                Some(w) if self.check_overlaps && w.admits(&record.locus) => {
                    w.extend(&record.locus);
                    open.push(record);
                }
                _ => {
                    close_group(&mut open, &mut groups);
                    window = Some(Window::open(&record.locus));
                    open.push(record);
                }
            }
        }
        close_group(&mut open, &mut groups);

        groups
    }
}

fn close_group(open: &mut Vec<StageRecord>, groups: &mut Vec<OverlapGroup>) {
    match open.len() {
        0 => {}
        1 => groups.extend(open.drain(..).map(OverlapGroup::Single)),
        _ => groups.push(OverlapGroup::Cluster(std::mem::take(open))),
    }
}

/// First index at or after `min_len` where a new, non-overlapping window starts
///
/// Batches cut at such an index never split an overlap cluster.
pub fn next_window_cut(records: &[StageRecord], min_len: usize) -> Option<usize> {
    let mut window: Option<Window> = None;

    for (i, record) in records.iter().enumerate() {
        if record.locus.variant_type.is_structural() {
            continue;
        }
        match window.as_mut() {
            Some(w) if w.admits(&record.locus) => w.extend(&record.locus),
            Some(_) if i >= min_len => return Some(i),
            _ => window = Some(Window::open(&record.locus)),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Locus, VariantType};
    use serde_json::json;

    fn record(chromosome: &str, start: u64, reference: &str, alternate: &str) -> StageRecord {
        let mut record = StageRecord::new(Locus::new(chromosome, start, reference, alternate));
        record.stage_call(1, 1, json!({"genotypes": ["0/1"]}));
        record
    }

    fn shapes(groups: &[OverlapGroup]) -> Vec<usize> {
        groups.iter().map(|g| g.records().len()).collect()
    }

    #[test]
    fn test_disjoint_records_are_singletons() {
        let grouper = OverlapGrouper::new(1, true);
        let groups = grouper.group(vec![record("1", 100, "A", "C"), record("1", 200, "G", "T")]);
        assert_eq!(shapes(&groups), vec![1, 1]);
    }

    #[test]
    fn test_overlapping_records_cluster() {
        let grouper = OverlapGrouper::new(1, true);
        let groups = grouper.group(vec![
            record("1", 100, "ACGT", "A"),
            record("1", 102, "G", "T"),
            record("1", 103, "T", "C"),
            record("1", 110, "A", "G"),
        ]);
        assert_eq!(shapes(&groups), vec![3, 1]);
        assert!(matches!(groups[0], OverlapGroup::Cluster(_)));
    }

    #[test]
    fn test_window_extends_through_chain() {
        // 100-101 overlaps 101-105, which overlaps 105
        let grouper = OverlapGrouper::new(1, true);
        let groups = grouper.group(vec![
            record("1", 100, "AC", "A"),
            record("1", 101, "CGTAC", "C"),
            record("1", 105, "C", "G"),
        ]);
        assert_eq!(shapes(&groups), vec![3]);
    }

    #[test]
    fn test_chromosome_change_closes_group() {
        let grouper = OverlapGrouper::new(1, true);
        let groups = grouper.group(vec![record("1", 100, "A", "C"), record("2", 100, "A", "C")]);
        assert_eq!(shapes(&groups), vec![1, 1]);
    }

    #[test]
    fn test_no_overlap_check_gives_singletons() {
        let grouper = OverlapGrouper::new(1, false);
        let groups = grouper.group(vec![record("1", 100, "A", "C"), record("1", 100, "A", "G")]);
        assert_eq!(shapes(&groups), vec![1, 1]);
    }

    #[test]
    fn test_structural_variant_is_alone() {
        let grouper = OverlapGrouper::new(1, true);
        let mut sv = StageRecord::new(Locus::new("1", 100, "A", "<DUP>").with_end(500));
        sv.stage_call(1, 1, json!({}));
        let groups = grouper.group(vec![record("1", 100, "A", "C"), sv, record("1", 100, "A", "G")]);

        assert_eq!(groups.len(), 2);
        assert!(matches!(&groups[0], OverlapGroup::Single(r) if r.locus.variant_type.is_structural()));
        assert_eq!(shapes(&groups[1..]), vec![2]);
    }

    #[test]
    fn test_copy_number_record_is_not_grouped_with_snv() {
        let grouper = OverlapGrouper::new(1, true);
        let mut cnv = StageRecord::new(Locus::new("1", 100, "A", "<CN3>").with_end(5000));
        cnv.stage_call(1, 1, json!({}));
        assert_eq!(cnv.locus.variant_type, VariantType::Cnv);

        let groups = grouper.group(vec![record("1", 100, "A", "C"), cnv]);
        assert_eq!(shapes(&groups), vec![1, 1]);
        assert!(groups.iter().all(|g| matches!(g, OverlapGroup::Single(_))));
    }

    #[test]
    fn test_records_of_other_studies_are_ignored() {
        let grouper = OverlapGrouper::new(2, true);
        assert!(grouper.group(vec![record("1", 100, "A", "C")]).is_empty());
    }

    #[test]
    fn test_window_cut_respects_clusters() {
        let records = vec![
            record("1", 100, "ACG", "A"),
            record("1", 101, "C", "T"),
            record("1", 102, "G", "A"),
            record("1", 200, "A", "C"),
            record("1", 300, "A", "C"),
        ];
        assert_eq!(next_window_cut(&records, 1), Some(3));
        assert_eq!(next_window_cut(&records, 4), Some(4));
        assert_eq!(next_window_cut(&records, 5), None);
    }
}
