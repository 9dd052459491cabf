// ==============================================================================
// codec.rs - Stage Payload Codec
// ==============================================================================
// Description: Locus ids, stage payload decoding and original-call matching
// Created: 2026-10-12
// Modified: 2026-10-14
// Version: 1.0.1
// ==============================================================================
// Locus id format:   chromosome:start:reference:alternate
// Original call:     chromosome:start:reference:alt1,alt2,...  (+ allele index)
// Empty alleles are written as "" in ids and "-" is accepted when parsing
// ==============================================================================

use serde_json::Value;

use crate::error::CodecError;
use crate::models::{FileCall, FileId, Locus, OriginalCall, StageRecord, StagedCall};

/// Build the canonical locus id
pub fn locus_id(chromosome: &str, start: u64, reference: &str, alternate: &str) -> String {
    format!("{}:{}:{}:{}", chromosome, start, reference, alternate)
}

/// Parse a locus id back into a locus
pub fn parse_locus_id(id: &str) -> Result<Locus, CodecError> {
    let (chromosome, start, reference, alternate) =
        split_allele_key(id).ok_or_else(|| CodecError::InvalidLocusId(id.to_string()))?;
    Ok(Locus::new(chromosome, start, reference, alternate))
}

// Chromosome names may contain ':', so split from the right
fn split_allele_key(key: &str) -> Option<(&str, u64, &str, &str)> {
    let mut parts = key.rsplitn(4, ':');
    let alternate = parts.next()?;
    let reference = parts.next()?;
    let start = parts.next()?.parse::<u64>().ok()?;
    let chromosome = parts.next()?;
    if chromosome.is_empty() {
        return None;
    }
    Some((chromosome, start, dash_as_empty(reference), dash_as_empty(alternate)))
}

fn dash_as_empty(allele: &str) -> &str {
    if allele == "-" {
        ""
    } else {
        allele
    }
}

/// Decode one staged payload into a call bound to the record's locus
pub fn decode_call(record: &StageRecord, file_id: FileId, payload: &Value) -> Result<FileCall, CodecError> {
    let data: StagedCall =
        serde_json::from_value(payload.clone()).map_err(|e| CodecError::InvalidPayload {
            file_id,
            message: e.to_string(),
        })?;

    Ok(FileCall {
        file_id,
        locus: record.locus.clone(),
        data,
    })
}

/// Encode a call for staging
pub fn encode_call(call: &StagedCall) -> Value {
    // StagedCall has only string-keyed maps, serialization cannot fail
    serde_json::to_value(call).unwrap_or(Value::Null)
}

/// Trim the shared prefix and then the shared suffix of two alleles
pub fn normalize_alleles(start: u64, reference: &str, alternate: &str) -> (u64, String, String) {
    if alternate.starts_with('<') {
        return (start, reference.to_string(), alternate.to_string());
    }

    let prefix = reference
        .chars()
        .zip(alternate.chars())
        .take_while(|(r, a)| r == a)
        .count();
    let reference: Vec<char> = reference.chars().skip(prefix).collect();
    let alternate: Vec<char> = alternate.chars().skip(prefix).collect();

    let suffix = reference
        .iter()
        .rev()
        .zip(alternate.iter().rev())
        .take_while(|(r, a)| r == a)
        .count();

    (
        start + prefix as u64,
        reference[..reference.len() - suffix].iter().collect(),
        alternate[..alternate.len() - suffix].iter().collect(),
    )
}

/// Whether any allele of an original multi-allelic call normalizes to this locus
pub fn call_matches_locus(call: &OriginalCall, locus: &Locus) -> Result<bool, CodecError> {
    let (head, extra_alternates) = match call.variant_id.split_once(',') {
        Some((head, rest)) => (head, Some(rest)),
        None => (call.variant_id.as_str(), None),
    };
    let (chromosome, start, reference, first_alternate) =
        split_allele_key(head).ok_or_else(|| CodecError::InvalidOriginalCall(call.variant_id.clone()))?;

    if chromosome != locus.chromosome {
        return Ok(false);
    }

    let alternates = std::iter::once(first_alternate)
        .chain(extra_alternates.into_iter().flat_map(|rest| rest.split(',')));

    for alternate in alternates {
        let (norm_start, norm_ref, norm_alt) = normalize_alleles(start, reference, alternate);
        if norm_start == locus.start && norm_ref == locus.reference && norm_alt == locus.alternate {
            return Ok(true);
        }
    }
    Ok(false)
}
