// ==============================================================================
// genotype.rs - Genotype Allele Remapping
// ==============================================================================
// Description: Rewrites genotype allele indexes into a locus' canonical allele order
// Created: 2026-10-12
// Modified: 2026-10-17
// Version: 1.1.1
// ==============================================================================
// Allele numbering:
//   0 = reference, 1 = main alternate, 2.. = secondary alternates
//   A file's allele list is [its main alternate, its secondary alternates...]
//   The canonical list is [locus main alternate, canonical secondaries...]
//   Alleles unknown to the canonical list are appended as new secondaries
//   Missing ('.') and unknown ('?') alleles are left untouched
// ==============================================================================

use thiserror::Error;

use crate::models::{AlternateCoordinate, GenotypeBuckets, SampleId};

/// Errors that can occur while remapping genotypes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenotypeError {
    #[error("Invalid genotype format: '{0}'")]
    InvalidFormat(String),

    #[error("Genotype '{genotype}' references allele {allele} but only {available} alleles are known")]
    AlleleOutOfRange {
        genotype: String,
        allele: u32,
        available: usize,
    },

    #[error("File has {genotypes} genotypes but {samples} samples")]
    SampleCountMismatch { genotypes: usize, samples: usize },
}

/// Source allele index -> canonical allele index (index 0 is always the reference)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlleleMapping(Vec<u32>);

impl AlleleMapping {
    pub fn identity(alleles: usize) -> Self {
        AlleleMapping((0..=alleles as u32).collect())
    }

    pub fn get(&self, allele: u32) -> Option<u32> {
        self.0.get(allele as usize).copied()
    }
}

/// Map a source allele list onto the canonical list, appending unknown alleles
///
/// # Arguments
/// * `source` - Source alleles: main alternate first, then secondaries
/// * `main` - Canonical main alternate (index 1)
/// * `secondaries` - Canonical secondary alternates (index 2..), grown in place
pub fn build_allele_mapping(
    source: &[AlternateCoordinate],
    main: &AlternateCoordinate,
    secondaries: &mut Vec<AlternateCoordinate>,
) -> AlleleMapping {
    let mut mapping = Vec::with_capacity(source.len() + 1);
    mapping.push(0);

    for allele in source {
        let index = if allele.same_allele(main) {
            1
        } else if let Some(pos) = secondaries.iter().position(|s| s.same_allele(allele)) {
            pos as u32 + 2
        } else {
            secondaries.push(allele.clone());
            secondaries.len() as u32 + 1
        };
        mapping.push(index);
    }

    AlleleMapping(mapping)
}

/// Rewrite one genotype through an allele mapping
///
/// # Examples
/// ```
/// use variant_merge::genotype::{remap_genotype, AlleleMapping};
///
/// let identity = AlleleMapping::identity(2);
/// assert_eq!(remap_genotype("0|2", &identity).unwrap(), "0|2");
/// assert_eq!(remap_genotype("./.", &identity).unwrap(), "./.");
/// ```
pub fn remap_genotype(genotype: &str, mapping: &AlleleMapping) -> Result<String, GenotypeError> {
    if genotype.is_empty() {
        return Err(GenotypeError::InvalidFormat(genotype.to_string()));
    }

    let mut remapped = String::with_capacity(genotype.len());
    let mut start = 0;

    for (i, c) in genotype.char_indices() {
        if c == '/' || c == '|' {
            push_allele(&genotype[start..i], genotype, mapping, &mut remapped)?;
            remapped.push(c);
            start = i + 1;
        }
    }
    push_allele(&genotype[start..], genotype, mapping, &mut remapped)?;

    Ok(remapped)
}

fn push_allele(token: &str, genotype: &str, mapping: &AlleleMapping, out: &mut String) -> Result<(), GenotypeError> {
    match token.parse::<u32>() {
        Ok(allele) => {
            let target = mapping.get(allele).ok_or_else(|| GenotypeError::AlleleOutOfRange {
                genotype: genotype.to_string(),
                allele,
                available: mapping.0.len(),
            })?;
            out.push_str(&target.to_string());
            Ok(())
        }
        Err(_) if token == "." || token == "?" => {
            out.push_str(token);
            Ok(())
        }
        Err(_) => Err(GenotypeError::InvalidFormat(genotype.to_string())),
    }
}

/// Bucket a file's per-sample genotypes by (remapped) genotype
///
/// The call must carry exactly one genotype per sample of the file, and every
/// allele is checked against the mapping, identity included.
pub fn bucket_genotypes(
    genotypes: &[String],
    samples: &[SampleId],
    mapping: &AlleleMapping,
    buckets: &mut GenotypeBuckets,
) -> Result<(), GenotypeError> {
    if genotypes.len() != samples.len() {
        return Err(GenotypeError::SampleCountMismatch {
            genotypes: genotypes.len(),
            samples: samples.len(),
        });
    }

    for (genotype, &sample) in genotypes.iter().zip(samples) {
        add_sample(buckets, remap_genotype(genotype, mapping)?, sample);
    }
    Ok(())
}

/// Remap every bucket of an existing genotype map into another map
pub fn remap_buckets(
    source: &GenotypeBuckets,
    mapping: &AlleleMapping,
    buckets: &mut GenotypeBuckets,
) -> Result<(), GenotypeError> {
    for (genotype, samples) in source {
        let key = remap_genotype(genotype, mapping)?;
        for &sample in samples {
            add_sample(buckets, key.clone(), sample);
        }
    }
    Ok(())
}

pub fn add_sample(buckets: &mut GenotypeBuckets, genotype: String, sample: SampleId) {
    let samples = buckets.entry(genotype).or_default();
    if !samples.contains(&sample) {
        samples.push(sample);
    }
}
