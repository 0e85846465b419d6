//! Chemical and mass enrichment of unified records.
//!
//! Computes elemental compositions, theoretical masses and m/z, and
//! precursor accuracy against the closest isotopologue. Accuracy is the
//! most expensive step and runs on a scoped rayon pool.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::chem::{
    atom_counts, closest_isotopologue_ppm, composition_table, formula_string, monoisotopic_mass_of,
    mz_from_mass, IsotopePatternSource,
};
use crate::mods::ModificationLookup;
use crate::unify::PsmRow;

/// Enriches rows in place. Rows carrying a non-mappable modification keep
/// sentinel values in every derived column.
pub fn enrich_masses(
    rows: &mut [PsmRow],
    lookup: &ModificationLookup,
    pattern: &dyn IsotopePatternSource,
    workers: usize,
) {
    let compositions = composition_table(&lookup.compositions());
    let excluded: Vec<bool> = rows.iter().map(|r| has_non_mappable(r, lookup)).collect();

    let sequences: Vec<String> = rows.iter().map(|r| r.sequence.clone()).collect();
    let modifications: Vec<String> = rows.iter().map(|r| r.modifications.clone()).collect();
    let (elements, counts) = atom_counts(&sequences, &modifications, &compositions);

    for ((row, counts), excluded) in rows.iter_mut().zip(&counts).zip(&excluded) {
        if *excluded || row.sequence.is_empty() {
            continue;
        }
        row.chemical_composition = Some(formula_string(&elements, counts));
        if let Some(mass) = monoisotopic_mass_of(&elements, counts) {
            row.ucalc_mass = Some(mass);
            if let Some(charge) = row.charge.filter(|z| *z > 0) {
                row.ucalc_mz = Some(mz_from_mass(mass, charge));
            }
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build();
    let accuracies: Vec<(Option<f64>, Option<f64>)> = match pool {
        Ok(pool) => pool.install(|| {
            rows.par_iter().map(|row| accuracy_of(row, pattern)).collect()
        }),
        Err(e) => {
            log::warn!("falling back to single-threaded enrichment: {e}");
            rows.iter().map(|row| accuracy_of(row, pattern)).collect()
        }
    };
    for (row, (ppm, ppm_c12)) in rows.iter_mut().zip(accuracies) {
        row.accuracy_ppm = ppm;
        row.accuracy_ppm_c12 = ppm_c12;
    }
}

fn accuracy_of(
    row: &PsmRow,
    pattern: &dyn IsotopePatternSource,
) -> (Option<f64>, Option<f64>) {
    let (composition, charge, exp_mz) = match (
        row.chemical_composition.as_deref(),
        row.charge.filter(|z| *z > 0),
        row.exp_mz,
    ) {
        (Some(c), Some(z), Some(mz)) => (c, z, mz),
        _ => return (None, None),
    };
    let ppm = closest_isotopologue_ppm(composition, charge, exp_mz, pattern);
    let ppm_c12 = row
        .ucalc_mz
        .map(|ucalc| (exp_mz - ucalc) / ucalc * 1e6);
    (ppm, ppm_c12)
}

fn has_non_mappable(row: &PsmRow, lookup: &ModificationLookup) -> bool {
    if lookup.non_mappable.is_empty() {
        return false;
    }
    row.modifications.split(';').any(|token| {
        token
            .rsplit_once(':')
            .map(|(name, _)| lookup.non_mappable.contains(name))
            .unwrap_or(false)
    })
}

/// Composition and theoretical mass columns alone, shared with the quant
/// pipeline where no accuracy is computed.
pub fn composition_of(
    sequence: &str,
    modifications: &str,
    compositions: &BTreeMap<String, crate::chem::Composition>,
) -> Option<String> {
    if sequence.is_empty() {
        return None;
    }
    let (elements, counts) = atom_counts(
        &[sequence.to_string()],
        &[modifications.to_string()],
        compositions,
    );
    counts.first().map(|c| formula_string(&elements, c))
}
