//! Quantification unification: a simpler single-pass pipeline that links
//! quant rows to spectra and fills the canonical quant schema.

use std::collections::BTreeMap;
use std::path::Path;

use crate::chem::composition_table;
use crate::engines::Extraction;
use crate::meta::RtLookup;
use crate::mods::{normalize_mods, ModificationLookup};
use crate::schema::{table::TableError, Table};
use crate::unify::{enrich, ident::drop_duplicate_records, sanitize};

/// Rounding precision for retention-time linkage, in decimal places of a
/// second.
const RT_LINK_DECIMALS: u32 = 5;

/// Side inputs of the quant pipeline.
pub struct QuantContext<'a> {
    pub lookup: &'a ModificationLookup,
    pub rt: &'a RtLookup,
}

/// Runs the quant pipeline over one extraction.
pub fn unify_quant(
    extraction: Extraction,
    ctx: &QuantContext<'_>,
) -> Result<Table, TableError> {
    let mut records = drop_duplicate_records(extraction.records);

    let compositions = composition_table(&ctx.lookup.compositions());
    let inverse = (!ctx.rt.is_empty()).then(|| ctx.rt.inverse_index(RT_LINK_DECIMALS));
    let factor = 10f64.powi(RT_LINK_DECIMALS as i32);
    let mut unlinked = 0usize;

    for record in &mut records {
        if let Some(mods) = record.get("modifications") {
            let normalized = normalize_mods(mods);
            record.insert("modifications".to_string(), normalized);
        }
        // Records naming a bare peptide get a theoretical composition.
        let sequence = record.get("trivial_name").cloned().unwrap_or_default();
        if !sequence.is_empty() {
            let mods = record.get("modifications").cloned().unwrap_or_default();
            if let Some(formula) = enrich::composition_of(&sequence, &mods, &compositions) {
                record.insert("chemical_composition".to_string(), formula);
            }
        }
        // Spectrum linkage by source file and rounded scan time.
        if let (Some(index), Some(file), Some(rt)) = (
            inverse.as_ref(),
            record.get("file_name").cloned(),
            record
                .get("retention_time_seconds")
                .and_then(|v| v.parse::<f64>().ok()),
        ) {
            let rounded = (rt * factor).round() as i64;
            let linked = index
                .get(&(file.clone(), rounded))
                .or_else(|| {
                    // Quant engines often report the bare file stem.
                    index
                        .iter()
                        .find(|((f, r), _)| {
                            *r == rounded
                                && Path::new(f)
                                    .file_stem()
                                    .and_then(|s| s.to_str())
                                    .is_some_and(|stem| stem == file)
                        })
                        .map(|(_, id)| id)
                })
                .copied();
            match linked {
                Some(spectrum_id) => {
                    record.insert("linked_spectrum_id".to_string(), spectrum_id.to_string());
                }
                None => unlinked += 1,
            }
        }
    }
    if unlinked > 0 {
        log::warn!("{unlinked} quant rows could not be linked to a spectrum");
    }

    sanitize::quant_table(records, &extraction.mapped_columns)
}
