//! Identification post-processing: from raw engine records to the unified
//! PSM table.
//!
//! Step order matters: modifications are normalized before composition
//! arithmetic, proteins before enzyme checks, scores before ranks.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use crate::chem::{IsotopePatternSource, IUPAC_AAS};
use crate::engines::{EngineFormat, Extraction, RawRecord};
use crate::meta::RtLookup;
use crate::mods::{normalize_mods, ModificationLookup};
use crate::params::{IntegrityPolicy, UnifyParams};
use crate::proteins::PeptideMapper;
use crate::schema::{table::TableError, Table};
use crate::unify::{enrich, sanitize, PsmRow};

/// Side inputs of the identification pipeline.
pub struct IdentContext<'a> {
    pub params: &'a UnifyParams,
    pub lookup: &'a ModificationLookup,
    pub rt: &'a RtLookup,
    pub mapper: Option<&'a dyn PeptideMapper>,
    pub pattern: &'a dyn IsotopePatternSource,
    pub format: EngineFormat,
}

/// Runs the full identification pipeline over one extraction.
pub fn unify_ident(
    extraction: Extraction,
    ctx: &IdentContext<'_>,
) -> Result<Table, TableError> {
    let records = drop_duplicate_records(extraction.records);
    let mut rows: Vec<PsmRow> = records
        .into_iter()
        .map(|r| PsmRow::from_record(r, &extraction.engine))
        .collect();

    for row in &mut rows {
        row.modifications = normalize_mods(&row.modifications);
    }
    retain_iupac_sequences(&mut rows);
    if let Some(mapper) = ctx.mapper {
        add_protein_ids(&mut rows, mapper, &ctx.params.delimiter);
    }
    if !ctx.rt.is_empty() {
        add_meta_info(&mut rows, ctx.rt, ctx.format, ctx.params.rt_match_tolerance);
    }
    enrich::enrich_masses(
        &mut rows,
        ctx.lookup,
        ctx.pattern,
        ctx.params.worker_threads(),
    );
    check_enzyme_specificity(&mut rows, ctx.params);
    add_ranks(&mut rows, ctx.params);
    add_decoy_identity(&mut rows, &ctx.params.decoy_tag, &ctx.params.delimiter);
    flag_immutable_peptides(&mut rows, &ctx.params.immutable_peptides);

    sanitize::ident_table(rows, &extraction.mapped_columns)
}

/// Removes raw records that are exact duplicates of an earlier one.
pub fn drop_duplicate_records(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let before = records.len();
    let records: Vec<RawRecord> = records
        .into_iter()
        .filter(|record| {
            let key = record
                .iter()
                .map(|(k, v)| format!("{k}\u{1f}{v}"))
                .collect::<Vec<_>>()
                .join("\u{1e}");
            seen.insert(key)
        })
        .collect();
    let dropped = before - records.len();
    if dropped > 0 {
        log::debug!("dropped {dropped} duplicate raw records");
    }
    records
}

/// Uppercases sequences, then drops rows containing non-IUPAC letters.
fn retain_iupac_sequences(rows: &mut Vec<PsmRow>) {
    let before = rows.len();
    for row in rows.iter_mut() {
        row.sequence = row.sequence.to_uppercase();
    }
    rows.retain(|row| row.sequence.chars().all(|c| IUPAC_AAS.contains(c)));
    let dropped = before - rows.len();
    if dropped > 0 {
        log::warn!("dropped {dropped} rows with non-IUPAC sequences");
    }
}

/// Maps each peptide to its protein occurrences. Multi-protein values are
/// joined by the configured delimiter, sorted by protein id. Peptides
/// absent from the database are dropped with an aggregated warning.
fn add_protein_ids(rows: &mut Vec<PsmRow>, mapper: &dyn PeptideMapper, delimiter: &str) {
    let peptides: Vec<String> = rows
        .iter()
        .map(|r| r.sequence.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mapped = mapper.map_peptides(&peptides);

    let mut unmapped: BTreeSet<String> = BTreeSet::new();
    rows.retain_mut(|row| {
        let mut mappings = match mapped.get(&row.sequence) {
            Some(m) if !m.is_empty() => m.clone(),
            _ => {
                unmapped.insert(row.sequence.clone());
                return false;
            }
        };
        mappings.sort_by(|a, b| {
            a.protein_id
                .cmp(&b.protein_id)
                .then(a.start.cmp(&b.start))
        });
        let join = |f: &dyn Fn(&crate::proteins::PeptideMapping) -> String| {
            mappings.iter().map(|m| f(m)).collect::<Vec<_>>().join(delimiter)
        };
        row.protein_id = Some(join(&|m| m.protein_id.clone()));
        row.sequence_start = Some(join(&|m| m.start.to_string()));
        row.sequence_stop = Some(join(&|m| m.stop.to_string()));
        row.sequence_pre_aa = Some(join(&|m| m.pre.to_string()));
        row.sequence_post_aa = Some(join(&|m| m.post.to_string()));
        true
    });
    if !unmapped.is_empty() {
        log::warn!(
            "dropped rows for {} peptides not in the database: {}",
            unmapped.len(),
            unmapped.iter().take(5).cloned().collect::<Vec<_>>().join(", ")
        );
    }
}

/// Joins rows against the spectrum metadata lookup and derives the
/// spectrum title. Ambiguous joins leave the row untouched and are logged
/// per spectrum.
fn add_meta_info(rows: &mut [PsmRow], rt: &RtLookup, format: EngineFormat, tolerance: f64) {
    let mut ambiguous: BTreeSet<i64> = BTreeSet::new();
    for row in rows.iter_mut() {
        let spectrum_id = match row.spectrum_id {
            Some(id) => id,
            None => continue,
        };
        let entry = if format.reports_retention_time() {
            match row.retention_time_seconds {
                Some(seconds) => rt.entry_near(spectrum_id, seconds, tolerance),
                None => rt.unique_entry(spectrum_id),
            }
        } else {
            rt.unique_entry(spectrum_id)
        };
        let entry = match entry {
            Some(e) => e,
            None => {
                if !rt.entries(spectrum_id).is_empty() {
                    ambiguous.insert(spectrum_id);
                }
                continue;
            }
        };
        row.raw_data_location = Some(entry.file.clone());
        if row.retention_time_seconds.is_none() {
            row.retention_time_seconds = Some(entry.rt_seconds);
        }
        if row.exp_mz.is_none() {
            row.exp_mz = entry.precursor_mz;
        }
        if row.spectrum_title.is_none() {
            if let Some(charge) = row.charge {
                let stem = Path::new(&entry.file)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(&entry.file);
                row.spectrum_title =
                    Some(format!("{stem}.{spectrum_id}.{spectrum_id}.{charge}"));
            }
        }
    }
    for spectrum_id in ambiguous {
        log::error!("ambiguous metadata for spectrum {spectrum_id}, fields left unset");
    }
}

/// Annotates enzymatic consistency: terminal cleavage-site conformance per
/// protein context, aggregated by the configured policy, and internal
/// missed cleavages.
fn check_enzyme_specificity(rows: &mut [PsmRow], params: &UnifyParams) {
    let enzyme = &params.enzyme;
    for row in rows.iter_mut() {
        if row.sequence.is_empty() {
            continue;
        }
        if enzyme.is_nonspecific() {
            row.enzn = true;
            row.enzc = true;
            row.missed_cleavages = Some(0);
            continue;
        }
        let first = row.sequence.chars().next().unwrap_or('-');
        let last = row.sequence.chars().next_back().unwrap_or('-');

        if let (Some(pre), Some(post), Some(start)) = (
            row.sequence_pre_aa.as_deref(),
            row.sequence_post_aa.as_deref(),
            row.sequence_start.as_deref(),
        ) {
            let n_flags: Vec<bool> = pre
                .split(params.delimiter.as_str())
                .zip(start.split(params.delimiter.as_str()))
                .map(|(pre, start)| {
                    let pre = pre.chars().next().unwrap_or('-');
                    // Position 2 still counts as a protein N-terminus, the
                    // initiator methionine is commonly removed.
                    matches!(start, "1" | "2") || enzyme.is_cleavage_site(pre, first)
                })
                .collect();
            let c_flags: Vec<bool> = post
                .split(params.delimiter.as_str())
                .map(|post| {
                    let post = post.chars().next().unwrap_or('-');
                    enzyme.is_cleavage_site(last, post)
                })
                .collect();
            let aggregate = |flags: &[bool]| match params.terminal_cleavage_site_integrity {
                IntegrityPolicy::Any => flags.iter().any(|f| *f),
                IntegrityPolicy::All => flags.iter().all(|f| *f),
            };
            row.enzn = aggregate(&n_flags);
            row.enzc = aggregate(&c_flags);
        }

        let residues: Vec<char> = row.sequence.chars().collect();
        let missed = residues
            .windows(2)
            .filter(|pair| {
                enzyme.cleave_at.contains(pair[0]) && !enzyme.restrict.contains(pair[1])
            })
            .count();
        row.missed_cleavages = Some(missed as i64);
    }
}

/// Ranks rows per spectrum by the engine's validation score with min-rank
/// tie handling: tied rows share the best rank of their group.
fn add_ranks(rows: &mut [PsmRow], params: &UnifyParams) {
    let engine = rows.first().map(|r| r.search_engine.clone()).unwrap_or_default();
    let (score_column, bigger_better) = match params.score_field(&engine) {
        Some(found) => found,
        None => {
            log::warn!("no validation score configured for '{engine}', ranks left unset");
            return;
        }
    };
    let mut groups: HashMap<i64, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        groups.entry(row.spectrum_id.unwrap_or(-1)).or_default().push(idx);
    }
    let score_of = |row: &PsmRow| -> f64 {
        row.extras
            .get(&score_column)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(if bigger_better { f64::NEG_INFINITY } else { f64::INFINITY })
    };
    for indices in groups.values() {
        for &idx in indices {
            let own = score_of(&rows[idx]);
            let better = indices
                .iter()
                .filter(|&&other| {
                    let score = score_of(&rows[other]);
                    if bigger_better {
                        score > own
                    } else {
                        score < own
                    }
                })
                .count();
            rows[idx].rank = Some(better as i64 + 1);
        }
    }
}

/// Flags decoys by the decoy tag: a row is a decoy whenever its protein id
/// contains the tag anywhere. Mixed target-decoy rows are counted and logged.
fn add_decoy_identity(rows: &mut [PsmRow], decoy_tag: &str, delimiter: &str) {
    let mut mixed = 0usize;
    for row in rows.iter_mut() {
        let protein_id = match row.protein_id.as_deref() {
            Some(p) => p,
            None => continue,
        };
        row.is_decoy = protein_id.contains(decoy_tag);
        if row.is_decoy && protein_id.split(delimiter).any(|p| !p.contains(decoy_tag)) {
            mixed += 1;
        }
    }
    if mixed > 0 {
        log::warn!("{mixed} rows map to both target and decoy proteins, flagged as decoys");
    }
}

/// True if `sequence` is fully tiled by the given peptides, matching
/// leftmost-longest at every boundary.
pub fn is_tiled_by(sequence: &str, peptides: &[String]) -> bool {
    if peptides.is_empty() || sequence.is_empty() {
        return false;
    }
    let mut rest = sequence;
    while !rest.is_empty() {
        let hit = peptides
            .iter()
            .filter(|p| !p.is_empty() && rest.starts_with(p.as_str()))
            .max_by_key(|p| p.len());
        match hit {
            Some(p) => rest = &rest[p.len()..],
            None => return false,
        }
    }
    true
}

fn flag_immutable_peptides(rows: &mut [PsmRow], immutable: &[String]) {
    if immutable.is_empty() {
        return;
    }
    for row in rows.iter_mut() {
        row.is_immutable = is_tiled_by(&row.sequence, immutable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EnzymeSpec;

    fn row(sequence: &str, pre: &str, post: &str, start: &str) -> PsmRow {
        PsmRow {
            sequence: sequence.to_string(),
            sequence_pre_aa: Some(pre.to_string()),
            sequence_post_aa: Some(post.to_string()),
            sequence_start: Some(start.to_string()),
            sequence_stop: Some("0".to_string()),
            ..PsmRow::default()
        }
    }

    fn trypsin_params() -> UnifyParams {
        UnifyParams::default()
    }

    #[test]
    fn test_enzyme_specificity_single_context() {
        let mut rows = vec![row("PEPRTIDEK", "K", "A", "120")];
        check_enzyme_specificity(&mut rows, &trypsin_params());
        let r = &rows[0];
        // K before P is a blocked site, the N-terminal boundary fails.
        assert!(!r.enzn);
        assert!(r.enzc);
        assert_eq!(r.missed_cleavages, Some(1));
    }

    #[test]
    fn test_enzyme_specificity_missed_cleavages() {
        let mut rows = vec![row("EPRPTRIRDEK", "K", "-", "30")];
        check_enzyme_specificity(&mut rows, &trypsin_params());
        assert_eq!(rows[0].missed_cleavages, Some(2));
        assert!(rows[0].enzn);
        assert!(rows[0].enzc);
    }

    #[test]
    fn test_enzyme_specificity_protein_terminus() {
        let mut rows = vec![row("MDEK", "-", "A", "1"), row("DEK", "M", "A", "2")];
        check_enzyme_specificity(&mut rows, &trypsin_params());
        // Start positions 1 and 2 both count as protein N-termini.
        assert!(rows[0].enzn);
        assert!(rows[1].enzn);
    }

    #[test]
    fn test_enzyme_specificity_multi_context_policies() {
        let mut params = trypsin_params();
        let mut rows = vec![row("TIDEK", "K<|>A", "A<|>A", "10<|>55")];
        check_enzyme_specificity(&mut rows, &params);
        assert!(!rows[0].enzn, "all policy requires every context to conform");

        params.terminal_cleavage_site_integrity = IntegrityPolicy::Any;
        let mut rows = vec![row("TIDEK", "K<|>A", "A<|>A", "10<|>55")];
        check_enzyme_specificity(&mut rows, &params);
        assert!(rows[0].enzn, "any policy accepts one conforming context");
    }

    #[test]
    fn test_nonspecific_enzyme() {
        let mut params = trypsin_params();
        params.enzyme = EnzymeSpec {
            cleave_at: String::new(),
            restrict: String::new(),
        };
        let mut rows = vec![row("PEPRTIDEK", "X", "X", "7")];
        check_enzyme_specificity(&mut rows, &params);
        assert!(rows[0].enzn);
        assert!(rows[0].enzc);
        assert_eq!(rows[0].missed_cleavages, Some(0));
    }

    fn scored_rows(scores: &[f64]) -> Vec<PsmRow> {
        scores
            .iter()
            .map(|s| {
                let mut r = PsmRow {
                    spectrum_id: Some(14),
                    search_engine: "comet_2020_01_4".to_string(),
                    ..PsmRow::default()
                };
                r.extras.insert("comet:e_value".to_string(), s.to_string());
                r
            })
            .collect()
    }

    #[test]
    fn test_ranks_smaller_better_with_ties() {
        let mut rows = scored_rows(&[5.0, 2.0, 1.0, 3.0, 3.0]);
        add_ranks(&mut rows, &trypsin_params());
        let ranks: Vec<i64> = rows.iter().map(|r| r.rank.unwrap()).collect();
        assert_eq!(ranks, vec![5, 2, 1, 3, 3]);
    }

    #[test]
    fn test_ranks_bigger_better_with_ties() {
        let mut params = trypsin_params();
        params
            .bigger_scores_better
            .insert("comet".to_string(), true);
        params
            .validation_score_field
            .insert("comet".to_string(), "comet:e_value".to_string());
        let mut rows = scored_rows(&[5.0, 2.0, 1.0, 3.0, 3.0]);
        add_ranks(&mut rows, &params);
        let ranks: Vec<i64> = rows.iter().map(|r| r.rank.unwrap()).collect();
        assert_eq!(ranks, vec![1, 4, 5, 2, 2]);
    }

    #[test]
    fn test_ranks_are_per_spectrum() {
        let mut rows = scored_rows(&[5.0, 2.0]);
        rows[1].spectrum_id = Some(15);
        add_ranks(&mut rows, &trypsin_params());
        assert_eq!(rows[0].rank, Some(1));
        assert_eq!(rows[1].rank, Some(1));
    }

    #[test]
    fn test_decoy_identity() {
        let mut rows = vec![
            PsmRow {
                protein_id: Some("decoy_sp|P1".to_string()),
                ..PsmRow::default()
            },
            PsmRow {
                protein_id: Some("sp|P1".to_string()),
                ..PsmRow::default()
            },
            PsmRow {
                protein_id: Some("sp|P1<|>decoy_sp|P2".to_string()),
                ..PsmRow::default()
            },
        ];
        add_decoy_identity(&mut rows, "decoy_", "<|>");
        assert!(rows[0].is_decoy);
        assert!(!rows[1].is_decoy);
        assert!(rows[2].is_decoy, "tag anywhere in the joined id marks a decoy");
    }

    #[test]
    fn test_is_tiled_by() {
        let peptides = vec!["ELVIS".to_string(), "LIVESK".to_string()];
        assert!(is_tiled_by("ELVISLIVESK", &peptides));
        assert!(!is_tiled_by("PEPTIDE", &peptides));
        assert!(!is_tiled_by("ELVISLIVESK", &[]));

        // Leftmost-longest consumes ELVISLIVES first, so the trailing K
        // stays uncovered even though a shorter tiling exists.
        let mut with_long = peptides;
        with_long.push("ELVISLIVES".to_string());
        assert!(!is_tiled_by("ELVISLIVESK", &with_long));
    }

    #[test]
    fn test_retain_iupac() {
        let mut rows = vec![
            PsmRow {
                sequence: "PEPTIDE".to_string(),
                ..PsmRow::default()
            },
            PsmRow {
                sequence: "PEPXTIDE".to_string(),
                ..PsmRow::default()
            },
        ];
        retain_iupac_sequences(&mut rows);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sequence, "PEPTIDE");
    }

    #[test]
    fn test_lowercase_sequences_are_uppercased_not_dropped() {
        let mut rows = vec![PsmRow {
            sequence: "lmnpqr".to_string(),
            ..PsmRow::default()
        }];
        retain_iupac_sequences(&mut rows);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sequence, "LMNPQR");
    }

    #[test]
    fn test_drop_duplicate_records() {
        let mut a = RawRecord::new();
        a.insert("sequence".to_string(), "PEPTIDE".to_string());
        let records = vec![a.clone(), a.clone()];
        assert_eq!(drop_duplicate_records(records).len(), 1);
    }
}
