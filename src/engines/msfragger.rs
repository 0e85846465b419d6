//! MSFragger TSV extraction.
//!
//! MSFragger reports modifications as `{pos}{residue}({mass})` tokens and
//! never names them, so every delta mass is resolved against the declared
//! modification set, including summed co-occurring modifications and
//! optional 15N residue labeling.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::{parse_field, Extraction, ExtractorError, RawRecord};
use crate::chem::{aa_composition, mz_from_mass};
use crate::mods::ModificationLookup;

/// MSFragger carries no version string in its output, the tab layout
/// identifies the 3.x series.
const ENGINE_TAG: &str = "msfragger_3_0";

/// Mass difference between 15N and 14N.
const N15_DIFF: f64 = 0.997_034_893_4;

const MAPPING: &[(&str, &str)] = &[
    ("scannum", "spectrum_id"),
    ("peptide", "sequence"),
    ("charge", "charge"),
    ("retention_time", "retention_time_seconds"),
    ("hyperscore", "msfragger:hyperscore"),
    ("nextscore", "msfragger:nextscore"),
    ("expectscore", "msfragger:expectscore"),
    ("massdiff", "msfragger:massdiff"),
    ("precursor_neutral_mass", "msfragger:precursor_neutral_mass"),
    ("num_matched_ions", "msfragger:num_matched_ions"),
    ("tot_num_ions", "msfragger:tot_num_ions"),
    ("num_missed_cleavages", "msfragger:num_missed_cleavages"),
];

/// Header columns that identify an MSFragger TSV.
const REQUIRED_COLUMNS: &[&str] = &[
    "scannum",
    "precursor_neutral_mass",
    "calc_neutral_pep_mass",
    "charge",
    "peptide",
    "modification_info",
    "hyperscore",
];

/// True if a tab-separated header line carries the MSFragger columns.
pub fn header_matches(header: &str) -> bool {
    let columns: BTreeSet<&str> = header.split('\t').map(str::trim).collect();
    REQUIRED_COLUMNS.iter().all(|c| columns.contains(c))
}

/// Columns this extractor produces.
pub fn mapped_columns() -> BTreeSet<String> {
    let mut cols: BTreeSet<String> = MAPPING.iter().map(|(_, v)| v.to_string()).collect();
    cols.insert("modifications".to_string());
    cols.insert("exp_mz".to_string());
    cols.insert("calc_mz".to_string());
    cols
}

fn residue_mod_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<pos>\d+)(?P<aa>[A-Z])\((?P<mass>-?\d+\.\d+)\)$").unwrap()
    })
}

fn terminal_mod_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<term>[NC])-term\((?P<mass>-?\d+\.\d+)\)$").unwrap())
}

/// Extracts one MSFragger TSV file.
pub fn extract(
    path: &Path,
    lookup: &ModificationLookup,
    label_15n: bool,
) -> Result<Extraction, ExtractorError> {
    let reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)?;
    extract_csv(reader, lookup, label_15n)
}

pub fn extract_csv<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    lookup: &ModificationLookup,
    label_15n: bool,
) -> Result<Extraction, ExtractorError> {
    let headers = reader.headers()?.clone();
    let combos = combo_table(lookup);
    let mut records = Vec::new();
    let mut unresolved: BTreeSet<String> = BTreeSet::new();

    for row in reader.records() {
        let row = row?;
        let mut record = RawRecord::new();
        let field = |name: &str| -> Option<&str> {
            headers
                .iter()
                .position(|h| h == name)
                .and_then(|i| row.get(i))
                .filter(|v| !v.is_empty())
        };
        for (column, target) in MAPPING {
            if let Some(value) = field(column) {
                record.insert(target.to_string(), value.to_string());
            }
        }
        let charge: i64 = parse_field("charge", field("charge").unwrap_or("0"))?;
        if charge > 0 {
            if let Some(mass) = field("precursor_neutral_mass") {
                let mass: f64 = parse_field("precursor_neutral_mass", mass)?;
                record.insert("exp_mz".to_string(), mz_from_mass(mass, charge).to_string());
            }
            if let Some(mass) = field("calc_neutral_pep_mass") {
                let mass: f64 = parse_field("calc_neutral_pep_mass", mass)?;
                record.insert("calc_mz".to_string(), mz_from_mass(mass, charge).to_string());
            }
        }
        let sequence = field("peptide").unwrap_or("").to_string();
        let mods = field("modification_info").unwrap_or("");
        record.insert(
            "modifications".to_string(),
            resolve_mods(mods, &sequence, lookup, &combos, label_15n, &mut unresolved),
        );
        records.push(record);
    }

    for mass in &unresolved {
        log::warn!("MSFragger delta mass {mass} matches no declared modification, dropped");
    }
    Ok(Extraction {
        engine: ENGINE_TAG.to_string(),
        records,
        mapped_columns: mapped_columns(),
    })
}

fn mass_key(mass: f64) -> i64 {
    (mass * 1e4).round() as i64
}

/// Summed masses of declared modification pairs, for residues carrying two
/// modifications that MSFragger reports as one delta.
fn combo_table(lookup: &ModificationLookup) -> BTreeMap<i64, (String, String)> {
    let names: Vec<&String> = lookup.mods.keys().collect();
    let mut table = BTreeMap::new();
    for (i, a) in names.iter().enumerate() {
        for b in names.iter().skip(i) {
            let sum = lookup.mods[a.as_str()].mass + lookup.mods[b.as_str()].mass;
            table
                .entry(mass_key(sum))
                .or_insert_with(|| (a.to_string(), b.to_string()));
        }
    }
    table
}

fn resolve_mods(
    raw: &str,
    sequence: &str,
    lookup: &ModificationLookup,
    combos: &BTreeMap<i64, (String, String)>,
    label_15n: bool,
    unresolved: &mut BTreeSet<String>,
) -> String {
    let mut out: Vec<String> = Vec::new();
    let c_term = sequence.chars().count() as u32;
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (position, residue, mass) = match parse_token(token, c_term) {
            Some(parsed) => parsed,
            None => {
                log::debug!("malformed MSFragger modification token '{token}'");
                continue;
            }
        };
        // 15N-labeled samples fold the label into the reported delta.
        let mass = if label_15n {
            residue
                .and_then(|aa| nitrogen_shift(aa))
                .map(|shift| mass - shift)
                .unwrap_or(mass)
        } else {
            mass
        };
        let key = mass_key(mass);
        if let Some((a, b)) = combos.get(&key) {
            if lookup.names_for_mass(mass, 4).is_empty() {
                out.push(format!("{a}:{position}"));
                out.push(format!("{b}:{position}"));
                continue;
            }
        }
        match best_candidate(mass, position, residue, lookup) {
            Some(name) => out.push(format!("{name}:{position}")),
            None => {
                unresolved.insert(format!("{mass:.4}"));
            }
        }
    }
    out.join(";")
}

/// Token shapes: `5C(57.0215)` for residues, `N-term(42.0106)` or
/// `C-term(mass)` for termini. C-terminal tokens sit on the last residue.
fn parse_token(token: &str, c_term: u32) -> Option<(u32, Option<char>, f64)> {
    if let Some(caps) = residue_mod_regex().captures(token) {
        let position: u32 = caps["pos"].parse().ok()?;
        let residue = caps["aa"].chars().next();
        let mass: f64 = caps["mass"].parse().ok()?;
        return Some((position, residue, mass));
    }
    if let Some(caps) = terminal_mod_regex().captures(token) {
        let mass: f64 = caps["mass"].parse().ok()?;
        let position = if &caps["term"] == "N" { 0 } else { c_term };
        return Some((position, None, mass));
    }
    None
}

fn best_candidate(
    mass: f64,
    position: u32,
    residue: Option<char>,
    lookup: &ModificationLookup,
) -> Option<String> {
    let candidates = lookup.names_for_mass(mass, 4);
    let residue = residue.map(|c| c.to_string());
    candidates
        .iter()
        .find(|name| {
            let info = &lookup.mods[name.as_str()];
            match &residue {
                Some(aa) => info.aa.contains(aa),
                None if position == 0 => info.is_n_term(),
                None => info.is_c_term(),
            }
        })
        .cloned()
        .or_else(|| candidates.into_iter().next())
}

/// 15N mass shift of one residue, from its nitrogen count.
fn nitrogen_shift(aa: char) -> Option<f64> {
    aa_composition(aa).map(|comp| {
        comp.iter()
            .find(|(el, _)| *el == "N")
            .map(|(_, n)| *n as f64 * N15_DIFF)
            .unwrap_or(0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::{BuiltinUnimod, ModificationDescription, ModificationKind};

    const MSFRAGGER_TSV: &str = "\
scannum\tprecursor_neutral_mass\tcalc_neutral_pep_mass\tcharge\tretention_time\tpeptide\tmodification_info\thyperscore\tmassdiff\tnum_missed_cleavages
14\t902.3706\t902.3691\t2\t600.5\tPEPTCIDE\t5C(57.0215)\t21.5\t0.0015\t0
15\t1060.4\t1060.39\t2\t640.2\tMPEPTCIDEK\t1M(15.9949), 6C(57.0215)\t18.2\t0.01\t1
";

    fn lookup() -> ModificationLookup {
        ModificationLookup::resolve(
            &[
                ModificationDescription {
                    aa: "C".to_string(),
                    kind: ModificationKind::Fix,
                    position: "any".to_string(),
                    name: "Carbamidomethyl".to_string(),
                },
                ModificationDescription {
                    aa: "M".to_string(),
                    kind: ModificationKind::Opt,
                    position: "any".to_string(),
                    name: "Oxidation".to_string(),
                },
            ],
            &BuiltinUnimod,
        )
    }

    fn extract_str(text: &str, label_15n: bool) -> Extraction {
        let reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(text.as_bytes());
        extract_csv(reader, &lookup(), label_15n).unwrap()
    }

    #[test]
    fn test_header_matches() {
        assert!(header_matches(MSFRAGGER_TSV.lines().next().unwrap()));
        assert!(!header_matches("a\tb\tc"));
    }

    #[test]
    fn test_maps_columns_and_computes_mz() {
        let extraction = extract_str(MSFRAGGER_TSV, false);
        assert_eq!(extraction.engine, "msfragger_3_0");
        assert_eq!(extraction.records.len(), 2);
        let first = &extraction.records[0];
        assert_eq!(first["spectrum_id"], "14");
        assert_eq!(first["sequence"], "PEPTCIDE");
        assert_eq!(first["msfragger:hyperscore"], "21.5");
        let exp_mz: f64 = first["exp_mz"].parse().unwrap();
        assert!((exp_mz - mz_from_mass(902.3706, 2)).abs() < 1e-9);
    }

    #[test]
    fn test_resolves_mod_masses_to_names() {
        let extraction = extract_str(MSFRAGGER_TSV, false);
        assert_eq!(extraction.records[0]["modifications"], "Carbamidomethyl:5");
        assert_eq!(
            extraction.records[1]["modifications"],
            "Oxidation:1;Carbamidomethyl:6"
        );
    }

    #[test]
    fn test_combo_mass_splits_into_both_names() {
        let doc = MSFRAGGER_TSV.replace("5C(57.0215)", "5C(73.0164)");
        let extraction = extract_str(&doc, false);
        // 73.0164 = Carbamidomethyl + Oxidation.
        assert_eq!(
            extraction.records[0]["modifications"],
            "Carbamidomethyl:5;Oxidation:5"
        );
    }

    #[test]
    fn test_n_term_token() {
        let lk = ModificationLookup::resolve(
            &[ModificationDescription {
                aa: "*".to_string(),
                kind: ModificationKind::Opt,
                position: "N-term".to_string(),
                name: "Acetyl".to_string(),
            }],
            &BuiltinUnimod,
        );
        let text = MSFRAGGER_TSV.replace("5C(57.0215)", "N-term(42.0106)");
        let reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(text.as_bytes());
        let extraction = extract_csv(reader, &lk, false).unwrap();
        assert_eq!(extraction.records[0]["modifications"], "Acetyl:0");
    }

    #[test]
    fn test_c_term_token_sits_on_last_residue() {
        let lk = ModificationLookup::resolve(
            &[ModificationDescription {
                aa: "*".to_string(),
                kind: ModificationKind::Opt,
                position: "C-term".to_string(),
                name: "Amidated".to_string(),
            }],
            &BuiltinUnimod,
        );
        let text = MSFRAGGER_TSV.replace("5C(57.0215)", "C-term(-0.9840)");
        let reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(text.as_bytes());
        let extraction = extract_csv(reader, &lk, false).unwrap();
        // PEPTCIDE has eight residues.
        assert_eq!(extraction.records[0]["modifications"], "Amidated:8");
    }

    #[test]
    fn test_15n_shift_recovers_label() {
        // Carbamidomethyl on C with one 15N in the residue backbone.
        let shifted = 57.0215 + N15_DIFF;
        let doc = MSFRAGGER_TSV.replace("5C(57.0215)", &format!("5C({shifted:.4})"));
        let extraction = extract_str(&doc, true);
        assert_eq!(extraction.records[0]["modifications"], "Carbamidomethyl:5");
    }

    #[test]
    fn test_unresolved_mass_dropped() {
        let doc = MSFRAGGER_TSV.replace("5C(57.0215)", "5C(999.9999)");
        let extraction = extract_str(&doc, false);
        assert_eq!(extraction.records[0]["modifications"], "");
    }
}
