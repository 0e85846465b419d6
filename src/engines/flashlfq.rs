//! FlashLFQ quantified-peak TSV extraction.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::{Extraction, ExtractorError, RawRecord};

const ENGINE_TAG: &str = "flashlfq_1_2_0";

const MAPPING: &[(&str, &str)] = &[
    ("File Name", "file_name"),
    ("Base Sequence", "trivial_name"),
    ("Protein Group", "quant_group"),
    ("Precursor Charge", "charge"),
    ("Peak intensity", "quant_value"),
    ("Peptide Monoisotopic Mass", "flashlfq:peptide_monoisotopic_mass"),
    ("Theoretical MZ", "flashlfq:theoretical_mz"),
    ("Peak MZ", "flashlfq:peak_mz"),
    ("Peak RT Apex", "flashlfq:peak_rt_apex"),
    ("Peak Detection Type", "flashlfq:peak_detection_type"),
    ("MBR Score", "flashlfq:mbr_score"),
];

/// Header columns that identify a FlashLFQ TSV.
const REQUIRED_COLUMNS: &[&str] = &[
    "File Name",
    "Base Sequence",
    "Full Sequence",
    "Protein Group",
    "Peptide Monoisotopic Mass",
    "MS2 Retention Time",
    "Precursor Charge",
    "Peak intensity",
];

/// True if a tab-separated header line carries the FlashLFQ columns.
pub fn header_matches(header: &str) -> bool {
    let columns: BTreeSet<&str> = header.split('\t').map(str::trim).collect();
    REQUIRED_COLUMNS.iter().all(|c| columns.contains(c))
}

/// Columns this extractor produces.
pub fn mapped_columns() -> BTreeSet<String> {
    let mut cols: BTreeSet<String> = MAPPING.iter().map(|(_, v)| v.to_string()).collect();
    for extra in ["retention_time_seconds", "modifications", "label", "quant_run_id"] {
        cols.insert(extra.to_string());
    }
    cols
}

fn bracket_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(.*?)\]").unwrap())
}

/// Extracts modifications from a FlashLFQ full sequence such as
/// `ELVISC[Carbamidomethyl]M[Oxidation]` into canonical `Name:pos` form.
/// Positions are offsets into the bare sequence, so each match start is
/// corrected by the length of the brackets already consumed.
pub(crate) fn translate_full_sequence_mods(full_sequence: &str) -> String {
    let mut consumed = 0;
    let mut mods = Vec::new();
    for caps in bracket_regex().captures_iter(full_sequence) {
        let whole = caps.get(0).map(|m| (m.start(), m.len())).unwrap_or((0, 0));
        let name = &caps[1];
        // Strip engine qualifiers like "Common Fixed:Carbamidomethyl on C".
        let name = name.rsplit_once(':').map(|(_, n)| n).unwrap_or(name);
        let name = name.split(" on ").next().unwrap_or(name).trim();
        mods.push(format!("{name}:{}", whole.0 - consumed));
        consumed += whole.1;
    }
    mods.join(";")
}

/// Extracts one FlashLFQ TSV file.
pub fn extract(path: &Path) -> Result<Extraction, ExtractorError> {
    let reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)?;
    extract_csv(reader)
}

pub fn extract_csv<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> Result<Extraction, ExtractorError> {
    let headers = reader.headers()?.clone();
    let mut records = Vec::new();
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
        // FlashLFQ reports retention times in minutes.
        if let Some(rt) = field("MS2 Retention Time").and_then(|v| v.parse::<f64>().ok()) {
            record.insert("retention_time_seconds".to_string(), (rt * 60.0).to_string());
        }
        if let Some(full) = field("Full Sequence") {
            record.insert(
                "modifications".to_string(),
                translate_full_sequence_mods(full),
            );
        }
        record.insert("label".to_string(), "LabelFree".to_string());
        record.insert("quant_run_id".to_string(), "FlashLFQ".to_string());
        records.push(record);
    }
    Ok(Extraction {
        engine: ENGINE_TAG.to_string(),
        records,
        mapped_columns: mapped_columns(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLASHLFQ_TSV: &str = "\
File Name\tBase Sequence\tFull Sequence\tProtein Group\tPeptide Monoisotopic Mass\tMS2 Retention Time\tPrecursor Charge\tTheoretical MZ\tPeak intensity\tPeak MZ\tPeak RT Apex\tPeak Detection Type\tMBR Score\tPSMs Mapped
runA\tPEPTCIDE\tPEPTC[Carbamidomethyl]IDE\tsp|P001|TEST\t959.3906\t10.0083\t2\t480.7026\t123456.7\t480.7031\t10.01\tMSMS\t0\t1
";

    #[test]
    fn test_header_matches() {
        assert!(header_matches(FLASHLFQ_TSV.lines().next().unwrap()));
        assert!(!header_matches("scannum\tpeptide"));
    }

    #[test]
    fn test_extraction_maps_and_converts_rt() {
        let reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(FLASHLFQ_TSV.as_bytes());
        let extraction = extract_csv(reader).unwrap();
        assert_eq!(extraction.records.len(), 1);
        let record = &extraction.records[0];
        assert_eq!(record["file_name"], "runA");
        assert_eq!(record["trivial_name"], "PEPTCIDE");
        assert_eq!(record["quant_group"], "sp|P001|TEST");
        assert_eq!(record["quant_value"], "123456.7");
        assert_eq!(record["label"], "LabelFree");
        let rt: f64 = record["retention_time_seconds"].parse().unwrap();
        assert!((rt - 600.498).abs() < 1e-9);
        assert_eq!(record["modifications"], "Carbamidomethyl:5");
    }

    #[test]
    fn test_translate_full_sequence_mods() {
        assert_eq!(
            translate_full_sequence_mods("ELVISC[Carbamidomethyl]M[Oxidation]"),
            "Carbamidomethyl:6;Oxidation:7"
        );
        assert_eq!(
            translate_full_sequence_mods("PEPC[Common Fixed:Carbamidomethyl on C]K"),
            "Carbamidomethyl:4"
        );
        assert_eq!(translate_full_sequence_mods("PEPTIDE"), "");
    }
}
