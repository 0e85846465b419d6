//! TMT reporter-ion quantification CSV extraction.
//!
//! The input already carries near-canonical column names, so extraction is
//! a thin rename plus constant fills.

use std::collections::BTreeSet;
use std::path::Path;

use super::{Extraction, ExtractorError, RawRecord};

const ENGINE_TAG: &str = "tmtquant_1_0_0";

const MAPPING: &[(&str, &str)] = &[
    ("filename", "file_name"),
    ("spectrum_id", "spectrum_id"),
    ("retention_time_seconds", "retention_time_seconds"),
    ("quant_value", "quant_value"),
    ("label", "label"),
    ("mz", "exp_mz"),
    ("mz_delta", "delta_mz"),
    ("ppm", "accuracy_ppm"),
    ("s2i", "s2i"),
    ("p2t", "p2t"),
    ("iso_mz", "tmt:iso_mz"),
    ("isolabel_id", "tmt:isolabel_id"),
    ("raw_quant_intensity", "tmt:raw_quant_intensity"),
    ("raw_quant_area", "tmt:raw_quant_area"),
    ("original_quant_value", "tmt:original_quant_value"),
];

/// Header columns that identify a TMT quant CSV.
const REQUIRED_COLUMNS: &[&str] = &[
    "filename",
    "mz",
    "raw_quant_intensity",
    "retention_time_seconds",
    "label",
    "mz_delta",
    "iso_mz",
    "ppm",
    "spectrum_id",
    "s2i",
    "quant_value",
];

/// True if a comma-separated header line carries the TMT quant columns.
pub fn header_matches(header: &str) -> bool {
    let columns: BTreeSet<&str> = header.split(',').map(str::trim).collect();
    REQUIRED_COLUMNS.iter().all(|c| columns.contains(c))
}

/// Columns this extractor produces.
pub fn mapped_columns() -> BTreeSet<String> {
    let mut cols: BTreeSet<String> = MAPPING.iter().map(|(_, v)| v.to_string()).collect();
    cols.insert("quant_run_id".to_string());
    cols
}

/// Extracts one TMT quant CSV file.
pub fn extract(path: &Path) -> Result<Extraction, ExtractorError> {
    extract_csv(csv::Reader::from_path(path)?)
}

pub fn extract_csv<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> Result<Extraction, ExtractorError> {
    let headers = reader.headers()?.clone();
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = RawRecord::new();
        for (column, target) in MAPPING {
            if let Some(value) = headers
                .iter()
                .position(|h| h == *column)
                .and_then(|i| row.get(i))
                .filter(|v| !v.is_empty())
            {
                record.insert(target.to_string(), value.to_string());
            }
        }
        record.insert("quant_run_id".to_string(), "TMTQuant".to_string());
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

    const TMT_CSV: &str = "\
filename,spectrum_id,retention_time_seconds,mz,mz_delta,iso_mz,ppm,label,isolabel_id,raw_quant_intensity,raw_quant_area,original_quant_value,s2i,p2t,quant_value
runA.mzML,14,600.5,126.1277,0.0003,126.1274,2.4,TMT6plex,126,10432.1,20012.4,10432.1,0.92,12.1,10211.9
";

    #[test]
    fn test_header_matches() {
        assert!(header_matches(TMT_CSV.lines().next().unwrap()));
        assert!(!header_matches("filename,mz"));
    }

    #[test]
    fn test_extraction_renames_columns() {
        let extraction = extract_csv(csv::Reader::from_reader(TMT_CSV.as_bytes())).unwrap();
        assert_eq!(extraction.engine, "tmtquant_1_0_0");
        let record = &extraction.records[0];
        assert_eq!(record["file_name"], "runA.mzML");
        assert_eq!(record["spectrum_id"], "14");
        assert_eq!(record["exp_mz"], "126.1277");
        assert_eq!(record["delta_mz"], "0.0003");
        assert_eq!(record["accuracy_ppm"], "2.4");
        assert_eq!(record["s2i"], "0.92");
        assert_eq!(record["tmt:isolabel_id"], "126");
        assert_eq!(record["quant_run_id"], "TMTQuant");
    }
}
