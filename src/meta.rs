//! Spectrum metadata lookup: scan times, source files, precursor m/z.
//!
//! The lookup is a CSV (optionally gzipped) with columns `spectrum_id`,
//! `rt`, `rt_unit`, `file` and `precursor_mz`, typically exported once per
//! raw file and shared by every engine result unified against it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::Deserialize;
use thiserror::Error;

/// Metadata lookup failures.
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("failed to open lookup '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed lookup row: {0}")]
    Csv(#[from] csv::Error),
    #[error("unknown retention time unit '{0}'")]
    UnknownUnit(String),
}

#[derive(Debug, Deserialize)]
struct LookupRow {
    spectrum_id: i64,
    rt: f64,
    rt_unit: String,
    file: String,
    precursor_mz: Option<f64>,
}

/// Metadata of one spectrum in one raw file.
#[derive(Debug, Clone, PartialEq)]
pub struct RtEntry {
    pub rt_seconds: f64,
    pub file: String,
    pub precursor_mz: Option<f64>,
}

/// Scan metadata indexed by spectrum id.
#[derive(Debug, Default)]
pub struct RtLookup {
    by_spectrum: HashMap<i64, Vec<RtEntry>>,
}

fn to_seconds(rt: f64, unit: &str) -> Result<f64, MetaError> {
    match unit {
        "second" | "s" => Ok(rt),
        "minute" | "min" => Ok(rt * 60.0),
        other => Err(MetaError::UnknownUnit(other.to_string())),
    }
}

impl RtLookup {
    /// Loads a lookup CSV, transparently decompressing `.gz` files.
    pub fn from_path(path: &Path) -> Result<RtLookup, MetaError> {
        let file = File::open(path).map_err(|source| MetaError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        if path.extension().is_some_and(|e| e == "gz") {
            RtLookup::from_reader(GzDecoder::new(BufReader::new(file)))
        } else {
            RtLookup::from_reader(BufReader::new(file))
        }
    }

    /// Parses a lookup from any CSV reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<RtLookup, MetaError> {
        let mut by_spectrum: HashMap<i64, Vec<RtEntry>> = HashMap::new();
        let mut csv_reader = csv::Reader::from_reader(reader);
        for row in csv_reader.deserialize() {
            let row: LookupRow = row?;
            by_spectrum.entry(row.spectrum_id).or_default().push(RtEntry {
                rt_seconds: to_seconds(row.rt, &row.rt_unit)?,
                file: row.file,
                precursor_mz: row.precursor_mz,
            });
        }
        Ok(RtLookup { by_spectrum })
    }

    pub fn is_empty(&self) -> bool {
        self.by_spectrum.is_empty()
    }

    /// All entries recorded for a spectrum id.
    pub fn entries(&self, spectrum_id: i64) -> &[RtEntry] {
        self.by_spectrum
            .get(&spectrum_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The unique entry for a spectrum id, or `None` when the id is absent
    /// or ambiguous. Used by engines that report no scan time of their own.
    pub fn unique_entry(&self, spectrum_id: i64) -> Option<&RtEntry> {
        match self.entries(spectrum_id) {
            [single] => Some(single),
            _ => None,
        }
    }

    /// The entry whose scan time lies within `tolerance` seconds of
    /// `rt_seconds`, or `None` when absent or ambiguous.
    pub fn entry_near(&self, spectrum_id: i64, rt_seconds: f64, tolerance: f64) -> Option<&RtEntry> {
        let mut matches = self
            .entries(spectrum_id)
            .iter()
            .filter(|e| (e.rt_seconds - rt_seconds).abs() <= tolerance);
        match (matches.next(), matches.next()) {
            (Some(single), None) => Some(single),
            _ => None,
        }
    }

    /// Inverse index from `(file, scan time rounded to `decimals`)` to
    /// spectrum id, used to link quant records back to spectra.
    pub fn inverse_index(&self, decimals: u32) -> HashMap<(String, i64), i64> {
        let factor = 10f64.powi(decimals as i32);
        let mut index = HashMap::new();
        for (spectrum_id, entries) in &self.by_spectrum {
            for entry in entries {
                let key = (entry.file.clone(), (entry.rt_seconds * factor).round() as i64);
                index.insert(key, *spectrum_id);
            }
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOKUP: &str = "\
spectrum_id,rt,rt_unit,file,precursor_mz
1,10.5,second,runA.mzML,445.12
2,0.5,minute,runA.mzML,
2,31.0,second,runB.mzML,512.3
3,45.0,s,runA.mzML,300.1
";

    fn lookup() -> RtLookup {
        RtLookup::from_reader(LOOKUP.as_bytes()).unwrap()
    }

    #[test]
    fn test_minutes_convert_to_seconds() {
        let l = lookup();
        let entries = l.entries(2);
        assert_eq!(entries.len(), 2);
        assert!((entries[0].rt_seconds - 30.0).abs() < 1e-9);
        assert_eq!(entries[0].precursor_mz, None);
    }

    #[test]
    fn test_unique_entry_rejects_ambiguity() {
        let l = lookup();
        assert!(l.unique_entry(1).is_some());
        assert!(l.unique_entry(2).is_none());
        assert!(l.unique_entry(99).is_none());
    }

    #[test]
    fn test_entry_near_tolerance() {
        let l = lookup();
        let entry = l.entry_near(2, 30.004, 1e-2).unwrap();
        assert_eq!(entry.file, "runA.mzML");
        assert!(l.entry_near(2, 30.5, 1e-2).is_none());
        // Both runs sit within a 2 second window, ambiguous.
        assert!(l.entry_near(2, 30.5, 2.0).is_none());
    }

    #[test]
    fn test_inverse_index() {
        let l = lookup();
        let index = l.inverse_index(5);
        assert_eq!(index[&("runA.mzML".to_string(), 1_050_000)], 1);
        assert_eq!(index[&("runB.mzML".to_string(), 3_100_000)], 2);
    }

    #[test]
    fn test_unknown_unit_is_error() {
        let bad = "spectrum_id,rt,rt_unit,file,precursor_mz\n1,2.0,hours,a.mzML,\n";
        assert!(matches!(
            RtLookup::from_reader(bad.as_bytes()),
            Err(MetaError::UnknownUnit(_))
        ));
    }
}
