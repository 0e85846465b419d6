//! Per-engine result extraction.
//!
//! Each extractor turns one engine's native output into flat raw records
//! keyed by canonical column names, with engine scores under a namespaced
//! prefix (`comet:xcorr`). Downstream unification is engine-agnostic.

pub mod comet;
pub mod flashlfq;
pub mod msfragger;
pub mod msgfplus;
pub mod tmtquant;
pub mod xtandem;

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::BytesStart;
use thiserror::Error;

/// Errors raised during result extraction.
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 encoding error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("input ended before the {0} section was closed")]
    TruncatedInput(&'static str),

    #[error("missing required attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("invalid value in field '{field}': '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error(transparent)]
    Mods(#[from] crate::mods::ModError),
}

/// Flat record of one candidate match, canonical keys plus namespaced
/// engine columns, values engine-native.
pub type RawRecord = BTreeMap<String, String>;

/// Everything extracted from one result file.
#[derive(Debug)]
pub struct Extraction {
    /// Engine version tag, e.g. `comet_2020_01_4`.
    pub engine: String,
    pub records: Vec<RawRecord>,
    /// Columns the extractor maps deliberately. Anything else appearing in
    /// a record is dropped during schema enforcement.
    pub mapped_columns: BTreeSet<String>,
}

/// The supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFormat {
    CometMzid,
    MsgfPlusMzid,
    XTandemXml,
    MsFraggerTsv,
    FlashLfqTsv,
    TmtQuantCsv,
}

impl EngineFormat {
    pub fn name(&self) -> &'static str {
        match self {
            EngineFormat::CometMzid => "comet",
            EngineFormat::MsgfPlusMzid => "msgfplus",
            EngineFormat::XTandemXml => "xtandem",
            EngineFormat::MsFraggerTsv => "msfragger",
            EngineFormat::FlashLfqTsv => "flashlfq",
            EngineFormat::TmtQuantCsv => "tmtquant",
        }
    }

    /// Quant formats skip protein inference and enzyme annotation.
    pub fn is_quant(&self) -> bool {
        matches!(self, EngineFormat::FlashLfqTsv | EngineFormat::TmtQuantCsv)
    }

    /// Whether the engine reports scan times in its own output. Engines
    /// that do not are joined to the lookup by spectrum id alone.
    pub fn reports_retention_time(&self) -> bool {
        !matches!(self, EngineFormat::CometMzid)
    }
}

impl std::fmt::Display for EngineFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Sniffs the engine format of a result file from its extension and the
/// first lines of content.
pub fn detect_format(path: &Path) -> Result<Option<EngineFormat>, ExtractorError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let head = read_head(path, 20)?;
    let format = match extension.as_str() {
        "mzid" => {
            if head.iter().any(|l| l.contains("Comet")) {
                Some(EngineFormat::CometMzid)
            } else if head.iter().any(|l| l.contains("MS-GF+")) {
                Some(EngineFormat::MsgfPlusMzid)
            } else {
                None
            }
        }
        "xml" => head
            .iter()
            .any(|l| l.contains("tandem-style"))
            .then_some(EngineFormat::XTandemXml),
        "tsv" => match head.first() {
            Some(header) if msfragger::header_matches(header) => Some(EngineFormat::MsFraggerTsv),
            Some(header) if flashlfq::header_matches(header) => Some(EngineFormat::FlashLfqTsv),
            _ => None,
        },
        "csv" => match head.first() {
            Some(header) if tmtquant::header_matches(header) => Some(EngineFormat::TmtQuantCsv),
            _ => None,
        },
        _ => None,
    };
    Ok(format)
}

fn read_head(path: &Path, lines: usize) -> Result<Vec<String>, ExtractorError> {
    let reader = BufReader::new(File::open(path)?);
    let mut head = Vec::with_capacity(lines);
    for line in reader.lines().take(lines) {
        head.push(line?);
    }
    Ok(head)
}

/// Fetches one attribute of an XML element by name.
pub(crate) fn get_attribute(
    e: &BytesStart,
    name: &str,
) -> Result<Option<String>, ExtractorError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ExtractorError::Xml(quick_xml::Error::from(e)))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = std::str::from_utf8(&attr.value)?.to_string();
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Like [`get_attribute`] but required.
pub(crate) fn require_attribute(
    e: &BytesStart,
    name: &'static str,
) -> Result<String, ExtractorError> {
    get_attribute(e, name)?.ok_or(ExtractorError::MissingAttribute(name))
}

/// Collapses an engine version string to a tag: `Comet version "2020.01
/// rev. 4"` becomes `comet_2020_01_4`.
pub(crate) fn version_tag(engine: &str, raw: &str) -> String {
    let mut tag = engine.to_string();
    let mut current = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if !current.is_empty() {
            tag.push('_');
            tag.push_str(&current);
            current.clear();
        }
    }
    if !current.is_empty() {
        tag.push('_');
        tag.push_str(&current);
    }
    tag
}

/// Parses a numeric field, reporting the offending value on failure.
pub(crate) fn parse_field<T: std::str::FromStr>(
    field: &'static str,
    value: &str,
) -> Result<T, ExtractorError> {
    value.parse().map_err(|_| ExtractorError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_tag() {
        assert_eq!(
            version_tag("comet", "Comet version \"2020.01 rev. 4\""),
            "comet_2020_01_4"
        );
        assert_eq!(version_tag("msgfplus", "Release (v2021.03.22)"), "msgfplus_2021_03_22");
        assert_eq!(version_tag("xtandem", ""), "xtandem");
    }

    #[test]
    fn test_parse_field_reports_value() {
        assert_eq!(parse_field::<i64>("charge", "3").unwrap(), 3);
        let err = parse_field::<i64>("charge", "three").unwrap_err();
        assert!(matches!(err, ExtractorError::InvalidValue { field: "charge", .. }));
    }
}
