//! X!Tandem BIOML extraction.
//!
//! X!Tandem reports modifications as raw `aa` elements carrying a delta
//! mass and an absolute protein coordinate. Masses are mapped to declared
//! modification names in a second pass, validated against the residue they
//! sit on.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use super::{get_attribute, require_attribute, Extraction, ExtractorError, RawRecord};
use crate::chem::PROTON;
use crate::mods::{ModError, ModificationLookup};

const DOMAIN_MAPPING: &[(&str, &str)] = &[
    ("expect", "x!tandem:expect"),
    ("hyperscore", "x!tandem:hyperscore"),
    ("nextscore", "x!tandem:nextscore"),
    ("y_score", "x!tandem:y_score"),
    ("y_ions", "x!tandem:y_ions"),
    ("b_score", "x!tandem:b_score"),
    ("b_ions", "x!tandem:b_ions"),
];

/// Columns this extractor produces.
pub fn mapped_columns() -> BTreeSet<String> {
    let mut cols: BTreeSet<String> =
        DOMAIN_MAPPING.iter().map(|(_, v)| v.to_string()).collect();
    for extra in [
        "spectrum_id",
        "spectrum_title",
        "sequence",
        "modifications",
        "charge",
        "exp_mz",
        "calc_mz",
        "retention_time_seconds",
    ] {
        cols.insert(extra.to_string());
    }
    cols
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Tandem (\w+)").unwrap())
}

#[derive(Debug, Default)]
struct SpectrumGroup {
    charge: Option<i64>,
    parent_mh: Option<f64>,
    retention_time_seconds: Option<String>,
    spectrum_title: Option<String>,
    spectrum_id: Option<String>,
    domains: Vec<Domain>,
}

#[derive(Debug, Default)]
struct Domain {
    fields: RawRecord,
    start: u32,
    /// Raw `(mass, 0-based in-peptide offset)` pairs.
    raw_mods: Vec<(f64, u32)>,
}

/// Extracts one X!Tandem result file.
pub fn extract(path: &Path, lookup: &ModificationLookup) -> Result<Extraction, ExtractorError> {
    extract_reader(BufReader::new(File::open(path)?), lookup)
}

pub fn extract_reader<R: BufRead>(
    reader: R,
    lookup: &ModificationLookup,
) -> Result<Extraction, ExtractorError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut version = "xtandem".to_string();
    // One entry per open group element, true for spectrum groups.
    let mut group_stack: Vec<bool> = Vec::new();
    let mut spectrum: Option<SpectrumGroup> = None;
    let mut domain: Option<Domain> = None;
    let mut note_label: Option<String> = None;
    let mut note_text = String::new();
    let mut raw_records: Vec<(RawRecord, Vec<(f64, u32)>, String)> = Vec::new();
    let mut done = false;

    let mut buf = Vec::new();
    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.name().as_ref() {
                    b"group" => {
                        let id = get_attribute(e, "id")?;
                        let is_spectrum = id.is_some() && spectrum.is_none();
                        if is_spectrum {
                            let mut g = SpectrumGroup {
                                spectrum_id: id,
                                ..SpectrumGroup::default()
                            };
                            g.charge = get_attribute(e, "z")?.and_then(|z| z.parse().ok());
                            g.parent_mh = get_attribute(e, "mh")?.and_then(|m| m.parse().ok());
                            g.retention_time_seconds = get_attribute(e, "rt")?
                                .map(|rt| rt.trim_start_matches("PT").trim_end_matches('S').to_string())
                                .filter(|rt| !rt.is_empty());
                            spectrum = Some(g);
                        }
                        group_stack.push(is_spectrum);
                    }
                    b"domain" => {
                        let mut d = Domain {
                            start: require_attribute(e, "start")?.parse().unwrap_or(1),
                            ..Domain::default()
                        };
                        if let Some(seq) = get_attribute(e, "seq")? {
                            d.fields.insert("sequence".to_string(), seq);
                        }
                        if let Some(mh) = get_attribute(e, "mh")? {
                            d.fields.insert("calc_mh".to_string(), mh);
                        }
                        for (attr, column) in DOMAIN_MAPPING {
                            if let Some(value) = get_attribute(e, attr)? {
                                d.fields.insert(column.to_string(), value);
                            }
                        }
                        domain = Some(d);
                    }
                    b"aa" => {
                        if let Some(d) = domain.as_mut() {
                            if let Some(mass) = get_attribute(e, "modified")? {
                                let at: u32 = require_attribute(e, "at")?.parse().unwrap_or(0);
                                let mass: f64 = mass.parse().unwrap_or(f64::NAN);
                                d.raw_mods.push((mass, at.saturating_sub(d.start)));
                            }
                        }
                    }
                    b"note" => {
                        note_label = get_attribute(e, "label")?;
                        note_text.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref t)) if note_label.is_some() => {
                note_text.push_str(std::str::from_utf8(t)?);
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"note" => {
                    match note_label.take().as_deref() {
                        Some("Description") => {
                            if let Some(g) = spectrum.as_mut() {
                                if g.spectrum_title.is_none() {
                                    let title =
                                        note_text.split_whitespace().next().unwrap_or("").to_string();
                                    let from_title = title
                                        .split('.')
                                        .rev()
                                        .nth(2)
                                        .filter(|t| t.bytes().all(|b| b.is_ascii_digit()))
                                        .map(|t| t.to_string());
                                    if let Some(id) = from_title {
                                        g.spectrum_id = Some(id);
                                    }
                                    g.spectrum_title = Some(title);
                                }
                            }
                        }
                        Some("process, version") => {
                            if let Some(caps) = version_regex().captures(&note_text) {
                                version = format!("xtandem_{}", caps[1].to_lowercase());
                            }
                        }
                        _ => {}
                    }
                    note_text.clear();
                }
                b"domain" => {
                    if let (Some(d), Some(_)) = (domain.take(), spectrum.as_ref()) {
                        if let Some(g) = spectrum.as_mut() {
                            g.domains.push(d);
                        }
                    }
                }
                b"group" => {
                    let was_spectrum = group_stack.pop().unwrap_or(false);
                    if was_spectrum {
                        if let Some(g) = spectrum.take() {
                            commit_spectrum(g, &mut raw_records);
                        }
                    }
                }
                b"bioml" => {
                    done = true;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        buf.clear();
    }

    if !done {
        return Err(ExtractorError::TruncatedInput("bioml"));
    }

    let mut records = Vec::with_capacity(raw_records.len());
    for (mut fields, raw_mods, sequence) in raw_records {
        fields.insert(
            "modifications".to_string(),
            map_mod_names(&raw_mods, &sequence, lookup)?,
        );
        records.push(fields);
    }
    Ok(Extraction {
        engine: version,
        records,
        mapped_columns: mapped_columns(),
    })
}

fn commit_spectrum(
    group: SpectrumGroup,
    out: &mut Vec<(RawRecord, Vec<(f64, u32)>, String)>,
) {
    let charge = group.charge;
    let exp_mz = match (group.parent_mh, charge) {
        (Some(mh), Some(z)) if z > 0 => Some((mh - PROTON) / z as f64 + PROTON),
        _ => None,
    };
    for mut domain in group.domains {
        let mut fields = std::mem::take(&mut domain.fields);
        if let Some(id) = &group.spectrum_id {
            fields.insert("spectrum_id".to_string(), id.clone());
        }
        if let Some(title) = &group.spectrum_title {
            fields.insert("spectrum_title".to_string(), title.clone());
        }
        if let Some(rt) = &group.retention_time_seconds {
            fields.insert("retention_time_seconds".to_string(), rt.clone());
        }
        if let Some(z) = charge {
            fields.insert("charge".to_string(), z.to_string());
        }
        if let Some(mz) = exp_mz {
            fields.insert("exp_mz".to_string(), mz.to_string());
        }
        if let (Some(mh), Some(z)) = (
            fields.remove("calc_mh").and_then(|m| m.parse::<f64>().ok()),
            charge,
        ) {
            if z > 0 {
                let calc = (mh - PROTON) / z as f64 + PROTON;
                fields.insert("calc_mz".to_string(), calc.to_string());
            }
        }
        let sequence = fields.get("sequence").cloned().unwrap_or_default();
        out.push((fields, domain.raw_mods, sequence));
    }
}

/// Maps raw delta masses onto declared modification names, checking the
/// residue at the reported offset or an N-terminal positional class.
fn map_mod_names(
    raw_mods: &[(f64, u32)],
    sequence: &str,
    lookup: &ModificationLookup,
) -> Result<String, ExtractorError> {
    let mut out: Vec<String> = Vec::with_capacity(raw_mods.len());
    for (mass, offset) in raw_mods {
        let candidates = lookup.names_for_mass(*mass, 4);
        if candidates.is_empty() {
            log::debug!("delta mass {mass} matches no declared modification, dropped");
            continue;
        }
        let residue = sequence
            .chars()
            .nth(*offset as usize)
            .map(|c| c.to_string())
            .unwrap_or_default();
        let mut placed = false;
        for name in &candidates {
            let info = &lookup.mods[name];
            if info.aa.contains(&residue) {
                out.push(format!("{name}:{}", offset + 1));
                placed = true;
                break;
            }
            if *offset == 0 && info.is_n_term() {
                out.push(format!("{name}:0"));
                placed = true;
                break;
            }
        }
        if !placed {
            return Err(ModError::Unplaceable {
                name: candidates.join("|"),
                sequence: sequence.to_string(),
            }
            .into());
        }
    }
    Ok(out.join(";"))
}
