//! Comet mzIdentML (1.2) extraction.
//!
//! Comet omits fixed modifications from `Peptide` elements, so they are
//! reinstated from the declared modification set after extraction.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{get_attribute, require_attribute, version_tag, Extraction, ExtractorError, RawRecord};
use crate::mods::{inject_fixed_mods, ModError, ModificationLookup};

/// Attribute and cvParam names mapped into the unified schema.
const MAPPING: &[(&str, &str)] = &[
    ("chargeState", "charge"),
    ("experimentalMassToCharge", "exp_mz"),
    ("calculatedMassToCharge", "calc_mz"),
    ("Comet:xcorr", "comet:xcorr"),
    ("Comet:deltacn", "comet:deltacn"),
    ("Comet:spscore", "comet:spscore"),
    ("Comet:sprank", "comet:sprank"),
    ("Comet:expectation value", "comet:e_value"),
    ("number of matched peaks", "comet:num_matched_ions"),
    ("number of unmatched peaks", "comet:num_unmatched_ions"),
];

fn mapped(key: &str) -> Option<&'static str> {
    MAPPING.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Columns this extractor produces.
pub fn mapped_columns() -> BTreeSet<String> {
    let mut cols: BTreeSet<String> = MAPPING.iter().map(|(_, v)| v.to_string()).collect();
    cols.insert("spectrum_id".to_string());
    cols.insert("sequence".to_string());
    cols.insert("modifications".to_string());
    cols
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    SearchParams,
    Results,
}

#[derive(Debug, Default)]
struct PendingSearchMod {
    mass: Option<f64>,
    name: Option<String>,
}

#[derive(Debug, Default)]
struct PendingPeptide {
    id: String,
    sequence: String,
    /// Raw `(mass, location)` pairs in document order.
    mods: Vec<(f64, u32)>,
}

/// Extracts one Comet mzIdentML file.
pub fn extract(path: &Path, lookup: &ModificationLookup) -> Result<Extraction, ExtractorError> {
    extract_reader(BufReader::new(File::open(path)?), lookup)
}

/// Extraction from any reader, used directly by tests.
pub fn extract_reader<R: BufRead>(
    reader: R,
    lookup: &ModificationLookup,
) -> Result<Extraction, ExtractorError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut stage = Stage::Idle;
    let mut version = String::new();
    // Delta mass scaled to 4 decimals -> modification name.
    let mut search_mods: BTreeMap<i64, String> = BTreeMap::new();
    let mut pending_search_mod: Option<PendingSearchMod> = None;
    let mut peptides: BTreeMap<String, (String, String)> = BTreeMap::new();
    let mut pending_peptide: Option<PendingPeptide> = None;
    let mut in_peptide_sequence = false;

    let mut records: Vec<RawRecord> = Vec::new();
    let mut result_fields = RawRecord::new();
    let mut items: Vec<RawRecord> = Vec::new();
    let mut current_item: Option<RawRecord> = None;
    let mut done = false;

    let mut buf = Vec::new();
    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"MzIdentML" => {
                    if let Some(v) = get_attribute(e, "version")? {
                        if !v.starts_with("1.2") {
                            log::warn!("expected mzIdentML 1.2, file declares {v}");
                        }
                    }
                }
                b"AnalysisSoftware" => {
                    if let Some(v) = get_attribute(e, "version")? {
                        version = version_tag("comet", &v);
                    }
                }
                b"AdditionalSearchParams" | b"ModificationParams" => {
                    stage = Stage::SearchParams;
                }
                b"SearchModification" if stage == Stage::SearchParams => {
                    let mass = require_attribute(e, "massDelta")?;
                    pending_search_mod = Some(PendingSearchMod {
                        mass: mass.parse().ok(),
                        name: None,
                    });
                }
                b"cvParam" if pending_search_mod.is_some() => {
                    if let Some(name) = get_attribute(e, "name")? {
                        if name != "unknown modification" {
                            if let Some(pending) = pending_search_mod.as_mut() {
                                pending.name = Some(name);
                            }
                        }
                    }
                }
                b"Peptide" => {
                    pending_peptide = Some(PendingPeptide {
                        id: require_attribute(e, "id")?,
                        ..PendingPeptide::default()
                    });
                }
                b"PeptideSequence" => in_peptide_sequence = true,
                b"Modification" => {
                    if let Some(pending) = pending_peptide.as_mut() {
                        let mass: f64 = require_attribute(e, "monoisotopicMassDelta")?
                            .parse()
                            .unwrap_or(f64::NAN);
                        let location: u32 = require_attribute(e, "location")?
                            .parse()
                            .unwrap_or(0);
                        pending.mods.push((mass, location));
                    }
                }
                b"SpectrumIdentificationResult" => {
                    stage = Stage::Results;
                    result_fields.clear();
                    items.clear();
                    let spectrum_ref = require_attribute(e, "spectrumID")?;
                    result_fields.insert(
                        "spectrum_id".to_string(),
                        spectrum_ref
                            .rsplit_once("scan=")
                            .map(|(_, id)| id.to_string())
                            .unwrap_or(spectrum_ref),
                    );
                }
                b"SpectrumIdentificationItem" if stage == Stage::Results => {
                    let mut item = RawRecord::new();
                    for (attr, column) in MAPPING {
                        if let Some(value) = get_attribute(e, attr)? {
                            item.insert(column.to_string(), value);
                        }
                    }
                    if let Some(peptide_ref) = get_attribute(e, "peptide_ref")? {
                        item.insert("peptide_ref".to_string(), peptide_ref);
                    }
                    current_item = Some(item);
                }
                b"cvParam" if stage == Stage::Results => {
                    if let (Some(name), Some(value)) =
                        (get_attribute(e, "name")?, get_attribute(e, "value")?)
                    {
                        if let Some(column) = mapped(&name) {
                            match current_item.as_mut() {
                                Some(item) => item.insert(column.to_string(), value),
                                None => result_fields.insert(column.to_string(), value),
                            };
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref t)) if in_peptide_sequence => {
                if let Some(pending) = pending_peptide.as_mut() {
                    pending.sequence.push_str(std::str::from_utf8(t)?.trim());
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"SearchModification" => {
                    if let Some(pending) = pending_search_mod.take() {
                        commit_search_mod(pending, lookup, &mut search_mods)?;
                    }
                }
                b"ModificationParams" | b"AdditionalSearchParams" => stage = Stage::Idle,
                b"PeptideSequence" => in_peptide_sequence = false,
                b"Peptide" => {
                    if let Some(pending) = pending_peptide.take() {
                        let mods =
                            resolve_peptide_mods(&pending, lookup, &search_mods)?;
                        let mods = inject_fixed_mods(&mods, &pending.sequence, &lookup.fixed);
                        peptides.insert(pending.id, (pending.sequence, mods));
                    }
                }
                b"SpectrumIdentificationItem" => {
                    if let Some(item) = current_item.take() {
                        items.push(item);
                    }
                }
                b"SpectrumIdentificationResult" => {
                    for mut item in items.drain(..) {
                        for (k, v) in &result_fields {
                            item.insert(k.clone(), v.clone());
                        }
                        if let Some(peptide_ref) = item.remove("peptide_ref") {
                            if let Some((sequence, mods)) = peptides.get(&peptide_ref) {
                                item.insert("sequence".to_string(), sequence.clone());
                                item.insert("modifications".to_string(), mods.clone());
                            }
                        }
                        records.push(item);
                    }
                }
                b"SpectrumIdentificationList" => {
                    done = true;
                    break;
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
        return Err(ExtractorError::TruncatedInput("SpectrumIdentificationList"));
    }
    Ok(Extraction {
        engine: version,
        records,
        mapped_columns: mapped_columns(),
    })
}

fn mass_key(mass: f64) -> i64 {
    (mass * 1e4).round() as i64
}

fn commit_search_mod(
    pending: PendingSearchMod,
    lookup: &ModificationLookup,
    search_mods: &mut BTreeMap<i64, String>,
) -> Result<(), ExtractorError> {
    let mass = match pending.mass {
        Some(m) => m,
        None => return Ok(()),
    };
    let name = match pending.name {
        Some(name) => name,
        // "unknown modification" entries resolve through the declared set.
        None => lookup
            .names_for_mass(mass, 4)
            .into_iter()
            .next()
            .ok_or(ModError::UnresolvedMass {
                mass: mass.to_string(),
                position: "search parameters".to_string(),
            })?,
    };
    search_mods.insert(mass_key(mass), name);
    Ok(())
}

fn resolve_peptide_mods(
    peptide: &PendingPeptide,
    lookup: &ModificationLookup,
    search_mods: &BTreeMap<i64, String>,
) -> Result<String, ExtractorError> {
    let mut out = Vec::with_capacity(peptide.mods.len());
    for (mass, location) in &peptide.mods {
        let name = search_mods
            .get(&mass_key(*mass))
            .cloned()
            .or_else(|| lookup.names_for_mass(*mass, 4).into_iter().next())
            .ok_or_else(|| ModError::UnresolvedMass {
                mass: mass.to_string(),
                position: format!("{}@{}", peptide.sequence, location),
            })?;
        out.push(format!("{name}:{location}"));
    }
    Ok(out.join(";"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::{ModificationDescription, ModificationKind, BuiltinUnimod};

    const COMET_MZID: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MzIdentML version="1.2.0" xmlns="http://psidev.info/psi/pi/mzIdentML/1.2">
  <AnalysisSoftwareList>
    <AnalysisSoftware id="AS_comet" name="Comet" version="Comet version &quot;2020.01 rev. 4&quot;"/>
  </AnalysisSoftwareList>
  <AnalysisProtocolCollection>
    <SpectrumIdentificationProtocol id="SIP">
      <ModificationParams>
        <SearchModification fixedMod="true" massDelta="57.021464" residues="C">
          <cvParam cvRef="UNIMOD" accession="UNIMOD:4" name="Carbamidomethyl"/>
        </SearchModification>
        <SearchModification fixedMod="false" massDelta="15.994915" residues="M">
          <cvParam cvRef="MS" accession="MS:1001460" name="unknown modification"/>
        </SearchModification>
      </ModificationParams>
    </SpectrumIdentificationProtocol>
  </AnalysisProtocolCollection>
  <SequenceCollection>
    <Peptide id="PEP_1">
      <PeptideSequence>MCDEK</PeptideSequence>
      <Modification location="1" monoisotopicMassDelta="15.994915"/>
    </Peptide>
    <Peptide id="PEP_2">
      <PeptideSequence>LMNPQR</PeptideSequence>
    </Peptide>
  </SequenceCollection>
  <DataCollection>
    <AnalysisData>
      <SpectrumIdentificationList id="SIL">
        <SpectrumIdentificationResult id="SIR_1" spectrumID="scan=14">
          <SpectrumIdentificationItem id="SII_1_1" rank="1" chargeState="2"
            experimentalMassToCharge="328.135" calculatedMassToCharge="328.137"
            peptide_ref="PEP_1" passThreshold="true">
            <cvParam cvRef="MS" accession="MS:1002257" name="Comet:expectation value" value="0.03"/>
            <cvParam cvRef="MS" accession="MS:1002252" name="Comet:xcorr" value="1.24"/>
          </SpectrumIdentificationItem>
          <SpectrumIdentificationItem id="SII_1_2" rank="2" chargeState="2"
            experimentalMassToCharge="328.135" calculatedMassToCharge="329.101"
            peptide_ref="PEP_2" passThreshold="true">
            <cvParam cvRef="MS" accession="MS:1002257" name="Comet:expectation value" value="0.5"/>
          </SpectrumIdentificationItem>
        </SpectrumIdentificationResult>
      </SpectrumIdentificationList>
    </AnalysisData>
  </DataCollection>
</MzIdentML>
"#;

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

    #[test]
    fn test_extracts_items_with_result_fields() {
        let extraction = extract_reader(COMET_MZID.as_bytes(), &lookup()).unwrap();
        assert_eq!(extraction.engine, "comet_2020_01_4");
        assert_eq!(extraction.records.len(), 2);
        let first = &extraction.records[0];
        assert_eq!(first["spectrum_id"], "14");
        assert_eq!(first["sequence"], "MCDEK");
        assert_eq!(first["charge"], "2");
        assert_eq!(first["comet:e_value"], "0.03");
        assert_eq!(first["comet:xcorr"], "1.24");
        let second = &extraction.records[1];
        assert_eq!(second["sequence"], "LMNPQR");
        assert_eq!(second["spectrum_id"], "14");
    }

    #[test]
    fn test_fixed_mods_reinstated_and_unknown_resolved() {
        let extraction = extract_reader(COMET_MZID.as_bytes(), &lookup()).unwrap();
        // Oxidation resolved from the "unknown modification" search entry,
        // Carbamidomethyl injected for the C at position 2.
        assert_eq!(
            extraction.records[0]["modifications"],
            "Oxidation:1;Carbamidomethyl:2"
        );
        assert_eq!(extraction.records[1]["modifications"], "");
    }

    #[test]
    fn test_unresolvable_search_mod_is_fatal() {
        let doc = COMET_MZID.replace("massDelta=\"15.994915\"", "massDelta=\"123.4567\"");
        let err = extract_reader(doc.as_bytes(), &lookup()).unwrap_err();
        assert!(matches!(
            err,
            ExtractorError::Mods(ModError::UnresolvedMass { .. })
        ));
    }

    #[test]
    fn test_truncated_input_is_fatal() {
        let cut = &COMET_MZID[..COMET_MZID.find("</SpectrumIdentificationResult>").unwrap()];
        let err = extract_reader(cut.as_bytes(), &lookup()).unwrap_err();
        assert!(matches!(err, ExtractorError::TruncatedInput(_)));
    }
}
