//! MS-GF+ mzIdentML (1.1) extraction.
//!
//! Unlike Comet, MS-GF+ writes fixed modifications into its `Peptide`
//! elements and names each one in a child cvParam, so no reinstatement or
//! mass resolution is needed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{get_attribute, require_attribute, version_tag, Extraction, ExtractorError, RawRecord};

const MAPPING: &[(&str, &str)] = &[
    ("chargeState", "charge"),
    ("experimentalMassToCharge", "exp_mz"),
    ("calculatedMassToCharge", "calc_mz"),
    ("MS-GF:RawScore", "ms-gf:raw_score"),
    ("MS-GF:DeNovoScore", "ms-gf:denovo_score"),
    ("MS-GF:SpecEValue", "ms-gf:spec_evalue"),
    ("MS-GF:EValue", "ms-gf:evalue"),
    ("IsotopeError", "ms-gf:isotope_error"),
    ("AssumedDissociationMethod", "ms-gf:assumed_dissociation_method"),
    ("scan number(s)", "spectrum_id"),
    ("scan start time", "retention_time_seconds"),
];

fn mapped(key: &str) -> Option<&'static str> {
    MAPPING.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Columns this extractor produces.
pub fn mapped_columns() -> BTreeSet<String> {
    let mut cols: BTreeSet<String> = MAPPING.iter().map(|(_, v)| v.to_string()).collect();
    cols.insert("sequence".to_string());
    cols.insert("modifications".to_string());
    cols
}

#[derive(Debug, Default)]
struct PendingPeptide {
    id: String,
    sequence: String,
    mods: Vec<String>,
    /// Location of the `Modification` element currently open.
    open_mod_location: Option<u32>,
}

/// Extracts one MS-GF+ mzIdentML file.
pub fn extract(path: &Path) -> Result<Extraction, ExtractorError> {
    extract_reader(BufReader::new(File::open(path)?))
}

pub fn extract_reader<R: BufRead>(reader: R) -> Result<Extraction, ExtractorError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut version = String::new();
    let mut peptides: BTreeMap<String, (String, String)> = BTreeMap::new();
    let mut pending_peptide: Option<PendingPeptide> = None;
    let mut in_peptide_sequence = false;
    let mut in_results = false;

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
                        if !v.starts_with("1.1") {
                            log::warn!("expected mzIdentML 1.1, file declares {v}");
                        }
                    }
                }
                b"AnalysisSoftware" => {
                    if let Some(v) = get_attribute(e, "version")? {
                        version = version_tag("msgfplus", &v);
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
                        pending.open_mod_location =
                            Some(require_attribute(e, "location")?.parse().unwrap_or(0));
                    }
                }
                b"cvParam" | b"userParam" => {
                    if let Some(pending) = pending_peptide.as_mut() {
                        if let Some(location) = pending.open_mod_location {
                            let name = get_attribute(e, "name")?.unwrap_or_default();
                            let name = if name == "unknown modification" {
                                get_attribute(e, "value")?.unwrap_or(name)
                            } else {
                                name
                            };
                            pending.mods.push(format!("{name}:{location}"));
                        }
                    } else if in_results {
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
                }
                b"SpectrumIdentificationResult" => {
                    in_results = true;
                    result_fields.clear();
                    items.clear();
                }
                b"SpectrumIdentificationItem" if in_results => {
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
                _ => {}
            },
            Ok(Event::Text(ref t)) if in_peptide_sequence => {
                if let Some(pending) = pending_peptide.as_mut() {
                    pending.sequence.push_str(std::str::from_utf8(t)?.trim());
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"PeptideSequence" => in_peptide_sequence = false,
                b"Modification" => {
                    if let Some(pending) = pending_peptide.as_mut() {
                        pending.open_mod_location = None;
                    }
                }
                b"Peptide" => {
                    if let Some(pending) = pending_peptide.take() {
                        peptides.insert(
                            pending.id,
                            (pending.sequence, pending.mods.join(";")),
                        );
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

#[cfg(test)]
mod tests {
    use super::*;

    const MSGF_MZID: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MzIdentML version="1.1.0" xmlns="http://psidev.info/psi/pi/mzIdentML/1.1">
  <AnalysisSoftwareList>
    <AnalysisSoftware id="ID_software" name="MS-GF+" version="Release (v2021.03.22)"/>
  </AnalysisSoftwareList>
  <SequenceCollection>
    <Peptide id="Pep_MCDEK">
      <PeptideSequence>MCDEK</PeptideSequence>
      <Modification location="2" monoisotopicMassDelta="57.021464">
        <cvParam cvRef="UNIMOD" accession="UNIMOD:4" name="Carbamidomethyl"/>
      </Modification>
      <Modification location="1" monoisotopicMassDelta="15.994915">
        <cvParam cvRef="MS" accession="MS:1001460" name="unknown modification" value="Oxidation"/>
      </Modification>
    </Peptide>
  </SequenceCollection>
  <DataCollection>
    <AnalysisData>
      <SpectrumIdentificationList id="SI_LIST_1">
        <FragmentationTable/>
        <SpectrumIdentificationResult id="SIR_1" spectrumID="index=13">
          <SpectrumIdentificationItem id="SII_1_1" rank="1" chargeState="2"
            experimentalMassToCharge="328.135" calculatedMassToCharge="328.137"
            peptide_ref="Pep_MCDEK" passThreshold="true">
            <cvParam cvRef="MS" accession="MS:1002049" name="MS-GF:RawScore" value="35"/>
            <cvParam cvRef="MS" accession="MS:1002052" name="MS-GF:SpecEValue" value="1.2e-12"/>
            <userParam name="IsotopeError" value="0"/>
          </SpectrumIdentificationItem>
          <cvParam cvRef="MS" accession="MS:1001115" name="scan number(s)" value="14"/>
          <cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="600.5"/>
        </SpectrumIdentificationResult>
      </SpectrumIdentificationList>
    </AnalysisData>
  </DataCollection>
</MzIdentML>
"#;

    #[test]
    fn test_extracts_item_and_merges_result_params() {
        let extraction = extract_reader(MSGF_MZID.as_bytes()).unwrap();
        assert_eq!(extraction.engine, "msgfplus_2021_03_22");
        assert_eq!(extraction.records.len(), 1);
        let record = &extraction.records[0];
        assert_eq!(record["sequence"], "MCDEK");
        assert_eq!(record["spectrum_id"], "14");
        assert_eq!(record["retention_time_seconds"], "600.5");
        assert_eq!(record["ms-gf:raw_score"], "35");
        assert_eq!(record["ms-gf:spec_evalue"], "1.2e-12");
        assert_eq!(record["ms-gf:isotope_error"], "0");
    }

    #[test]
    fn test_named_and_unknown_mods() {
        let extraction = extract_reader(MSGF_MZID.as_bytes()).unwrap();
        assert_eq!(
            extraction.records[0]["modifications"],
            "Carbamidomethyl:2;Oxidation:1"
        );
    }

    #[test]
    fn test_truncated_input_is_fatal() {
        let cut = &MSGF_MZID[..MSGF_MZID.find("</SpectrumIdentificationList>").unwrap()];
        let err = extract_reader(cut.as_bytes()).unwrap_err();
        assert!(matches!(err, ExtractorError::TruncatedInput(_)));
    }
}
