//! Unification parameters, loadable from a TOML file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::mods::ModificationDescription;

/// Parameter loading failures.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("failed to read parameter file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse parameter file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Enzyme cleavage rule: cleave C-terminal to any residue in `cleave_at`
/// unless the following residue is in `restrict`. An empty `cleave_at`
/// means nonspecific digestion.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnzymeSpec {
    pub cleave_at: String,
    pub restrict: String,
}

impl Default for EnzymeSpec {
    fn default() -> EnzymeSpec {
        // Trypsin.
        EnzymeSpec {
            cleave_at: "KR".to_string(),
            restrict: "P".to_string(),
        }
    }
}

impl EnzymeSpec {
    pub fn is_nonspecific(&self) -> bool {
        self.cleave_at.is_empty()
    }

    /// True if a cleavage between `before` and `after` satisfies the rule.
    /// `-` marks a protein terminus and is always a valid boundary.
    pub fn is_cleavage_site(&self, before: char, after: char) -> bool {
        if self.is_nonspecific() || before == '-' || after == '-' {
            return true;
        }
        self.cleave_at.contains(before) && !self.restrict.contains(after)
    }
}

/// How multi-protein boundary contexts combine into one specificity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityPolicy {
    /// One conforming context is enough.
    Any,
    /// Every context must conform.
    All,
}

/// Full unification parameter set.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UnifyParams {
    /// Declared search modifications.
    pub modifications: Vec<ModificationDescription>,
    /// Spectrum metadata lookup (CSV, optionally gzipped).
    pub rt_lookup_path: Option<PathBuf>,
    /// Target-decoy FASTA database for protein inference.
    pub database: Option<PathBuf>,
    pub enzyme: EnzymeSpec,
    pub terminal_cleavage_site_integrity: IntegrityPolicy,
    /// Delimiter joining multi-protein values in one cell.
    pub delimiter: String,
    /// Substring of protein accessions marking decoys.
    pub decoy_tag: String,
    /// Score column used for ranking, keyed by engine tag prefix.
    pub validation_score_field: BTreeMap<String, String>,
    /// Score direction, keyed by engine tag prefix.
    pub bigger_scores_better: BTreeMap<String, bool>,
    /// Peptides always flagged immutable, e.g. spiked-in references.
    pub immutable_peptides: Vec<String>,
    /// Worker threads for mass enrichment. Defaults to cores minus one.
    pub cpus: Option<usize>,
    /// Interpret unmatched MSFragger masses as 15N-labeled residues.
    pub label_15n: bool,
    /// Maximum scan-time distance when matching identifications to the
    /// lookup, in seconds.
    pub rt_match_tolerance: f64,
}

impl Default for UnifyParams {
    fn default() -> UnifyParams {
        UnifyParams {
            modifications: Vec::new(),
            rt_lookup_path: None,
            database: None,
            enzyme: EnzymeSpec::default(),
            terminal_cleavage_site_integrity: IntegrityPolicy::All,
            delimiter: "<|>".to_string(),
            decoy_tag: "decoy_".to_string(),
            validation_score_field: BTreeMap::new(),
            bigger_scores_better: BTreeMap::new(),
            immutable_peptides: Vec::new(),
            cpus: None,
            label_15n: false,
            rt_match_tolerance: 1e-2,
        }
    }
}

/// Builtin score columns per engine family: `(tag prefix, column, bigger
/// is better)`.
const DEFAULT_SCORES: &[(&str, &str, bool)] = &[
    ("comet", "comet:e_value", false),
    ("msgfplus", "ms-gf:spec_evalue", false),
    ("xtandem", "x!tandem:hyperscore", true),
    ("msfragger", "msfragger:hyperscore", true),
];

impl UnifyParams {
    /// Reads parameters from a TOML file.
    pub fn from_file(path: &Path) -> Result<UnifyParams, ParamsError> {
        let text = std::fs::read_to_string(path).map_err(|source| ParamsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        UnifyParams::from_str_toml(&text)
    }

    /// Parses parameters from TOML text.
    pub fn from_str_toml(text: &str) -> Result<UnifyParams, ParamsError> {
        Ok(toml::from_str(text)?)
    }

    /// Score column and direction for an engine version tag such as
    /// `comet_2020_01_4`. Explicit configuration wins over builtins.
    pub fn score_field(&self, engine_tag: &str) -> Option<(String, bool)> {
        let configured = self
            .validation_score_field
            .iter()
            .find(|(prefix, _)| engine_tag.starts_with(prefix.as_str()))
            .map(|(prefix, column)| {
                let bigger = self
                    .bigger_scores_better
                    .iter()
                    .find(|(p, _)| engine_tag.starts_with(p.as_str()))
                    .map(|(_, b)| *b)
                    .or_else(|| builtin_direction(prefix))
                    .unwrap_or(false);
                (column.clone(), bigger)
            });
        configured.or_else(|| {
            DEFAULT_SCORES
                .iter()
                .find(|(prefix, _, _)| engine_tag.starts_with(prefix))
                .map(|(_, column, bigger)| (column.to_string(), *bigger))
        })
    }

    pub fn worker_threads(&self) -> usize {
        self.cpus
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()).saturating_sub(1))
            .max(1)
    }
}

fn builtin_direction(prefix: &str) -> Option<bool> {
    DEFAULT_SCORES
        .iter()
        .find(|(p, _, _)| prefix.starts_with(p) || p.starts_with(prefix))
        .map(|(_, _, b)| *b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::ModificationKind;

    const SAMPLE: &str = r#"
        decoy_tag = "rev_"
        immutable_peptides = ["ELVISLIVESK"]

        [[modifications]]
        aa = "C"
        type = "fix"
        name = "Carbamidomethyl"

        [[modifications]]
        aa = "M"
        type = "opt"
        position = "any"
        name = "Oxidation"

        [enzyme]
        cleave_at = "KR"
        restrict = "P"

        [validation_score_field]
        comet = "comet:xcorr"

        [bigger_scores_better]
        comet = true
    "#;

    #[test]
    fn test_from_str_toml() {
        let params = UnifyParams::from_str_toml(SAMPLE).unwrap();
        assert_eq!(params.decoy_tag, "rev_");
        assert_eq!(params.modifications.len(), 2);
        assert_eq!(params.modifications[0].kind, ModificationKind::Fix);
        assert_eq!(params.modifications[1].position, "any");
        assert_eq!(params.delimiter, "<|>");
        assert_eq!(params.immutable_peptides, vec!["ELVISLIVESK"]);
    }

    #[test]
    fn test_score_field_configured_overrides_builtin() {
        let params = UnifyParams::from_str_toml(SAMPLE).unwrap();
        assert_eq!(
            params.score_field("comet_2020_01_4"),
            Some(("comet:xcorr".to_string(), true))
        );
    }

    #[test]
    fn test_score_field_builtin_defaults() {
        let params = UnifyParams::default();
        assert_eq!(
            params.score_field("msgfplus_2021_03_22"),
            Some(("ms-gf:spec_evalue".to_string(), false))
        );
        assert_eq!(
            params.score_field("xtandem_alanine"),
            Some(("x!tandem:hyperscore".to_string(), true))
        );
        assert!(params.score_field("unheard_of_engine").is_none());
    }

    #[test]
    fn test_enzyme_cleavage_site() {
        let trypsin = EnzymeSpec::default();
        assert!(trypsin.is_cleavage_site('K', 'A'));
        assert!(!trypsin.is_cleavage_site('K', 'P'));
        assert!(!trypsin.is_cleavage_site('A', 'K'));
        assert!(trypsin.is_cleavage_site('-', 'M'));
        let nonspecific = EnzymeSpec {
            cleave_at: String::new(),
            restrict: String::new(),
        };
        assert!(nonspecific.is_cleavage_site('A', 'P'));
    }
}
