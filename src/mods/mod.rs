//! Modification configuration, resolution, and normalization.

pub mod normalize;
pub mod unimod;

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use thiserror::Error;

use crate::chem::Composition;
pub use normalize::{inject_fixed_mods, normalize as normalize_mods, residue_offsets};
pub use unimod::{BuiltinUnimod, UnimodSource};

/// Errors raised while resolving modification configuration.
#[derive(Debug, Error)]
pub enum ModError {
    /// A search result carried a modification mass with no Unimod name.
    #[error("no Unimod name resolves delta mass {mass} (position {position})")]
    UnresolvedMass { mass: String, position: String },
    /// A raw modification could not be placed on any sequence position.
    #[error("modification '{name}' maps to no valid position in '{sequence}'")]
    Unplaceable { name: String, sequence: String },
}

/// Whether a configured modification is applied to every matching residue
/// or reported per spectrum by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationKind {
    Fix,
    Opt,
}

/// One modification as declared in the parameter file.
#[derive(Debug, Clone, Deserialize)]
pub struct ModificationDescription {
    /// Target residue, or `*` for any.
    pub aa: String,
    #[serde(rename = "type")]
    pub kind: ModificationKind,
    /// Positional class: `any`, `N-term`, `C-term`, `Prot-N-term`,
    /// `Prot-C-term`.
    #[serde(default = "default_position")]
    pub position: String,
    pub name: String,
}

fn default_position() -> String {
    "any".to_string()
}

/// Resolved facts about one configured modification name.
#[derive(Debug, Clone)]
pub struct ModInfo {
    pub mass: f64,
    pub composition: Composition,
    /// Residues and positional classes this name may sit on.
    pub aa: BTreeSet<String>,
    pub positions: BTreeSet<String>,
}

impl ModInfo {
    /// True for any N-terminal positional class.
    pub fn is_n_term(&self) -> bool {
        self.positions
            .iter()
            .any(|p| p == "N-term" || p == "Prot-N-term")
    }

    /// True for any C-terminal positional class.
    pub fn is_c_term(&self) -> bool {
        self.positions
            .iter()
            .any(|p| p == "C-term" || p == "Prot-C-term")
    }
}

/// Configured modifications resolved against a [`UnimodSource`].
#[derive(Debug, Default)]
pub struct ModificationLookup {
    pub mods: BTreeMap<String, ModInfo>,
    /// Declared names Unimod could not resolve. Records carrying these are
    /// excluded from mass enrichment, not dropped.
    pub non_mappable: BTreeSet<String>,
    /// Fixed modifications as `(residues, name)` in declaration order.
    pub fixed: Vec<(String, String)>,
}

impl ModificationLookup {
    /// Resolves every declared modification, logging the ones Unimod does
    /// not know.
    pub fn resolve(
        declarations: &[ModificationDescription],
        source: &dyn UnimodSource,
    ) -> ModificationLookup {
        let mut lookup = ModificationLookup::default();
        for decl in declarations {
            let (mass, composition) = match (
                source.name_to_mass(&decl.name),
                source.name_to_composition(&decl.name),
            ) {
                (Some(m), Some(c)) => (m, c),
                _ => {
                    log::warn!(
                        "modification '{}' not in Unimod, excluded from mass enrichment",
                        decl.name
                    );
                    lookup.non_mappable.insert(decl.name.clone());
                    continue;
                }
            };
            let info = lookup.mods.entry(decl.name.clone()).or_insert(ModInfo {
                mass,
                composition,
                aa: BTreeSet::new(),
                positions: BTreeSet::new(),
            });
            info.aa.insert(decl.aa.clone());
            info.aa.insert(decl.position.clone());
            info.positions.insert(decl.position.clone());
            if decl.kind == ModificationKind::Fix {
                lookup.fixed.push((decl.aa.clone(), decl.name.clone()));
            }
        }
        lookup
    }

    /// Compositions of all resolved modifications, keyed by name.
    pub fn compositions(&self) -> BTreeMap<String, Composition> {
        self.mods
            .iter()
            .map(|(name, info)| (name.clone(), info.composition.clone()))
            .collect()
    }

    /// Candidate configured names for a delta mass, in sorted name order.
    pub fn names_for_mass(&self, mass: f64, decimals: u32) -> Vec<String> {
        let factor = 10f64.powi(decimals as i32);
        let rounded = (mass * factor).round();
        self.mods
            .iter()
            .filter(|(_, info)| (info.mass * factor).round() == rounded)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
