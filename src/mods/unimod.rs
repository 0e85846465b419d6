//! Unimod name and mass resolution.

use crate::chem::Composition;

/// Resolves modification names to monoisotopic masses and elemental
/// compositions, and delta masses back to candidate names.
pub trait UnimodSource: Send + Sync {
    /// Monoisotopic delta mass of a named modification.
    fn name_to_mass(&self, name: &str) -> Option<f64>;

    /// Elemental composition of a named modification. Labeled isotopes use
    /// `{roundedMass}{Element}` keys, negated elements carry negative counts.
    fn name_to_composition(&self, name: &str) -> Option<Composition>;

    /// Candidate names whose delta mass matches `mass` when both are rounded
    /// to `decimals` decimal places.
    fn mass_to_names(&self, mass: f64, decimals: u32) -> Vec<String>;
}

struct UnimodEntry {
    name: &'static str,
    mass: f64,
    composition: &'static [(&'static str, i64)],
}

/// The subset of Unimod entries commonly produced by the supported search
/// engines. A full `unimod.xml` backend can implement [`UnimodSource`]
/// without touching the resolution logic.
const BUILTIN_ENTRIES: &[UnimodEntry] = &[
    UnimodEntry {
        name: "Acetyl",
        mass: 42.010_565,
        composition: &[("C", 2), ("H", 2), ("O", 1)],
    },
    UnimodEntry {
        name: "Amidated",
        mass: -0.984_016,
        composition: &[("H", 1), ("N", 1), ("O", -1)],
    },
    UnimodEntry {
        name: "Carbamidomethyl",
        mass: 57.021_464,
        composition: &[("C", 2), ("H", 3), ("N", 1), ("O", 1)],
    },
    UnimodEntry {
        name: "Deamidated",
        mass: 0.984_016,
        composition: &[("H", -1), ("N", -1), ("O", 1)],
    },
    UnimodEntry {
        name: "Dimethyl",
        mass: 28.031_300,
        composition: &[("C", 2), ("H", 4)],
    },
    UnimodEntry {
        name: "Gln->pyro-Glu",
        mass: -17.026_549,
        composition: &[("H", -3), ("N", -1)],
    },
    UnimodEntry {
        name: "Glu->pyro-Glu",
        mass: -18.010_565,
        composition: &[("H", -2), ("O", -1)],
    },
    UnimodEntry {
        name: "Label:18O(1)",
        mass: 2.004_246,
        composition: &[("18O", 1), ("O", -1)],
    },
    UnimodEntry {
        name: "Methyl",
        mass: 14.015_650,
        composition: &[("C", 1), ("H", 2)],
    },
    UnimodEntry {
        name: "Oxidation",
        mass: 15.994_915,
        composition: &[("O", 1)],
    },
    UnimodEntry {
        name: "Phospho",
        mass: 79.966_331,
        composition: &[("H", 1), ("O", 3), ("P", 1)],
    },
    UnimodEntry {
        name: "TMT6plex",
        mass: 229.162_932,
        composition: &[("C", 8), ("13C", 4), ("H", 20), ("N", 1), ("15N", 1), ("O", 2)],
    },
    UnimodEntry {
        name: "Trimethyl",
        mass: 42.046_950,
        composition: &[("C", 3), ("H", 6)],
    },
];

/// [`UnimodSource`] backed by the embedded entry table.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinUnimod;

impl BuiltinUnimod {
    fn entry(&self, name: &str) -> Option<&'static UnimodEntry> {
        BUILTIN_ENTRIES.iter().find(|e| e.name == name)
    }
}

impl UnimodSource for BuiltinUnimod {
    fn name_to_mass(&self, name: &str) -> Option<f64> {
        self.entry(name).map(|e| e.mass)
    }

    fn name_to_composition(&self, name: &str) -> Option<Composition> {
        self.entry(name).map(|e| {
            e.composition
                .iter()
                .map(|(el, n)| (el.to_string(), *n))
                .collect()
        })
    }

    fn mass_to_names(&self, mass: f64, decimals: u32) -> Vec<String> {
        let factor = 10f64.powi(decimals as i32);
        let rounded = (mass * factor).round();
        BUILTIN_ENTRIES
            .iter()
            .filter(|e| (e.mass * factor).round() == rounded)
            .map(|e| e.name.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_to_mass() {
        let u = BuiltinUnimod;
        assert!((u.name_to_mass("Oxidation").unwrap() - 15.994_915).abs() < 1e-9);
        assert!(u.name_to_mass("NoSuchMod").is_none());
    }

    #[test]
    fn test_mass_to_names_rounds() {
        let u = BuiltinUnimod;
        assert_eq!(u.mass_to_names(57.0215, 4), vec!["Carbamidomethyl"]);
        assert_eq!(u.mass_to_names(15.9949, 4), vec!["Oxidation"]);
        // Acetyl and Trimethyl separate at two decimals.
        assert_eq!(u.mass_to_names(42.0106, 2), vec!["Acetyl"]);
        assert!(u.mass_to_names(1234.5, 4).is_empty());
    }

    #[test]
    fn test_label_composition_carries_isotope_key() {
        let u = BuiltinUnimod;
        let comp = u.name_to_composition("Label:18O(1)").unwrap();
        assert_eq!(comp.get("18O"), Some(&1));
        assert_eq!(comp.get("O"), Some(&-1));
    }
}
