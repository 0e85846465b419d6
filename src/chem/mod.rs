//! Chemistry kernel: element tables, composition arithmetic, isotopologues.

pub mod composition;
pub mod elements;
pub mod isotopologue;

pub use composition::{
    atom_counts, composition_table, count_mod_occurrences, element_order, formula_string,
    monoisotopic_mass_of, Composition,
};
pub use elements::{
    aa_composition, isotope_mass, isotopic_distribution, monoisotopic_mass, IUPAC_AAS, PROTON,
};
pub use isotopologue::{
    closest_isotopologue_ppm, split_labeled_formula, IsotopePatternSource,
    NaturalAbundancePattern, ISOTOPOLOGUE_THRESHOLD,
};

/// m/z of a neutral mass at the given positive charge.
pub fn mz_from_mass(mass: f64, charge: i64) -> f64 {
    (mass + charge as f64 * PROTON) / charge as f64
}

/// Neutral mass of an ion observed at `mz` with the given charge.
pub fn mass_from_mz(mz: f64, charge: i64) -> f64 {
    (mz - PROTON) * charge as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mz_mass_round_trip() {
        let mass = 902.369_149;
        for charge in 1..=4 {
            let mz = mz_from_mass(mass, charge);
            assert!((mass_from_mz(mz, charge) - mass).abs() < 1e-9);
        }
    }
}
