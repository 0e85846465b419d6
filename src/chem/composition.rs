//! Elemental composition arithmetic for peptidoforms.

use std::collections::{BTreeMap, BTreeSet};

use crate::chem::elements::{aa_composition, monoisotopic_mass};

/// Signed element counts keyed by element symbol. Labeled isotopes use
/// `{roundedMass}{Element}` keys such as `18O`.
pub type Composition = BTreeMap<String, i64>;

/// Orders element symbols canonically: carbon, then hydrogen, then the
/// remaining symbols alphabetically.
pub fn element_order(elements: &BTreeSet<String>) -> Vec<String> {
    let mut out: Vec<String> = elements.iter().cloned().collect();
    out.sort_by_key(|e| match e.as_str() {
        "C" => "00".to_string(),
        "H" => "01".to_string(),
        other => other.to_string(),
    });
    out
}

/// Number of occurrences of modification `name` in a canonical modification
/// string (`Name:pos;...`). Only exact name matches with a numeric position
/// count; names containing colons (`Label:18O(1)`) are handled.
pub fn count_mod_occurrences(modifications: &str, name: &str) -> i64 {
    modifications
        .split(';')
        .filter(|token| {
            token
                .rsplit_once(':')
                .map(|(n, pos)| {
                    n == name && !pos.is_empty() && pos.bytes().all(|b| b.is_ascii_digit())
                })
                .unwrap_or(false)
        })
        .count() as i64
}

/// Per-record atom counts for peptidoforms.
///
/// Sums free amino-acid compositions and one modification composition per
/// occurrence, then removes one water per peptide bond. Returns the ordered
/// element list and one count row per input record.
pub fn atom_counts(
    sequences: &[String],
    modifications: &[String],
    compositions: &BTreeMap<String, Composition>,
) -> (Vec<String>, Vec<Vec<i64>>) {
    let mut elements: BTreeSet<String> = BTreeSet::new();
    for comp in compositions.values() {
        for el in comp.keys() {
            elements.insert(el.clone());
        }
    }
    let elements = element_order(&elements);
    let index: BTreeMap<&str, usize> = elements
        .iter()
        .enumerate()
        .map(|(i, e)| (e.as_str(), i))
        .collect();

    let mut rows = Vec::with_capacity(sequences.len());
    for (seq, mods) in sequences.iter().zip(modifications.iter()) {
        let mut counts = vec![0i64; elements.len()];
        for (key, comp) in compositions {
            let occurrences = if key.chars().count() == 1 {
                seq.chars()
                    .filter(|c| key.chars().next() == Some(*c))
                    .count() as i64
            } else {
                count_mod_occurrences(mods, key)
            };
            if occurrences == 0 {
                continue;
            }
            for (el, n) in comp {
                counts[index[el.as_str()]] += n * occurrences;
            }
        }
        // One water is lost per peptide bond.
        let bonds = seq.chars().count().saturating_sub(1) as i64;
        if bonds > 0 {
            if let Some(&h) = index.get("H") {
                counts[h] -= 2 * bonds;
            }
            if let Some(&o) = index.get("O") {
                counts[o] -= bonds;
            }
        }
        rows.push(counts);
    }
    (elements, rows)
}

/// Renders element counts as a hill-ordered formula string, e.g.
/// `C(37)H(58)N(8)O(16)S(1)`. Zero-count elements are omitted.
pub fn formula_string(elements: &[String], counts: &[i64]) -> String {
    let mut out = String::new();
    for (el, n) in elements.iter().zip(counts.iter()) {
        if *n != 0 {
            out.push_str(el);
            out.push('(');
            out.push_str(&n.to_string());
            out.push(')');
        }
    }
    out
}

/// Builds the composition table used for atom counting: one entry per IUPAC
/// residue plus one entry per named modification.
pub fn composition_table(
    mod_compositions: &BTreeMap<String, Composition>,
) -> BTreeMap<String, Composition> {
    let mut table: BTreeMap<String, Composition> = BTreeMap::new();
    for aa in crate::chem::elements::IUPAC_AAS.chars() {
        if let Some(comp) = aa_composition(aa) {
            table.insert(
                aa.to_string(),
                comp.iter().map(|(e, n)| (e.to_string(), *n)).collect(),
            );
        }
    }
    for (name, comp) in mod_compositions {
        table.insert(name.clone(), comp.clone());
    }
    table
}

/// Monoisotopic mass of an element count row. Labeled element keys resolve
/// to the mass of the named isotope.
pub fn monoisotopic_mass_of(elements: &[String], counts: &[i64]) -> Option<f64> {
    let mut mass = 0.0;
    for (el, n) in elements.iter().zip(counts.iter()) {
        if *n == 0 {
            continue;
        }
        mass += monoisotopic_mass(el)? * *n as f64;
    }
    Some(mass)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BTreeMap<String, Composition> {
        composition_table(&BTreeMap::new())
    }

    #[test]
    fn test_single_glutamate() {
        let (elements, rows) = atom_counts(&["E".to_string()], &[String::new()], &table());
        assert_eq!(elements[0], "C");
        assert_eq!(elements[1], "H");
        let chno: Vec<i64> = ["C", "H", "N", "O"]
            .iter()
            .map(|e| rows[0][elements.iter().position(|x| x == e).unwrap()])
            .collect();
        assert_eq!(chno, vec![5, 9, 1, 4]);
    }

    #[test]
    fn test_dipeptide_loses_one_water() {
        let (elements, rows) = atom_counts(&["EE".to_string()], &[String::new()], &table());
        let chno: Vec<i64> = ["C", "H", "N", "O"]
            .iter()
            .map(|e| rows[0][elements.iter().position(|x| x == e).unwrap()])
            .collect();
        assert_eq!(chno, vec![10, 16, 2, 7]);
    }

    #[test]
    fn test_formula_string_skips_zero_counts() {
        let (elements, rows) = atom_counts(&["PEPTCIDE".to_string()], &[String::new()], &table());
        let formula = formula_string(&elements, &rows[0]);
        assert_eq!(formula, "C(37)H(58)N(8)O(16)S(1)");
    }

    #[test]
    fn test_modified_peptide_counts() {
        let mut mods: BTreeMap<String, Composition> = BTreeMap::new();
        mods.insert(
            "Carbamidomethyl".to_string(),
            [("C", 2), ("H", 3), ("N", 1), ("O", 1)]
                .iter()
                .map(|(e, n)| (e.to_string(), *n))
                .collect(),
        );
        let table = composition_table(&mods);
        let (elements, rows) = atom_counts(
            &["PEPTCIDE".to_string()],
            &["Carbamidomethyl:5".to_string()],
            &table,
        );
        let formula = formula_string(&elements, &rows[0]);
        assert_eq!(formula, "C(39)H(61)N(9)O(17)S(1)");
    }

    #[test]
    fn test_count_mod_occurrences_with_colon_in_name() {
        let mods = "Label:18O(1):7;Oxidation:3;Oxidation:5";
        assert_eq!(count_mod_occurrences(mods, "Label:18O(1)"), 1);
        assert_eq!(count_mod_occurrences(mods, "Oxidation"), 2);
        assert_eq!(count_mod_occurrences(mods, "Acetyl"), 0);
    }

    #[test]
    fn test_monoisotopic_mass_peptcide() {
        let (elements, rows) = atom_counts(&["PEPTCIDE".to_string()], &[String::new()], &table());
        let mass = monoisotopic_mass_of(&elements, &rows[0]).unwrap();
        assert!((mass - 902.369_149).abs() < 1e-5);
    }
}
