//! Isotopologue enumeration and labeled-aware mass accuracy.
//!
//! Precursor accuracy is computed against the closest isotopologue of the
//! theoretical pattern rather than the monoisotopic peak alone, so that
//! selection of a +1/+2 isotope peak by the instrument does not inflate the
//! reported error.

use std::sync::OnceLock;

use regex::Regex;

use crate::chem::elements::{isotope_mass, isotopic_distribution, PROTON};

/// Probability threshold below which isotopologues are not enumerated.
pub const ISOTOPOLOGUE_THRESHOLD: f64 = 0.02;

/// Source of theoretical isotopologue masses for a natural-abundance formula.
pub trait IsotopePatternSource: Sync {
    /// Neutral masses of all isotopologues with probability at or above
    /// `threshold`, for a formula given as `(element, count)` pairs.
    fn isotopologue_masses(&self, formula: &[(String, u32)], threshold: f64) -> Vec<f64>;
}

/// Enumerates isotopologues from the embedded natural-abundance table.
#[derive(Debug, Default, Clone, Copy)]
pub struct NaturalAbundancePattern;

impl IsotopePatternSource for NaturalAbundancePattern {
    fn isotopologue_masses(&self, formula: &[(String, u32)], threshold: f64) -> Vec<f64> {
        enumerate_isotopologues(formula, threshold)
    }
}

struct HeavySite {
    atoms: u32,
    ratio: f64,
    delta_mass: f64,
}

fn binomial(n: u32, k: u32) -> f64 {
    let mut c = 1.0;
    for i in 1..=k {
        c *= (n - k + i) as f64 / i as f64;
    }
    c
}

/// Depth-first enumeration over heavy-isotope substitution counts. Each
/// heavy isotope of each element is treated as an independent binomial
/// against the base isotope, which is exact enough for threshold pruning.
fn enumerate_isotopologues(formula: &[(String, u32)], threshold: f64) -> Vec<f64> {
    let mut base_mass = 0.0;
    let mut base_prob = 1.0;
    let mut sites: Vec<HeavySite> = Vec::new();

    for (element, count) in formula {
        if *count == 0 {
            continue;
        }
        let dist = match isotopic_distribution(element) {
            Some(d) => d,
            None => return Vec::new(),
        };
        let (base_iso_mass, base_iso_prob) = dist
            .iter()
            .fold((0.0, 0.0), |acc, &(m, p)| if p > acc.1 { (m, p) } else { acc });
        base_mass += base_iso_mass * *count as f64;
        base_prob *= base_iso_prob.powi(*count as i32);
        for &(m, p) in dist {
            if m != base_iso_mass && p > 0.0 {
                sites.push(HeavySite {
                    atoms: *count,
                    ratio: p / base_iso_prob,
                    delta_mass: m - base_iso_mass,
                });
            }
        }
    }

    let mut out = Vec::new();
    let mut best = (base_mass, base_prob);
    if base_prob >= threshold {
        out.push(base_mass);
    }
    descend(&sites, 0, base_mass, base_prob, threshold, &mut out, &mut best);
    if out.is_empty() {
        // Large formulas can spread probability so thin that no single
        // isotopologue clears the threshold. Report the most probable one
        // so accuracy still has a reference peak.
        out.push(best.0);
    }
    out.sort_by(f64::total_cmp);
    out.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    out
}

fn descend(
    sites: &[HeavySite],
    idx: usize,
    mass: f64,
    prob: f64,
    threshold: f64,
    out: &mut Vec<f64>,
    best: &mut (f64, f64),
) {
    if idx >= sites.len() {
        return;
    }
    let site = &sites[idx];
    let mut term = prob;
    for k in 1..=site.atoms {
        term *= binomial(site.atoms, k) / binomial(site.atoms, k - 1) * site.ratio;
        let m = mass + site.delta_mass * k as f64;
        if term >= threshold {
            out.push(m);
            descend(sites, idx + 1, m, term, threshold, out, best);
            continue;
        }
        if term > best.1 {
            *best = (m, term);
        }
        // Terms grow with k until the mode of the binomial, so a
        // sub-threshold term ends the scan only once they are falling.
        if (site.atoms - k) as f64 * site.ratio <= (k + 1) as f64 {
            break;
        }
    }
    descend(sites, idx + 1, mass, prob, threshold, out, best);
}

fn labeled_segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})([A-Z][a-z]?)\((\d+)\)").unwrap())
}

fn plain_segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Z][a-z]?)\((-?\d+)\)").unwrap())
}

/// Splits a formula string into its natural-abundance part and the summed
/// mass of labeled-isotope segments such as `18O(1)`.
///
/// Returns `None` if a labeled segment names an isotope not in the table, in
/// which case the caller reports sentinel accuracy values.
pub fn split_labeled_formula(formula: &str) -> Option<(Vec<(String, u32)>, f64)> {
    let mut natural = formula.to_string();
    let mut labeled_mass = 0.0;
    for caps in labeled_segment_regex().captures_iter(formula) {
        let whole = caps.get(0)?;
        // Labeled segments only follow a closing parenthesis; a leading
        // digit sequence at the string start is not a label.
        if whole.start() == 0 || formula.as_bytes()[whole.start() - 1] != b')' {
            continue;
        }
        let nominal = &caps[1];
        let element = &caps[2];
        let count: u32 = caps[3].parse().ok()?;
        let mass = isotope_mass(&format!("{nominal}{element}"))?;
        labeled_mass += mass * count as f64;
        natural = natural.replace(whole.as_str(), "");
    }
    let mut parts = Vec::new();
    for caps in plain_segment_regex().captures_iter(&natural) {
        let count: i64 = caps[2].parse().ok()?;
        if count > 0 {
            parts.push((caps[1].to_string(), count as u32));
        }
    }
    Some((parts, labeled_mass))
}

/// Signed ppm error of `exp_mz` against the closest isotopologue of the
/// formula at the given charge. Ties between equally distant isotopologues
/// resolve to the lower-mass candidate.
pub fn closest_isotopologue_ppm(
    formula: &str,
    charge: i64,
    exp_mz: f64,
    source: &dyn IsotopePatternSource,
) -> Option<f64> {
    if charge <= 0 {
        return None;
    }
    let (natural, labeled_mass) = split_labeled_formula(formula)?;
    let masses = if natural.is_empty() {
        vec![labeled_mass]
    } else {
        source
            .isotopologue_masses(&natural, ISOTOPOLOGUE_THRESHOLD)
            .into_iter()
            .map(|m| m + labeled_mass)
            .collect()
    };
    let z = charge as f64;
    let mut best: Option<(f64, f64)> = None;
    for mass in masses {
        let mz = (mass + z * PROTON) / z;
        let dist = (exp_mz - mz).abs();
        // Candidates arrive in ascending mass order, so strict comparison
        // keeps the lower-mass isotopologue on ties.
        if best.map(|(d, _)| dist < d).unwrap_or(true) {
            best = Some((dist, mz));
        }
    }
    best.map(|(_, mz)| (exp_mz - mz) / mz * 1e6)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPattern(Vec<f64>);

    impl IsotopePatternSource for FixedPattern {
        fn isotopologue_masses(&self, _formula: &[(String, u32)], _threshold: f64) -> Vec<f64> {
            self.0.clone()
        }
    }

    #[test]
    fn test_enumeration_includes_heavy_carbon_peaks() {
        let formula = vec![("C".to_string(), 39), ("H".to_string(), 60)];
        let masses = enumerate_isotopologues(&formula, ISOTOPOLOGUE_THRESHOLD);
        let mono = 39.0 * 12.0 + 60.0 * 1.007_825_032_07;
        assert!((masses[0] - mono).abs() < 1e-6);
        // One and two 13C substitutions pass the 2% threshold for C39, a
        // third does not.
        let c13_shift = 13.003_354_837_8 - 12.0;
        assert!(masses.iter().any(|m| (m - (mono + c13_shift)).abs() < 1e-6));
        assert!(masses
            .iter()
            .any(|m| (m - (mono + 2.0 * c13_shift)).abs() < 1e-6));
        assert!(!masses
            .iter()
            .any(|m| (m - (mono + 3.0 * c13_shift)).abs() < 1e-6));
    }

    #[test]
    fn test_enumeration_climbs_past_subthreshold_base() {
        // For C600 the monoisotopic peak and the first few heavy peaks sit
        // below 2%, but peaks around the distribution mode (six to seven
        // 13C) do not. The scan must not stop at the first weak term.
        let formula = vec![("C".to_string(), 600)];
        let masses = enumerate_isotopologues(&formula, ISOTOPOLOGUE_THRESHOLD);
        assert!(masses.len() >= 5);
        let mono = 600.0 * 12.0;
        let c13_shift = 13.003_354_837_8 - 12.0;
        assert!(masses
            .iter()
            .any(|m| (m - (mono + 6.0 * c13_shift)).abs() < 1e-6));
        // The monoisotopic peak itself stays excluded.
        assert!(!masses.iter().any(|m| (m - mono).abs() < 1e-6));
    }

    #[test]
    fn test_enumeration_never_returns_empty_for_valid_formula() {
        // A very large peptide spreads probability so thin that no single
        // isotopologue reaches 2%; the most probable one is still reported.
        let formula = vec![
            ("C".to_string(), 1000),
            ("H".to_string(), 1600),
            ("N".to_string(), 270),
            ("O".to_string(), 300),
        ];
        let masses = enumerate_isotopologues(&formula, ISOTOPOLOGUE_THRESHOLD);
        assert!(!masses.is_empty());
    }

    #[test]
    fn test_split_labeled_formula() {
        let (natural, labeled) = split_labeled_formula("C(10)H(15)N(2)O(5)18O(1)").unwrap();
        assert_eq!(
            natural,
            vec![
                ("C".to_string(), 10),
                ("H".to_string(), 15),
                ("N".to_string(), 2),
                ("O".to_string(), 5),
            ]
        );
        assert!((labeled - 17.999_161_0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_isotope_label_is_none() {
        assert!(split_labeled_formula("C(3)O(1)19O(2)").is_none());
    }

    #[test]
    fn test_closest_picks_nearest_peak() {
        let source = FixedPattern(vec![100.0, 101.0, 102.0]);
        // exp sits 0.1 above the second peak at charge 1.
        let exp = (101.0 + PROTON) + 0.1;
        let ppm = closest_isotopologue_ppm("C(1)", 1, exp, &source).unwrap();
        let expected = 0.1 / (101.0 + PROTON) * 1e6;
        assert!((ppm - expected).abs() < 1e-6);
    }

    #[test]
    fn test_tie_resolves_to_lower_mass() {
        let source = FixedPattern(vec![100.0, 102.0]);
        let exp = 101.0 + PROTON;
        let ppm = closest_isotopologue_ppm("C(1)", 1, exp, &source).unwrap();
        assert!(ppm > 0.0, "lower-mass candidate gives a positive error");
    }
}
