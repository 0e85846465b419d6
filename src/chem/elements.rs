//! Embedded element data: isotopic distributions, residue compositions.
//!
//! Masses are CODATA/AME monoisotopic values. The most abundant isotope of
//! each element is used as the monoisotopic mass for theoretical mass
//! calculation, matching the convention of the upstream isotope tables.

/// Monoisotopic mass of a proton in Da.
pub const PROTON: f64 = 1.007_276_466_77;

/// The twenty IUPAC one-letter amino acids plus selenocysteine.
pub const IUPAC_AAS: &str = "ACDEFGHIKLMNPQRSTUVWY";

/// Isotopic distribution per element: `(mass, natural abundance)` pairs.
const ISOTOPIC_DISTRIBUTIONS: &[(&str, &[(f64, f64)])] = &[
    ("H", &[(1.007_825_032_07, 0.999_885), (2.014_101_777_8, 0.000_115)]),
    ("C", &[(12.0, 0.9893), (13.003_354_837_8, 0.0107)]),
    ("N", &[(14.003_074_004_8, 0.996_36), (15.000_108_898_2, 0.003_64)]),
    (
        "O",
        &[
            (15.994_914_619_56, 0.997_57),
            (16.999_131_70, 0.000_38),
            (17.999_161_0, 0.002_05),
        ],
    ),
    ("P", &[(30.973_761_63, 1.0)]),
    (
        "S",
        &[
            (31.972_071_00, 0.9499),
            (32.971_458_76, 0.0075),
            (33.967_866_90, 0.0425),
            (35.967_080_76, 0.0001),
        ],
    ),
    (
        "Se",
        &[
            (73.922_476_4, 0.0089),
            (75.919_213_6, 0.0937),
            (76.919_914_0, 0.0763),
            (77.917_309_1, 0.2377),
            (79.916_521_3, 0.4961),
            (81.916_699_4, 0.0873),
        ],
    ),
    ("Na", &[(22.989_769_280_9, 1.0)]),
    ("F", &[(18.998_403_22, 1.0)]),
    ("Cl", &[(34.968_852_68, 0.7576), (36.965_902_59, 0.2424)]),
];

/// Free amino-acid elemental compositions (water included, as reported by
/// the upstream composition tables).
const AA_COMPOSITIONS: &[(char, &[(&str, i64)])] = &[
    ('A', &[("C", 3), ("H", 7), ("N", 1), ("O", 2)]),
    ('C', &[("C", 3), ("H", 7), ("N", 1), ("O", 2), ("S", 1)]),
    ('D', &[("C", 4), ("H", 7), ("N", 1), ("O", 4)]),
    ('E', &[("C", 5), ("H", 9), ("N", 1), ("O", 4)]),
    ('F', &[("C", 9), ("H", 11), ("N", 1), ("O", 2)]),
    ('G', &[("C", 2), ("H", 5), ("N", 1), ("O", 2)]),
    ('H', &[("C", 6), ("H", 9), ("N", 3), ("O", 2)]),
    ('I', &[("C", 6), ("H", 13), ("N", 1), ("O", 2)]),
    ('K', &[("C", 6), ("H", 14), ("N", 2), ("O", 2)]),
    ('L', &[("C", 6), ("H", 13), ("N", 1), ("O", 2)]),
    ('M', &[("C", 5), ("H", 11), ("N", 1), ("O", 2), ("S", 1)]),
    ('N', &[("C", 4), ("H", 8), ("N", 2), ("O", 3)]),
    ('P', &[("C", 5), ("H", 9), ("N", 1), ("O", 2)]),
    ('Q', &[("C", 5), ("H", 10), ("N", 2), ("O", 3)]),
    ('R', &[("C", 6), ("H", 14), ("N", 4), ("O", 2)]),
    ('S', &[("C", 3), ("H", 7), ("N", 1), ("O", 3)]),
    ('T', &[("C", 4), ("H", 9), ("N", 1), ("O", 3)]),
    ('U', &[("C", 3), ("H", 7), ("N", 1), ("O", 2), ("Se", 1)]),
    ('V', &[("C", 5), ("H", 11), ("N", 1), ("O", 2)]),
    ('W', &[("C", 11), ("H", 12), ("N", 2), ("O", 2)]),
    ('Y', &[("C", 9), ("H", 11), ("N", 1), ("O", 3)]),
];

/// Isotopic distribution of an element, or `None` for unknown symbols.
pub fn isotopic_distribution(symbol: &str) -> Option<&'static [(f64, f64)]> {
    ISOTOPIC_DISTRIBUTIONS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, d)| *d)
}

/// Mass of the most abundant isotope of an element.
///
/// For labeled element keys (`"18O"`, `"13C"`) the mass of the named isotope
/// is returned instead, resolved by its rounded nominal mass.
pub fn monoisotopic_mass(symbol: &str) -> Option<f64> {
    if let Some(dist) = isotopic_distribution(symbol) {
        return dist
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(m, _)| *m);
    }
    isotope_mass(symbol)
}

/// Mass of a specific isotope identified by `{roundedMass}{Element}`.
pub fn isotope_mass(labeled: &str) -> Option<f64> {
    let split = labeled.find(|c: char| c.is_ascii_alphabetic())?;
    let nominal: i64 = labeled[..split].parse().ok()?;
    let dist = isotopic_distribution(&labeled[split..])?;
    dist.iter()
        .find(|(m, _)| m.round() as i64 == nominal)
        .map(|(m, _)| *m)
}

/// Elemental composition of a free amino acid.
pub fn aa_composition(aa: char) -> Option<&'static [(&'static str, i64)]> {
    AA_COMPOSITIONS
        .iter()
        .find(|(c, _)| *c == aa)
        .map(|(_, comp)| *comp)
}
