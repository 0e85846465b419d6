//! Canonical modification-string normalization.

use std::collections::BTreeSet;

/// Normalizes a raw modification string to the canonical `Name:pos` form:
/// duplicates removed, entries sorted by position then name, separators
/// collapsed.
///
/// Position 0 marks the peptide N-terminus, internal residues are 1-based.
/// Tokens that do not end in `:<digits>` are dropped; names themselves may
/// contain colons (`Label:18O(1):7`).
pub fn normalize(raw: &str) -> String {
    let mut entries: BTreeSet<(u32, String)> = BTreeSet::new();
    for token in raw.split(';') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some((name, pos)) = token.rsplit_once(':') {
            if let Ok(pos) = pos.parse::<u32>() {
                if !name.is_empty() {
                    entries.insert((pos, name.to_string()));
                    continue;
                }
            }
        }
        log::debug!("dropping malformed modification token '{token}'");
    }
    entries
        .into_iter()
        .map(|(pos, name)| format!("{name}:{pos}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// 1-based positions of every residue of `sequence` that occurs in
/// `residues`. Used to expand fixed modifications over a sequence.
pub fn residue_offsets(sequence: &str, residues: &str) -> Vec<usize> {
    sequence
        .chars()
        .enumerate()
        .filter(|(_, c)| residues.contains(*c))
        .map(|(i, _)| i + 1)
        .collect()
}

/// Appends fixed-modification entries for every matching residue of
/// `sequence` to a raw modification string.
pub fn inject_fixed_mods(raw: &str, sequence: &str, fixed: &[(String, String)]) -> String {
    let mut out = raw.to_string();
    for (residues, name) in fixed {
        for pos in residue_offsets(sequence, residues) {
            if !out.is_empty() {
                out.push(';');
            }
            out.push_str(name);
            out.push(':');
            out.push_str(&pos.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sorts_by_position_then_name() {
        assert_eq!(
            normalize("Oxidation:7;Acetyl:0;Carbamidomethyl:3"),
            "Acetyl:0;Carbamidomethyl:3;Oxidation:7"
        );
        assert_eq!(normalize("Oxidation:2;Acetyl:2"), "Acetyl:2;Oxidation:2");
    }

    #[test]
    fn test_deduplicates_and_collapses_separators() {
        assert_eq!(normalize(";;Oxidation:3;;Oxidation:3;"), "Oxidation:3");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(";;"), "");
    }

    #[test]
    fn test_name_with_colon_sorts_on_trailing_position() {
        assert_eq!(
            normalize("Label:18O(1):7;Oxidation:2"),
            "Oxidation:2;Label:18O(1):7"
        );
    }

    #[test]
    fn test_malformed_tokens_dropped() {
        assert_eq!(normalize("Oxidation:x;Acetyl:0;justaname"), "Acetyl:0");
    }

    #[test]
    fn test_fixed_mod_injection() {
        let fixed = vec![("C".to_string(), "Carbamidomethyl".to_string())];
        assert_eq!(
            inject_fixed_mods("Oxidation:2", "PCEPTCIDE", &fixed),
            "Oxidation:2;Carbamidomethyl:2;Carbamidomethyl:6"
        );
        assert_eq!(
            inject_fixed_mods("", "PEPTIDE", &fixed),
            ""
        );
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(
            entries in proptest::collection::vec(
                ("[A-Za-z][A-Za-z0-9>-]{0,10}", 0u32..50),
                0..8,
            )
        ) {
            let raw = entries
                .iter()
                .map(|(name, pos)| format!("{name}:{pos}"))
                .collect::<Vec<_>>()
                .join(";");
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once);
        }
    }
}
