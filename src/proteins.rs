//! Peptide-to-protein mapping against a target-decoy FASTA database.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Database loading failures.
#[derive(Debug, Error)]
pub enum ProteinError {
    #[error("failed to open database '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("I/O error reading database: {0}")]
    Io(#[from] std::io::Error),
    #[error("database contains no sequences")]
    Empty,
}

/// One occurrence of a peptide in a protein. Coordinates are 1-based and
/// inclusive; `pre` and `post` are the flanking residues, `-` at a protein
/// terminus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeptideMapping {
    pub protein_id: String,
    pub start: usize,
    pub stop: usize,
    pub pre: char,
    pub post: char,
}

/// Maps peptide sequences to their protein occurrences.
pub trait PeptideMapper: Sync {
    /// Every occurrence of every input peptide, keyed by peptide. Peptides
    /// absent from the database map to an empty list.
    fn map_peptides(&self, peptides: &[String]) -> HashMap<String, Vec<PeptideMapping>>;
}

/// [`PeptideMapper`] backed by a flat scan over FASTA entries.
#[derive(Debug)]
pub struct FastaMapper {
    entries: Vec<(String, String)>,
}

impl FastaMapper {
    pub fn from_path(path: &Path) -> Result<FastaMapper, ProteinError> {
        let file = File::open(path).map_err(|source| ProteinError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        FastaMapper::from_reader(BufReader::new(file))
    }

    /// Parses FASTA text. The protein id is the full header line without
    /// the leading `>`.
    pub fn from_reader<R: Read>(reader: R) -> Result<FastaMapper, ProteinError> {
        let mut entries: Vec<(String, String)> = Vec::new();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim_end();
            if let Some(header) = line.strip_prefix('>') {
                entries.push((header.trim().to_string(), String::new()));
            } else if let Some((_, seq)) = entries.last_mut() {
                seq.push_str(line.trim());
            }
        }
        if entries.is_empty() {
            return Err(ProteinError::Empty);
        }
        Ok(FastaMapper { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn occurrences(haystack: &str, needle: &str) -> Vec<usize> {
    // match_indices skips overlapping hits, scan manually.
    let mut out = Vec::new();
    if needle.is_empty() {
        return out;
    }
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        out.push(from + pos);
        from += pos + 1;
    }
    out
}

impl PeptideMapper for FastaMapper {
    fn map_peptides(&self, peptides: &[String]) -> HashMap<String, Vec<PeptideMapping>> {
        let mut result: HashMap<String, Vec<PeptideMapping>> = HashMap::new();
        for peptide in peptides {
            let hits = result.entry(peptide.clone()).or_default();
            for (protein_id, sequence) in &self.entries {
                for offset in occurrences(sequence, peptide) {
                    let stop = offset + peptide.chars().count();
                    let pre = if offset == 0 {
                        '-'
                    } else {
                        sequence[..offset].chars().next_back().unwrap_or('-')
                    };
                    let post = sequence[stop..].chars().next().unwrap_or('-');
                    hits.push(PeptideMapping {
                        protein_id: protein_id.clone(),
                        start: offset + 1,
                        stop,
                        pre,
                        post,
                    });
                }
            }
        }
        result
    }
}
