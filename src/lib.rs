//! # mzUnify - Unified Search Engine Output Tables
//!
//! `mzunify` converts the output of proteomics search engines and
//! quantification tools into one tabular schema, so downstream tooling can
//! treat every engine the same way.
//!
//! ## Supported Inputs
//!
//! - **Comet** mzIdentML
//! - **MS-GF+** mzIdentML
//! - **X!Tandem** XML
//! - **MSFragger** TSV
//! - **FlashLFQ** peak TSV (quantification)
//! - **TMT quantification** CSV
//!
//! ## What Unification Does
//!
//! Beyond renaming columns, the pipeline normalizes modification strings,
//! maps peptides back onto a FASTA database, joins retention times from a
//! spectrum lookup, recomputes theoretical masses from elemental
//! compositions, checks enzymatic cleavage, assigns per-spectrum ranks, and
//! flags decoy and immutable peptides. Engine-native scores survive under
//! namespaced columns such as `comet:xcorr`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use mzunify::params::UnifyParams;
//! use mzunify::unify::Unifier;
//!
//! let params = UnifyParams::from_file(Path::new("unify.toml"))?;
//! let unifier = Unifier::new(params)?;
//! let table = unifier.unify_path(Path::new("results.mzid"), None)?;
//! table.write_csv(std::io::stdout())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod chem;
pub mod engines;
pub mod meta;
pub mod mods;
pub mod params;
pub mod proteins;
pub mod schema;
pub mod unify;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::chem::{
        IsotopePatternSource, NaturalAbundancePattern, PROTON,
    };
    pub use crate::engines::{detect_format, EngineFormat, Extraction, ExtractorError};
    pub use crate::meta::RtLookup;
    pub use crate::mods::{BuiltinUnimod, ModificationLookup, UnimodSource};
    pub use crate::params::{EnzymeSpec, IntegrityPolicy, UnifyParams};
    pub use crate::proteins::{FastaMapper, PeptideMapper};
    pub use crate::schema::{Table, IDENT_COLUMNS, QUANT_COLUMNS};
    pub use crate::unify::{PsmRow, Unifier, UnifyError};
}
