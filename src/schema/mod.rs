//! Unified output schema: canonical columns, typed cells, CSV writing.

pub mod table;

pub use table::{Cell, Table};

/// Cell type of a canonical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Str,
    I64,
    F64,
    Bool,
}

impl Dtype {
    /// Sentinel used where a record carries no value for a column.
    pub fn sentinel(&self) -> Cell {
        match self {
            Dtype::Str => Cell::Str(String::new()),
            Dtype::I64 => Cell::I64(-1),
            Dtype::F64 => Cell::F64(-1.0),
            Dtype::Bool => Cell::Bool(false),
        }
    }
}

/// One canonical column with its declared type.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub dtype: Dtype,
}

const fn col(name: &'static str, dtype: Dtype) -> ColumnSpec {
    ColumnSpec { name, dtype }
}

/// Canonical identification columns in output order. Engine-specific
/// namespaced columns follow these, sorted by name.
pub const IDENT_COLUMNS: &[ColumnSpec] = &[
    col("spectrum_title", Dtype::Str),
    col("raw_data_location", Dtype::Str),
    col("spectrum_id", Dtype::I64),
    col("sequence", Dtype::Str),
    col("modifications", Dtype::Str),
    col("charge", Dtype::I64),
    col("protein_id", Dtype::Str),
    col("retention_time_seconds", Dtype::F64),
    col("exp_mz", Dtype::F64),
    col("calc_mz", Dtype::F64),
    col("ucalc_mz", Dtype::F64),
    col("ucalc_mass", Dtype::F64),
    col("accuracy_ppm", Dtype::F64),
    col("accuracy_ppm_C12", Dtype::F64),
    col("chemical_composition", Dtype::Str),
    col("sequence_start", Dtype::Str),
    col("sequence_stop", Dtype::Str),
    col("sequence_pre_aa", Dtype::Str),
    col("sequence_post_aa", Dtype::Str),
    col("enzn", Dtype::Bool),
    col("enzc", Dtype::Bool),
    col("missed_cleavages", Dtype::I64),
    col("rank", Dtype::I64),
    col("is_decoy", Dtype::Bool),
    col("is_immutable", Dtype::Bool),
    col("search_engine", Dtype::Str),
];

/// Canonical quantification columns in output order.
pub const QUANT_COLUMNS: &[ColumnSpec] = &[
    col("file_name", Dtype::Str),
    col("spectrum_id", Dtype::I64),
    col("linked_spectrum_id", Dtype::I64),
    col("trivial_name", Dtype::Str),
    col("chemical_composition", Dtype::Str),
    col("retention_time_seconds", Dtype::F64),
    col("charge", Dtype::I64),
    col("exp_mz", Dtype::F64),
    col("delta_mz", Dtype::F64),
    col("accuracy_ppm", Dtype::F64),
    col("accuracy_ppm_C12", Dtype::F64),
    col("quant_run_id", Dtype::Str),
    col("quant_value", Dtype::F64),
    col("quant_score", Dtype::F64),
    col("quant_group", Dtype::Str),
    col("label", Dtype::Str),
    col("ident_reference", Dtype::Str),
    col("fwhm", Dtype::F64),
    col("s2i", Dtype::F64),
    col("p2t", Dtype::F64),
];

/// Separator between an engine namespace and its column name.
pub const NAMESPACE_SEPARATOR: char = ':';
