//! Schema enforcement: canonical column order, type casting, sentinels.

use std::collections::BTreeSet;

use crate::engines::RawRecord;
use crate::schema::{table::TableError, Cell, ColumnSpec, Dtype, Table, NAMESPACE_SEPARATOR};
use crate::unify::PsmRow;

/// Casts an engine-native string to a declared cell type. Unparseable or
/// missing values become the type's sentinel.
pub fn cast_value(value: Option<&str>, dtype: Dtype) -> Cell {
    let value = match value {
        Some(v) if !v.is_empty() => v,
        _ => return dtype.sentinel(),
    };
    match dtype {
        Dtype::Str => Cell::Str(value.to_string()),
        Dtype::I64 => value
            .parse::<i64>()
            .map(Cell::I64)
            .or_else(|_| value.parse::<f64>().map(|f| Cell::I64(f as i64)))
            .unwrap_or_else(|_| dtype.sentinel()),
        Dtype::F64 => value
            .parse::<f64>()
            .map(Cell::F64)
            .unwrap_or_else(|_| dtype.sentinel()),
        Dtype::Bool => Cell::Bool(matches!(value, "true" | "True" | "1")),
    }
}

/// Extra columns appearing in records, split into the namespaced ones that
/// survive and the unmapped ones that are dropped with a warning.
fn partition_extras(
    keys: BTreeSet<String>,
    mapped_columns: &BTreeSet<String>,
    canonical: &[ColumnSpec],
) -> Vec<String> {
    let mut kept = Vec::new();
    for key in keys {
        if canonical.iter().any(|c| c.name == key) {
            continue;
        }
        if key.contains(NAMESPACE_SEPARATOR) && mapped_columns.contains(&key) {
            kept.push(key);
        } else {
            log::warn!("dropping unmapped column '{key}'");
        }
    }
    kept
}

/// Builds the final identification table: canonical columns in order, then
/// namespaced engine columns sorted by name, duplicates removed.
pub fn ident_table(
    rows: Vec<PsmRow>,
    mapped_columns: &BTreeSet<String>,
) -> Result<Table, TableError> {
    let canonical = crate::schema::IDENT_COLUMNS;
    let extra_keys: BTreeSet<String> = rows
        .iter()
        .flat_map(|r| r.extras.keys().cloned())
        .collect();
    let extras = partition_extras(extra_keys, mapped_columns, canonical);

    let mut columns: Vec<String> = canonical.iter().map(|c| c.name.to_string()).collect();
    columns.extend(extras.iter().cloned());
    let mut table = Table::new(columns);

    for row in &rows {
        let mut cells = Vec::with_capacity(canonical.len() + extras.len());
        for spec in canonical {
            cells.push(ident_cell(row, spec));
        }
        for key in &extras {
            cells.push(cast_value(row.extras.get(key).map(String::as_str), Dtype::Str));
        }
        table.push_row(cells)?;
    }
    let dropped = table.drop_duplicate_rows();
    if dropped > 0 {
        log::warn!("dropped {dropped} duplicate rows during schema enforcement");
    }
    Ok(table)
}

fn ident_cell(row: &PsmRow, spec: &ColumnSpec) -> Cell {
    let sentinel = || spec.dtype.sentinel();
    match spec.name {
        "spectrum_title" => row
            .spectrum_title
            .clone()
            .map(Cell::Str)
            .unwrap_or_else(sentinel),
        "raw_data_location" => row
            .raw_data_location
            .clone()
            .map(Cell::Str)
            .unwrap_or_else(sentinel),
        "spectrum_id" => row.spectrum_id.map(Cell::I64).unwrap_or_else(sentinel),
        "sequence" => Cell::Str(row.sequence.clone()),
        "modifications" => Cell::Str(row.modifications.clone()),
        "charge" => row.charge.map(Cell::I64).unwrap_or_else(sentinel),
        "protein_id" => row
            .protein_id
            .clone()
            .map(Cell::Str)
            .unwrap_or_else(sentinel),
        "retention_time_seconds" => row
            .retention_time_seconds
            .map(Cell::F64)
            .unwrap_or_else(sentinel),
        "exp_mz" => row.exp_mz.map(Cell::F64).unwrap_or_else(sentinel),
        "calc_mz" => row.calc_mz.map(Cell::F64).unwrap_or_else(sentinel),
        "ucalc_mz" => row.ucalc_mz.map(Cell::F64).unwrap_or_else(sentinel),
        "ucalc_mass" => row.ucalc_mass.map(Cell::F64).unwrap_or_else(sentinel),
        "accuracy_ppm" => row.accuracy_ppm.map(Cell::F64).unwrap_or_else(sentinel),
        "accuracy_ppm_C12" => row.accuracy_ppm_c12.map(Cell::F64).unwrap_or_else(sentinel),
        "chemical_composition" => row
            .chemical_composition
            .clone()
            .map(Cell::Str)
            .unwrap_or_else(sentinel),
        "sequence_start" => row
            .sequence_start
            .clone()
            .map(Cell::Str)
            .unwrap_or_else(sentinel),
        "sequence_stop" => row
            .sequence_stop
            .clone()
            .map(Cell::Str)
            .unwrap_or_else(sentinel),
        "sequence_pre_aa" => row
            .sequence_pre_aa
            .clone()
            .map(Cell::Str)
            .unwrap_or_else(sentinel),
        "sequence_post_aa" => row
            .sequence_post_aa
            .clone()
            .map(Cell::Str)
            .unwrap_or_else(sentinel),
        "enzn" => Cell::Bool(row.enzn),
        "enzc" => Cell::Bool(row.enzc),
        "missed_cleavages" => row
            .missed_cleavages
            .map(Cell::I64)
            .unwrap_or_else(sentinel),
        "rank" => row.rank.map(Cell::I64).unwrap_or_else(sentinel),
        "is_decoy" => Cell::Bool(row.is_decoy),
        "is_immutable" => Cell::Bool(row.is_immutable),
        "search_engine" => Cell::Str(row.search_engine.clone()),
        other => {
            debug_assert!(false, "unhandled canonical column {other}");
            sentinel()
        }
    }
}

/// Builds the final quantification table from flat records.
pub fn quant_table(
    records: Vec<RawRecord>,
    mapped_columns: &BTreeSet<String>,
) -> Result<Table, TableError> {
    let canonical = crate::schema::QUANT_COLUMNS;
    let extra_keys: BTreeSet<String> = records
        .iter()
        .flat_map(|r| r.keys())
        .filter(|k| !canonical.iter().any(|c| c.name == k.as_str()))
        .cloned()
        .collect();
    let extras = partition_extras(extra_keys, mapped_columns, canonical);

    let mut columns: Vec<String> = canonical.iter().map(|c| c.name.to_string()).collect();
    columns.extend(extras.iter().cloned());
    let mut table = Table::new(columns);

    for record in &records {
        let mut cells = Vec::with_capacity(canonical.len() + extras.len());
        for spec in canonical {
            cells.push(cast_value(record.get(spec.name).map(String::as_str), spec.dtype));
        }
        for key in &extras {
            cells.push(cast_value(record.get(key).map(String::as_str), Dtype::Str));
        }
        table.push_row(cells)?;
    }
    let dropped = table.drop_duplicate_rows();
    if dropped > 0 {
        log::warn!("dropped {dropped} duplicate rows during schema enforcement");
    }
    Ok(table)
}
