//! In-memory result table with typed cells.

use std::io::Write;

use thiserror::Error;

/// Table construction and serialization failures.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("row has {got} cells, table has {expected} columns")]
    RowWidth { got: usize, expected: usize },
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One typed value in the unified table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Str(String),
    I64(i64),
    F64(f64),
    Bool(bool),
}

impl Cell {
    /// CSV rendering. Booleans serialize as `True`/`False`.
    pub fn render(&self) -> String {
        match self {
            Cell::Str(s) => s.clone(),
            Cell::I64(v) => v.to_string(),
            Cell::F64(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    format!("{v:.1}")
                } else {
                    v.to_string()
                }
            }
            Cell::Bool(true) => "True".to_string(),
            Cell::Bool(false) => "False".to_string(),
        }
    }
}

/// Column-ordered table of unified records.
#[derive(Debug, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Table {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                got: row.len(),
                expected: self.columns.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of the named column.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Removes rows that are exact duplicates of an earlier row, returning
    /// the number removed.
    pub fn drop_duplicate_rows(&mut self) -> usize {
        let mut seen = std::collections::HashSet::new();
        let before = self.rows.len();
        self.rows.retain(|row| {
            let key = row
                .iter()
                .map(Cell::render)
                .collect::<Vec<_>>()
                .join("\u{1f}");
            seen.insert(key)
        });
        before - self.rows.len()
    }

    /// Writes the table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), TableError> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(&self.columns)?;
        for row in &self.rows {
            out.write_record(row.iter().map(Cell::render))?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut t = Table::new(vec!["sequence".to_string(), "charge".to_string()]);
        t.push_row(vec![Cell::Str("PEPTIDE".to_string()), Cell::I64(2)])
            .unwrap();
        t.push_row(vec![Cell::Str("ELVISK".to_string()), Cell::I64(3)])
            .unwrap();
        t
    }

    #[test]
    fn test_row_width_enforced() {
        let mut t = sample();
        assert!(t.push_row(vec![Cell::I64(1)]).is_err());
    }

    #[test]
    fn test_drop_duplicate_rows() {
        let mut t = sample();
        t.push_row(vec![Cell::Str("PEPTIDE".to_string()), Cell::I64(2)])
            .unwrap();
        assert_eq!(t.drop_duplicate_rows(), 1);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_csv_rendering() {
        let mut t = Table::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        t.push_row(vec![Cell::F64(-1.0), Cell::Bool(true), Cell::F64(12.5)])
            .unwrap();
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "a,b,c\n-1.0,True,12.5\n");
    }
}
