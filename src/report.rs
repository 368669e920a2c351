use std::cmp::Ordering;
use std::num::NonZeroUsize;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::utils::is_missing_token;

/// Column the report is ordered by before upload
pub const DEFAULT_SORT_KEY: &str = "ACCOUNT NUMBER";

/// Rows per append call
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// Native type of a report column, inferred from its present values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    /// Integer if every present value parses as `i64`, float if every present
    /// value parses as `f64`, text otherwise. A column with no present values is text.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut kind: Option<ColumnKind> = None;

        for raw in values.into_iter().filter(|v| !is_missing_token(v)) {
            let trimmed = raw.trim();
            let value_kind = if trimmed.parse::<i64>().is_ok() {
                ColumnKind::Integer
            } else if trimmed.parse::<f64>().is_ok() {
                ColumnKind::Float
            } else {
                return ColumnKind::Text;
            };

            kind = Some(match (kind, value_kind) {
                (None, k) => k,
                (Some(ColumnKind::Integer), ColumnKind::Integer) => ColumnKind::Integer,
                _ => ColumnKind::Float,
            });
        }

        kind.unwrap_or(ColumnKind::Text)
    }
}

/// A single report cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Interpret a raw CSV field as a cell of the given column kind
    pub fn parse(raw: &str, kind: ColumnKind) -> Self {
        if is_missing_token(raw) {
            return Cell::Missing;
        }

        let trimmed = raw.trim();
        match kind {
            ColumnKind::Integer => trimmed
                .parse()
                .map(Cell::Integer)
                .unwrap_or_else(|_| Cell::Text(raw.to_string())),
            ColumnKind::Float => trimmed
                .parse()
                .map(Cell::Float)
                .unwrap_or_else(|_| Cell::Text(raw.to_string())),
            ColumnKind::Text => Cell::Text(raw.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// JSON value sent to the spreadsheet API
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Missing => Value::Null,
            Cell::Integer(n) => Value::from(*n),
            // Non-finite floats have no JSON number form
            Cell::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.to_string())),
            Cell::Text(s) => Value::String(s.clone()),
        }
    }

    /// Ascending order by native value; missing cells sort last
    fn sort_cmp(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Missing, Cell::Missing) => Ordering::Equal,
            (Cell::Missing, _) => Ordering::Greater,
            (_, Cell::Missing) => Ordering::Less,
            (Cell::Integer(a), Cell::Integer(b)) => a.cmp(b),
            (Cell::Float(a), Cell::Float(b)) => a.total_cmp(b),
            (Cell::Integer(a), Cell::Float(b)) => (*a as f64).total_cmp(b),
            (Cell::Float(a), Cell::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (a, b) => a.display_value().cmp(&b.display_value()),
        }
    }

    fn display_value(&self) -> String {
        match self {
            Cell::Missing => String::new(),
            Cell::Integer(n) => n.to_string(),
            Cell::Float(f) => f.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    cells: Vec<Cell>,
}

impl ReportRow {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// Cell values in column order, ready for an append request
    pub fn to_values(&self) -> Vec<Value> {
        self.cells.iter().map(Cell::to_json).collect()
    }
}

/// In-memory report: header, inferred column kinds, and rows in table order
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    columns: Vec<String>,
    kinds: Vec<ColumnKind>,
    rows: Vec<ReportRow>,
}

impl ReportTable {
    /// Build a table from a header and raw string records, inferring column kinds
    pub fn from_records(columns: Vec<String>, records: Vec<Vec<String>>) -> Result<Self, ReportError> {
        for (index, record) in records.iter().enumerate() {
            if record.len() != columns.len() {
                return Err(ReportError::RowWidth {
                    row: index + 1,
                    found: record.len(),
                    expected: columns.len(),
                });
            }
        }

        let kinds: Vec<ColumnKind> = (0..columns.len())
            .map(|col| ColumnKind::infer(records.iter().map(|r| r[col].as_str())))
            .collect();

        let rows = records
            .iter()
            .map(|record| {
                ReportRow::new(
                    record
                        .iter()
                        .zip(&kinds)
                        .map(|(raw, kind)| Cell::parse(raw, *kind))
                        .collect(),
                )
            })
            .collect();

        debug!(columns = columns.len(), ?kinds, "Inferred column kinds");

        Ok(Self {
            columns,
            kinds,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exact, case-sensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Stable ascending sort by the named column
    pub fn sort_by_column(&mut self, name: &str) -> Result<(), ReportError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| ReportError::ColumnNotFound(name.to_string()))?;

        self.rows
            .sort_by(|a, b| a.cells[index].sort_cmp(&b.cells[index]));
        Ok(())
    }

    /// Replace every missing cell with `placeholder`; returns how many were replaced
    pub fn fill_missing(&mut self, placeholder: &str) -> usize {
        let mut replaced = 0;
        for cell in self.rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
            if cell.is_missing() {
                *cell = Cell::Text(placeholder.to_string());
                replaced += 1;
            }
        }
        replaced
    }

    /// Sort by `sort_key`, then blank out missing cells
    pub fn normalize(&mut self, sort_key: &str) -> Result<usize, ReportError> {
        self.sort_by_column(sort_key)?;
        Ok(self.fill_missing(""))
    }

    /// Contiguous row slices of at most `size` rows, in table order
    pub fn batches(&self, size: NonZeroUsize) -> std::slice::Chunks<'_, ReportRow> {
        self.rows.chunks(size.get())
    }

    pub fn batch_count(&self, size: NonZeroUsize) -> usize {
        self.rows.len().div_ceil(size.get())
    }

    /// SHA-256 over the header and every cell, in table order
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for column in &self.columns {
            hasher.update(column.as_bytes());
            hasher.update([0x1f]);
        }
        for row in &self.rows {
            hasher.update([0x1e]);
            for cell in &row.cells {
                hasher.update(cell.to_json().to_string().as_bytes());
                hasher.update([0x1f]);
            }
        }
        hex::encode(hasher.finalize())
    }
}
