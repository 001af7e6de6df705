//! In-memory report table.
//!
//! A [`ReportTable`] is the concatenation of every CSV report downloaded by
//! one fetch. Columns are the union of the headers seen so far, in
//! first-seen order; cells a file did not provide are `None`. Rows are
//! appended in the order files are loaded and never deduplicated.
//!
//! ```rust
//! use report_chat_core::table::ReportTable;
//!
//! let mut table = ReportTable::from_csv(b"cancion,streams\nA,10\n").unwrap();
//! table.append(ReportTable::from_csv(b"cancion,pais\nB,ES\n").unwrap());
//!
//! assert_eq!(table.columns(), ["cancion", "streams", "pais"]);
//! assert_eq!(table.len(), 2);
//! assert_eq!(table.cell(1, "streams"), None);
//! ```

use thiserror::Error;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reasons a single CSV file cannot be turned into a table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("file has no header row")]
    MissingHeader,
    #[error("record {record} has {found} fields but the header declares {expected}")]
    RowTooLong {
        record: usize,
        found: usize,
        expected: usize,
    },
}

/// Rows of optional string cells under a shared, ordered set of columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl ReportTable {
    /// An empty table with no columns and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-delimited file whose first record is the header.
    ///
    /// Empty cells become `None`. Records shorter than the header are
    /// padded with `None`; longer records are rejected. Repeated header
    /// names are disambiguated with a `.N` suffix (`name`, `name.1`, ...).
    pub fn from_csv(bytes: &[u8]) -> Result<Self, TableError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let headers = reader.headers()?.clone();
        if headers.is_empty() || headers.iter().all(str::is_empty) {
            return Err(TableError::MissingHeader);
        }
        let columns = dedup_headers(headers.iter());
        let width = columns.len();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() > width {
                return Err(TableError::RowTooLong {
                    record: index + 1,
                    found: record.len(),
                    expected: width,
                });
            }
            let mut row: Vec<Option<String>> = record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                .collect();
            row.resize(width, None);
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// A table without rows is empty, even when it carries column names.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// The cell at `row` under `column`, or `None` when either is unknown
    /// or the cell is missing.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }

    /// Concatenate `other` below this table.
    ///
    /// Columns of `other` that this table lacks are added at the end and
    /// back-filled with `None` for the existing rows.
    pub fn append(&mut self, other: ReportTable) {
        let mut mapping = Vec::with_capacity(other.columns.len());
        for name in other.columns {
            let index = match self.column_index(&name) {
                Some(index) => index,
                None => {
                    self.columns.push(name);
                    self.columns.len() - 1
                }
            };
            mapping.push(index);
        }

        let width = self.columns.len();
        for row in &mut self.rows {
            row.resize(width, None);
        }

        for row in other.rows {
            let mut aligned = vec![None; width];
            for (cell, &index) in row.into_iter().zip(&mapping) {
                aligned[index] = cell;
            }
            self.rows.push(aligned);
        }
    }
}

fn dedup_headers<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for name in names {
        let mut candidate = name.to_string();
        let mut suffix = 1;
        while columns.contains(&candidate) {
            candidate = format!("{}.{}", name, suffix);
            suffix += 1;
        }
        columns.push(candidate);
    }
    columns
}
