//! Core table types for source forms

use std::path::PathBuf;

/// Text of the "not collected" code some forms use instead of a blank cell
pub const NOT_COLLECTED: &str = "-4";

/// A parsed table from a single source form
#[derive(Debug, Clone)]
pub struct SourceTable {
    /// Form id the table was loaded under
    pub name: String,
    /// Column definitions
    pub columns: Vec<Column>,
    /// Row data
    pub rows: Vec<Row>,
    /// Source file path
    pub source_path: PathBuf,
}

impl SourceTable {
    /// Create a new empty table
    pub fn new(name: impl Into<String>, source_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            source_path,
        }
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.find_column(name).map(|c| c.index)
    }

    /// Check whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    /// Iterate the values of one column, top to bottom
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows.iter().map(move |r| r.get(index).unwrap_or(&ABSENT))
    }

    /// Append a column; `values` must hold one cell per row.
    ///
    /// Rows are never reordered or removed, so values line up with
    /// `self.rows` by position. Returns the new column's index.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<CellValue>) -> usize {
        debug_assert_eq!(values.len(), self.rows.len());
        let index = self.columns.len();
        self.columns.push(Column::new(name.into(), index));
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.cells.push(values.next().unwrap_or_else(CellValue::absent));
        }
        index
    }
}

static ABSENT: CellValue = CellValue::Absent(String::new());

/// A column definition
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name as it appears in the header
    pub name: String,
    /// Column index (0-based)
    pub index: usize,
}

impl Column {
    /// Create a new column
    pub fn new(name: String, index: usize) -> Self {
        Self { name, index }
    }
}

/// A row of data
#[derive(Debug, Clone)]
pub struct Row {
    /// Cell values for each column
    pub cells: Vec<CellValue>,
}

impl Row {
    /// Create a new row
    pub fn new(cells: Vec<CellValue>) -> Self {
        Self { cells }
    }

    /// Get a cell value by column index
    pub fn get(&self, index: usize) -> Option<&CellValue> {
        self.cells.get(index)
    }
}

/// A collected value, or the lack of one.
///
/// Absence is decided once, at ingestion. The raw text is kept either
/// way because the discrepancy ledger reports values as the form had them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    /// A value the form actually collected
    Present(String),
    /// Blank, `nan` or the not-collected code
    Absent(String),
}

impl CellValue {
    /// Classify raw text from a source file
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();

        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") || trimmed == NOT_COLLECTED {
            return CellValue::Absent(s.to_string());
        }

        CellValue::Present(s.to_string())
    }

    /// An absent value with no raw text
    pub fn absent() -> Self {
        CellValue::Absent(String::new())
    }

    /// Check if the cell carries no data
    pub fn is_absent(&self) -> bool {
        matches!(self, CellValue::Absent(_))
    }

    /// The collected value, if any
    pub fn value(&self) -> Option<&str> {
        match self {
            CellValue::Present(s) => Some(s),
            CellValue::Absent(_) => None,
        }
    }

    /// The text exactly as read
    pub fn raw(&self) -> &str {
        match self {
            CellValue::Present(s) | CellValue::Absent(s) => s,
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw())
    }
}
