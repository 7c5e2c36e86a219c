//! Error types for formmerge-core
//!
//! Every variant here is fatal: it aborts the run before any output is written.
//! Recoverable conditions are reported through [`crate::diagnostics`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in formmerge-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or write a file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse CSV
    #[error("failed to parse CSV '{path}': {message}")]
    CsvParse { path: PathBuf, message: String },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A schema table lacks columns the catalog needs
    #[error("the {table} does not contain the required columns: {}", .missing.join(", "))]
    MissingColumns { table: String, missing: Vec<String> },

    /// A numeric schema field could not be coerced
    #[error("not all rows of the {table} have an integer '{column}' (row {row}: '{value}')")]
    NotAnInteger {
        table: String,
        column: String,
        row: usize,
        value: String,
    },

    /// Unknown value in the date_markers column
    #[error("unknown date marker '{marker}' for {table}.{column}")]
    UnknownDateMarker {
        table: String,
        column: String,
        marker: String,
    },

    /// Two display positions collide within one output table
    #[error("output table '{table}' uses display order {order} for both '{first}' and '{second}'")]
    DuplicateDisplayOrder {
        table: String,
        order: i64,
        first: String,
        second: String,
    },

    /// A form is mapped more than once onto the same output column
    #[error("form '{form}' is mapped more than once onto {table}.{column}")]
    DuplicateMapping {
        table: String,
        column: String,
        form: String,
    },

    /// A date marker is spread over several output columns
    #[error("the date marker '{marker}' in '{table}' has been assigned to both '{first}' and '{second}'")]
    DateMarkerConflict {
        table: String,
        marker: String,
        first: String,
        second: String,
    },

    /// Forms carrying split dates do not all carry day, month and year
    #[error(
        "forms with split dates in '{table}' must supply day, month and year \
         (day: {day:?}, month: {month:?}, year: {year:?})"
    )]
    IncompleteSplitDate {
        table: String,
        day: Vec<String>,
        month: Vec<String>,
        year: Vec<String>,
    },

    /// A declared output column has no mapping at all
    #[error("no corresponding input column for the output column {table}.{column}")]
    NoProvenance { table: String, column: String },

    /// A contributing form does not declare (or does not contain) a key column
    #[error("missing key column '{key}' in form '{form}' for output table '{table}'")]
    MissingKeyColumn {
        table: String,
        form: String,
        key: String,
    },

    /// The mapping references a form that was never loaded
    #[error("form '{form}' is referenced by output table '{table}' but was not loaded")]
    UnknownForm { table: String, form: String },

    /// The source index could not be interpreted
    #[error("invalid source index '{path}': {message}")]
    SourceIndex { path: PathBuf, message: String },

    /// A job file or option value is unusable
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
