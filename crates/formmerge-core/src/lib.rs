//! formmerge-core: reconciles overlapping data-entry forms into merged output tables
//!
//! This library provides functionality to:
//! - Load the mapping and output-spec tables into a validated schema catalog
//! - Read source forms from CSV, located through a source index or a directory scan
//! - Normalize composite and split (day/month/year) dates across forms
//! - Pick one value per key and output column by form precedence and tolerance rules
//! - Record unresolved disagreements in a discrepancy ledger
//! - Export the merged tables and the ledger as CSV or JSON

pub mod config;
pub mod dates;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod output;
pub mod parser;
pub mod rules;
pub mod scanner;
pub mod schema;
pub mod table;

pub use config::{ReconcileOptions, RunConfig, RunReport};
pub use diagnostics::{Diagnostic, DiagnosticSink, ErrorLog, MemorySink, Severity};
pub use engine::{reconcile, select_winner, Candidate, KeyTuple, Outcome, OutputTable, Resolved, RunStats, Session};
pub use error::{Error, Result};
pub use ledger::{DiscrepancyLedger, DiscrepancyRecord};
pub use output::{assemble_ledger, assemble_tables, export, ExportFormat, ExportResult, RecordSet};
pub use parser::{parse_csv, parse_csv_str};
pub use rules::{ComparisonRule, DateUnit, RuleError};
pub use scanner::{load_sources, scan_directory, IndexEntry, SourceIndex, Sources};
pub use schema::{Catalog, DateMarker, FieldMapping, OutputColumnSpec};
pub use table::{CellValue, Column, Row, SourceTable};
