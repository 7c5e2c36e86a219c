//! Output assembly and export
//!
//! Merged tables are projected onto their declared columns in display order
//! and written, one file per output table, next to the discrepancy ledger.

use crate::engine::{OutputTable, Outcome};
use crate::error::{Error, Result};
use crate::ledger::DiscrepancyLedger;
use crate::schema::Catalog;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// File stem of the exported ledger
pub const LEDGER_NAME: &str = "discrepancies";

/// A flat, ordered table ready to be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Supported export formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(Error::Config(format!(
                "unknown format '{}'. Supported formats: csv, json",
                other
            ))),
        }
    }
}

/// Files produced by [`export`]
#[derive(Debug, Clone, Default)]
pub struct ExportResult {
    pub files_written: Vec<PathBuf>,
    pub rows_written: usize,
}

/// Project one merged table onto its declared columns
pub fn assemble_table(catalog: &Catalog, table: &OutputTable) -> RecordSet {
    let headers: Vec<String> = catalog
        .columns_of(&table.name)
        .into_iter()
        .map(|spec| spec.output_column.clone())
        .collect();

    let rows = table
        .keys()
        .map(|key| headers.iter().map(|column| table.cell_text(key, column)).collect())
        .collect();

    RecordSet {
        name: table.name.clone(),
        headers,
        rows,
    }
}

/// Record sets for every output table, in catalog order.
/// Tables the run never reached are exported with headers only.
pub fn assemble_tables(outcome: &Outcome) -> Vec<RecordSet> {
    outcome
        .catalog
        .output_tables()
        .into_iter()
        .map(|name| match outcome.tables.get(name) {
            Some(table) => assemble_table(&outcome.catalog, table),
            None => RecordSet {
                name: name.to_string(),
                headers: outcome
                    .catalog
                    .columns_of(name)
                    .into_iter()
                    .map(|spec| spec.output_column.clone())
                    .collect(),
                rows: Vec::new(),
            },
        })
        .collect()
}

pub fn assemble_ledger(ledger: &DiscrepancyLedger) -> RecordSet {
    RecordSet {
        name: LEDGER_NAME.to_string(),
        headers: ledger.headers(),
        rows: ledger.rows(),
    }
}

/// Write one record set to `path`
pub fn write_record_set(records: &RecordSet, path: &Path, format: ExportFormat) -> Result<()> {
    match format {
        ExportFormat::Csv => {
            let csv_error = |source| Error::Csv {
                path: path.to_path_buf(),
                source,
            };
            let mut writer = csv::WriterBuilder::new()
                .from_path(path)
                .map_err(csv_error)?;
            writer.write_record(&records.headers).map_err(csv_error)?;
            for row in &records.rows {
                writer.write_record(row).map_err(csv_error)?;
            }
            writer.flush().map_err(|e| Error::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        ExportFormat::Json => {
            let file = File::create(path).map_err(|e| Error::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, records)?;
            writeln!(writer)?;
            writer.flush()?;
        }
    }
    Ok(())
}

/// Write every output table and the ledger into `dir`
pub fn export<P: AsRef<Path>>(outcome: &Outcome, dir: P, format: ExportFormat) -> Result<ExportResult> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| Error::FileWrite {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut result = ExportResult::default();
    let mut sets = assemble_tables(outcome);
    sets.push(assemble_ledger(&outcome.ledger));

    for records in &sets {
        let path = dir.join(format!("{}.{}", records.name, format.extension()));
        write_record_set(records, &path, format)?;
        info!("wrote {} rows to {}", records.rows.len(), path.display());
        result.rows_written += records.rows.len();
        result.files_written.push(path);
    }

    Ok(result)
}
