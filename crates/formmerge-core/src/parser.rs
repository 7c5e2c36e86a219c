//! CSV parser for source forms and schema tables

use crate::error::{Error, Result};
use crate::table::{CellValue, Column, Row, SourceTable};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Parse a CSV file into a SourceTable named after the file stem
pub fn parse_csv<P: AsRef<Path>>(path: P) -> Result<SourceTable> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    parse_csv_as(path, name)
}

/// Parse a CSV file into a SourceTable registered under `name`
pub fn parse_csv_as<P: AsRef<Path>>(path: P, name: impl Into<String>) -> Result<SourceTable> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    read_table(BufReader::new(file), name.into(), path.to_path_buf())
}

/// Parse CSV from a string (useful for testing)
pub fn parse_csv_str(content: &str, source_name: &str) -> Result<SourceTable> {
    read_table(
        content.as_bytes(),
        source_name.to_string(),
        PathBuf::from(source_name),
    )
}

fn read_table<R: Read>(reader: R, name: String, path: PathBuf) -> Result<SourceTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // Allow varying number of fields
        .from_reader(reader);

    // Parse headers into columns
    let headers = csv_reader.headers().map_err(|e| Error::Csv {
        path: path.clone(),
        source: e,
    })?;

    let columns: Vec<Column> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| Column::new(name.trim().to_string(), i))
        .collect();

    if columns.is_empty() {
        return Err(Error::CsvParse {
            path,
            message: "no columns found in CSV".to_string(),
        });
    }

    let mut rows = Vec::new();
    for (row_idx, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| Error::Csv {
            path: path.clone(),
            source: e,
        })?;

        let mut cells: Vec<CellValue> = record.iter().map(CellValue::parse).collect();

        // Pad with absent cells if row is shorter than header
        while cells.len() < columns.len() {
            cells.push(CellValue::absent());
        }

        if cells.len() > columns.len() {
            warn!(
                "row {} in {} has more cells than columns, truncating",
                row_idx + 1,
                path.display()
            );
            cells.truncate(columns.len());
        }

        rows.push(Row::new(cells));
    }

    Ok(SourceTable {
        name,
        columns,
        rows,
        source_path: path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_csv() {
        let csv = "subject_id,visit,weight\n1001,1,70\n1002,1,81\n";
        let table = parse_csv_str(csv, "vitals").unwrap();

        assert_eq!(table.name, "vitals");
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.columns[0].name, "subject_id");
        assert_eq!(table.columns[2].name, "weight");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].cells[2].value(), Some("81"));
    }

    #[test]
    fn test_parse_with_absent_cells() {
        let csv = "id,a,b\n1,,-4\n2,nan,x\n";
        let table = parse_csv_str(csv, "form").unwrap();

        assert!(table.rows[0].cells[1].is_absent());
        assert!(table.rows[0].cells[2].is_absent());
        assert_eq!(table.rows[0].cells[2].raw(), "-4");
        assert!(table.rows[1].cells[1].is_absent());
        assert_eq!(table.rows[1].cells[2].value(), Some("x"));
    }

    #[test]
    fn test_parse_ragged_rows() {
        let csv = "id,a,b\n1\n2,x,y,z\n";
        let table = parse_csv_str(csv, "form").unwrap();

        assert_eq!(table.rows[0].cells.len(), 3);
        assert!(table.rows[0].cells[2].is_absent());
        assert_eq!(table.rows[1].cells.len(), 3);
        assert_eq!(table.rows[1].cells[2].value(), Some("y"));
    }

    #[test]
    fn test_parse_keeps_values_as_text() {
        let csv = "id,dose\n007,1.0\n";
        let table = parse_csv_str(csv, "form").unwrap();

        assert_eq!(table.rows[0].cells[0].value(), Some("007"));
        assert_eq!(table.rows[0].cells[1].value(), Some("1.0"));
    }

    #[test]
    fn test_parse_csv_missing_file() {
        let err = parse_csv("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
