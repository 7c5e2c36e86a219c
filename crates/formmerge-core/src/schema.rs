//! Schema catalog: the mapping table and the output spec
//!
//! The mapping table says, per output column, which forms supply it and how;
//! the output spec says, per output table, which columns are keys and in what
//! order columns are displayed. Both are validated up front and sorted so
//! every later pass iterates them in the same order.

use crate::error::{Error, Result};
use crate::parser::parse_csv_as;
use crate::rules::ComparisonRule;
use crate::table::{Row, SourceTable};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

const MAPPING_TABLE: &str = "input config file";
const OUTPUT_SPEC: &str = "output config file";

const MAPPING_COLUMNS: [&str; 7] = [
    "output_tn",
    "output_cn",
    "form_precedence",
    "input_form_name",
    "input_field_name",
    "date_markers",
    "comparison_type",
];

const SPEC_COLUMNS: [&str; 4] = ["output_tn", "output_cn", "key_column", "output_display_order"];

/// Which part of a date a mapped field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateMarker {
    Date,
    Day,
    Month,
    Year,
}

impl DateMarker {
    /// Parse a `date_markers` cell; blank means no marker
    pub fn parse(text: &str) -> std::result::Result<Option<Self>, String> {
        match text.trim() {
            "" => Ok(None),
            t if t.eq_ignore_ascii_case("nan") => Ok(None),
            "date" => Ok(Some(DateMarker::Date)),
            "day" => Ok(Some(DateMarker::Day)),
            "month" => Ok(Some(DateMarker::Month)),
            "year" => Ok(Some(DateMarker::Year)),
            other => Err(other.to_string()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DateMarker::Date => "date",
            DateMarker::Day => "day",
            DateMarker::Month => "month",
            DateMarker::Year => "year",
        }
    }
}

impl fmt::Display for DateMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the mapping table: a form supplying one output column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMapping {
    pub output_table: String,
    pub output_column: String,
    /// Smaller wins
    pub form_precedence: i64,
    pub input_form: String,
    pub input_field: String,
    pub date_marker: Option<DateMarker>,
    pub comparison_rule: ComparisonRule,
}

/// One row of the output spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputColumnSpec {
    pub output_table: String,
    pub output_column: String,
    pub is_key: bool,
    pub display_order: i64,
}

/// Validated, sorted mapping table and output spec
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    mappings: Vec<FieldMapping>,
    outputs: Vec<OutputColumnSpec>,
}

impl Catalog {
    /// Validate and sort already-built rows
    pub fn new(mut mappings: Vec<FieldMapping>, mut outputs: Vec<OutputColumnSpec>) -> Result<Self> {
        // Stable sorts keep file order within a column, which decides join order
        mappings.sort_by(|a, b| {
            (a.output_table.as_str(), a.output_column.as_str())
                .cmp(&(b.output_table.as_str(), b.output_column.as_str()))
        });
        outputs.sort_by(|a, b| {
            (a.output_table.as_str(), a.display_order).cmp(&(b.output_table.as_str(), b.display_order))
        });

        for pair in outputs.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.output_table == b.output_table && a.display_order == b.display_order {
                return Err(Error::DuplicateDisplayOrder {
                    table: a.output_table.clone(),
                    order: a.display_order,
                    first: a.output_column.clone(),
                    second: b.output_column.clone(),
                });
            }
        }

        let mut seen: HashSet<(&str, &str, &str)> = HashSet::new();
        for m in &mappings {
            let key = (m.output_table.as_str(), m.output_column.as_str(), m.input_form.as_str());
            if !seen.insert(key) {
                return Err(Error::DuplicateMapping {
                    table: m.output_table.clone(),
                    column: m.output_column.clone(),
                    form: m.input_form.clone(),
                });
            }
        }

        Ok(Self { mappings, outputs })
    }

    /// Build the catalog from the two loaded schema tables
    pub fn from_tables(mapping: &SourceTable, spec: &SourceTable) -> Result<Self> {
        let mappings = read_mappings(mapping)?;
        let outputs = read_outputs(spec)?;
        Self::new(mappings, outputs)
    }

    /// Load both schema tables from CSV files
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(mapping_path: P, spec_path: Q) -> Result<Self> {
        let mapping = parse_csv_as(mapping_path, MAPPING_TABLE)?;
        let spec = parse_csv_as(spec_path, OUTPUT_SPEC)?;
        Self::from_tables(&mapping, &spec)
    }

    /// All mappings, sorted by (table, column)
    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    /// All output columns, sorted by (table, display order)
    pub fn outputs(&self) -> &[OutputColumnSpec] {
        &self.outputs
    }

    /// Output table names in processing order
    pub fn output_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.outputs.iter().map(|o| o.output_table.as_str()).collect();
        tables.dedup();
        tables
    }

    /// Columns of one output table in display order
    pub fn columns_of(&self, table: &str) -> Vec<&OutputColumnSpec> {
        self.outputs.iter().filter(|o| o.output_table == table).collect()
    }

    /// Key columns of one output table in display order
    pub fn key_columns(&self, table: &str) -> Vec<String> {
        self.columns_of(table)
            .into_iter()
            .filter(|o| o.is_key)
            .map(|o| o.output_column.clone())
            .collect()
    }

    /// Mappings feeding one output column
    pub fn mappings_for_column(&self, table: &str, column: &str) -> Vec<&FieldMapping> {
        self.mappings
            .iter()
            .filter(|m| m.output_table == table && m.output_column == column)
            .collect()
    }

    /// Mappings feeding any column of one output table
    pub fn mappings_for_table(&self, table: &str) -> Vec<&FieldMapping> {
        self.mappings.iter().filter(|m| m.output_table == table).collect()
    }

    /// Forms contributing to one output table, in first-seen order
    pub fn forms_for(&self, table: &str) -> Vec<&str> {
        let mut forms: Vec<&str> = Vec::new();
        for m in self.mappings_for_table(table) {
            if !forms.contains(&m.input_form.as_str()) {
                forms.push(&m.input_form);
            }
        }
        forms
    }
}

fn require_columns(table: &SourceTable, label: &str, required: &[&str]) -> Result<Vec<usize>> {
    let missing: Vec<String> = required
        .iter()
        .filter(|c| !table.has_column(c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingColumns {
            table: label.to_string(),
            missing,
        });
    }
    Ok(required.iter().filter_map(|c| table.column_index(c)).collect())
}

fn parse_integer(raw: &str, label: &str, column: &str, row: usize) -> Result<i64> {
    raw.trim().parse::<i64>().map_err(|_| Error::NotAnInteger {
        table: label.to_string(),
        column: column.to_string(),
        row: row + 1,
        value: raw.to_string(),
    })
}

fn read_mappings(table: &SourceTable) -> Result<Vec<FieldMapping>> {
    let idx = require_columns(table, MAPPING_TABLE, &MAPPING_COLUMNS)?;
    let cell = |row: &Row, i: usize| {
        row.get(idx[i])
            .map(|c| c.raw().trim().to_string())
            .unwrap_or_default()
    };

    table
        .rows
        .iter()
        .enumerate()
        .map(|(n, row)| {
            let output_table = cell(row, 0);
            let output_column = cell(row, 1);
            let form_precedence = parse_integer(&cell(row, 2), MAPPING_TABLE, MAPPING_COLUMNS[2], n)?;
            let date_marker = DateMarker::parse(&cell(row, 5)).map_err(|marker| Error::UnknownDateMarker {
                table: output_table.clone(),
                column: output_column.clone(),
                marker,
            })?;

            Ok(FieldMapping {
                form_precedence,
                input_form: cell(row, 3),
                input_field: cell(row, 4),
                date_marker,
                comparison_rule: ComparisonRule::parse(&cell(row, 6)),
                output_table,
                output_column,
            })
        })
        .collect()
}

fn read_outputs(table: &SourceTable) -> Result<Vec<OutputColumnSpec>> {
    let idx = require_columns(table, OUTPUT_SPEC, &SPEC_COLUMNS)?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(n, row)| {
            let get = |i: usize| row.get(idx[i]);
            let text = |i: usize| get(i).map(|c| c.raw().trim().to_string()).unwrap_or_default();

            Ok(OutputColumnSpec {
                output_table: text(0),
                output_column: text(1),
                is_key: get(2).is_some_and(|c| !c.is_absent()),
                display_order: parse_integer(&text(3), OUTPUT_SPEC, SPEC_COLUMNS[3], n)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv_str;

    const MAPPING: &str = "\
output_tn,output_cn,form_precedence,input_form_name,input_field_name,date_markers,comparison_type
visits,weight,2,vitals_b,wt,,compare_value_int
visits,subject,1,vitals_a,subj,,
visits,weight,1,vitals_a,weight_kg,,compare_value_int
visits,subject,1,vitals_b,id,,
";

    const SPEC: &str = "\
output_tn,output_cn,key_column,output_display_order
visits,weight,,2
visits,subject,subject,1
";

    fn catalog() -> Catalog {
        let mapping = parse_csv_str(MAPPING, "mapping").unwrap();
        let spec = parse_csv_str(SPEC, "spec").unwrap();
        Catalog::from_tables(&mapping, &spec).unwrap()
    }

    fn mapping(table: &str, column: &str, form: &str) -> FieldMapping {
        FieldMapping {
            output_table: table.to_string(),
            output_column: column.to_string(),
            form_precedence: 1,
            input_form: form.to_string(),
            input_field: column.to_string(),
            date_marker: None,
            comparison_rule: ComparisonRule::Strict,
        }
    }

    #[test]
    fn test_mappings_sorted_by_table_and_column() {
        let catalog = catalog();
        let columns: Vec<&str> = catalog.mappings().iter().map(|m| m.output_column.as_str()).collect();
        assert_eq!(columns, vec!["subject", "subject", "weight", "weight"]);

        // file order is kept within a column
        let weight = catalog.mappings_for_column("visits", "weight");
        assert_eq!(weight[0].input_form, "vitals_b");
        assert_eq!(weight[0].form_precedence, 2);
        assert_eq!(weight[0].comparison_rule, ComparisonRule::NumericEqual);
        assert_eq!(weight[1].input_form, "vitals_a");
    }

    #[test]
    fn test_outputs_sorted_by_display_order() {
        let catalog = catalog();
        let columns: Vec<&str> = catalog
            .columns_of("visits")
            .iter()
            .map(|o| o.output_column.as_str())
            .collect();
        assert_eq!(columns, vec!["subject", "weight"]);
        assert_eq!(catalog.key_columns("visits"), vec!["subject".to_string()]);
        assert_eq!(catalog.output_tables(), vec!["visits"]);
    }

    #[test]
    fn test_forms_for_table_in_first_seen_order() {
        let catalog = catalog();
        assert_eq!(catalog.forms_for("visits"), vec!["vitals_a", "vitals_b"]);
        assert_eq!(catalog.mappings_for_table("visits").len(), 4);
        assert!(catalog.forms_for("other").is_empty());
    }

    #[test]
    fn test_missing_required_columns() {
        let mapping = parse_csv_str("output_tn,output_cn,input_form_name\nt,c,f\n", "mapping").unwrap();
        let spec = parse_csv_str(SPEC, "spec").unwrap();
        let err = Catalog::from_tables(&mapping, &spec).unwrap_err();

        match err {
            Error::MissingColumns { missing, .. } => {
                assert!(missing.contains(&"form_precedence".to_string()));
                assert!(missing.contains(&"comparison_type".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_precedence_is_fatal() {
        let text = MAPPING.replace("visits,weight,2,", "visits,weight,,");
        let mapping = parse_csv_str(&text, "mapping").unwrap();
        let spec = parse_csv_str(SPEC, "spec").unwrap();
        let err = Catalog::from_tables(&mapping, &spec).unwrap_err();
        assert!(matches!(err, Error::NotAnInteger { ref column, .. } if column == "form_precedence"));
    }

    #[test]
    fn test_non_numeric_display_order_is_fatal() {
        let mapping = parse_csv_str(MAPPING, "mapping").unwrap();
        let spec = parse_csv_str(&SPEC.replace(",,2", ",,second"), "spec").unwrap();
        let err = Catalog::from_tables(&mapping, &spec).unwrap_err();
        assert!(matches!(err, Error::NotAnInteger { ref column, .. } if column == "output_display_order"));
    }

    #[test]
    fn test_duplicate_display_order_is_fatal() {
        let outputs = vec![
            OutputColumnSpec {
                output_table: "t".to_string(),
                output_column: "a".to_string(),
                is_key: true,
                display_order: 1,
            },
            OutputColumnSpec {
                output_table: "t".to_string(),
                output_column: "b".to_string(),
                is_key: false,
                display_order: 1,
            },
        ];
        let err = Catalog::new(vec![], outputs).unwrap_err();
        assert!(matches!(err, Error::DuplicateDisplayOrder { order: 1, .. }));
    }

    #[test]
    fn test_duplicate_form_mapping_is_fatal() {
        let mappings = vec![mapping("t", "c", "f"), mapping("t", "c", "f")];
        let err = Catalog::new(mappings, vec![]).unwrap_err();
        assert!(matches!(err, Error::DuplicateMapping { ref form, .. } if form == "f"));
    }

    #[test]
    fn test_unknown_date_marker_is_fatal() {
        let text = MAPPING.replace("wt,,", "wt,week,");
        let mapping = parse_csv_str(&text, "mapping").unwrap();
        let spec = parse_csv_str(SPEC, "spec").unwrap();
        let err = Catalog::from_tables(&mapping, &spec).unwrap_err();
        assert!(matches!(err, Error::UnknownDateMarker { ref marker, .. } if marker == "week"));
    }

    #[test]
    fn test_date_marker_parse() {
        assert_eq!(DateMarker::parse(""), Ok(None));
        assert_eq!(DateMarker::parse("nan"), Ok(None));
        assert_eq!(DateMarker::parse("day"), Ok(Some(DateMarker::Day)));
        assert_eq!(DateMarker::parse(" year "), Ok(Some(DateMarker::Year)));
        assert!(DateMarker::parse("weekday").is_err());
    }
}
