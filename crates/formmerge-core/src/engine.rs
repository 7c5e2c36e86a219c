//! Reconciliation engine: builds merged output tables from the source forms
//!
//! For each output table, in catalog order:
//! 1. key columns are resolved for every contributing form
//! 2. date representations are normalized
//! 3. every non-key column is reconciled in display order: each form's values
//!    are joined on the key tuple, a winner is picked per key by precedence and
//!    tolerance rule, and unresolved ties go to the discrepancy ledger

use crate::config::ReconcileOptions;
use crate::dates::{normalize_dates, split_date, TableDates};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{Error, Result};
use crate::ledger::{DiscrepancyLedger, DiscrepancyRecord};
use crate::rules::{ComparisonRule, RuleError};
use crate::scanner::Sources;
use crate::schema::{Catalog, DateMarker, FieldMapping, OutputColumnSpec};
use crate::table::CellValue;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Output text for a key no form had a value for
pub const NO_DATA: &str = "nan";

/// Output text for a key whose sources disagree
pub const DISCREPANCY: &str = "discrepancy";

/// Ordered key-column values identifying one entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyTuple(pub Vec<String>);

impl KeyTuple {
    pub fn values(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for KeyTuple {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        KeyTuple(iter.into_iter().map(Into::into).collect())
    }
}

/// The reconciled value of one output cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// The winning value
    Value(String),
    /// No contributing form had a value
    NoData,
    /// Equal-precedence forms disagreed beyond the column's tolerance
    Discrepancy,
}

impl Resolved {
    pub fn as_str(&self) -> &str {
        match self {
            Resolved::Value(v) => v,
            Resolved::NoData => NO_DATA,
            Resolved::Discrepancy => DISCREPANCY,
        }
    }

    pub fn is_discrepancy(&self) -> bool {
        matches!(self, Resolved::Discrepancy)
    }
}

impl std::fmt::Display for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A merged output table, grown one column at a time
#[derive(Debug, Clone)]
pub struct OutputTable {
    pub name: String,
    pub key_columns: Vec<String>,
    /// Non-key columns in the order they were merged
    pub columns: Vec<String>,
    /// Using BTreeMap for deterministic ordering
    rows: BTreeMap<KeyTuple, HashMap<String, Resolved>>,
}

impl OutputTable {
    /// Create an empty table with only its key columns
    pub fn new(name: impl Into<String>, key_columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            key_columns,
            columns: Vec::new(),
            rows: BTreeMap::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Key tuples in row order
    pub fn keys(&self) -> impl Iterator<Item = &KeyTuple> {
        self.rows.keys()
    }

    pub fn get(&self, key: &KeyTuple, column: &str) -> Option<&Resolved> {
        self.rows.get(key).and_then(|cells| cells.get(column))
    }

    /// Outer-join a column of values onto the table
    pub fn merge_column<I>(&mut self, column: &str, values: I)
    where
        I: IntoIterator<Item = (KeyTuple, Resolved)>,
    {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
        for (key, value) in values {
            self.rows
                .entry(key)
                .or_default()
                .insert(column.to_string(), value);
        }
    }

    /// Cell text for export: key values, resolved values, or empty
    pub fn cell_text(&self, key: &KeyTuple, column: &str) -> String {
        if let Some(pos) = self.key_columns.iter().position(|k| k == column) {
            return key.0.get(pos).cloned().unwrap_or_default();
        }
        self.get(key, column)
            .map(|r| r.as_str().to_string())
            .unwrap_or_default()
    }
}

/// One form's value for one key, ready for winner selection
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub form: &'a str,
    pub precedence: i64,
    pub value: Option<&'a str>,
}

/// Outcome of winner selection for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub resolved: Resolved,
    /// Rule evaluations that failed; each counted as a disagreement
    pub rule_errors: Vec<RuleError>,
}

/// Pick the value for one key from the candidates, in join order.
///
/// The first present value wins provisionally. A later value with a
/// strictly smaller precedence replaces it and clears any disagreement
/// seen so far. A later value with the same precedence that differs and
/// is not tolerated by `rule` marks the key as a discrepancy without
/// changing the provisional winner.
pub fn select_winner(candidates: &[Candidate<'_>], rule: &ComparisonRule, symmetric: bool) -> Selection {
    let mut present = candidates
        .iter()
        .filter_map(|c| c.value.map(|v| (c.precedence, v)));
    let mut rule_errors = Vec::new();

    let Some((mut best, mut winner)) = present.next() else {
        return Selection {
            resolved: Resolved::NoData,
            rule_errors,
        };
    };

    let mut disputed = false;
    for (precedence, value) in present {
        if precedence < best {
            best = precedence;
            winner = value;
            disputed = false;
        } else if precedence == best && value != winner {
            match rule.tolerates(value, winner, symmetric) {
                Ok(true) => {}
                Ok(false) => disputed = true,
                Err(e) => {
                    rule_errors.push(e);
                    disputed = true;
                }
            }
        }
    }

    let resolved = if disputed {
        Resolved::Discrepancy
    } else {
        Resolved::Value(winner.to_string())
    };
    Selection { resolved, rule_errors }
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub tables: usize,
    pub columns_reconciled: usize,
    pub columns_skipped: usize,
    pub discrepancies: usize,
}

/// Everything a finished session produced
#[derive(Debug, Clone)]
pub struct Outcome {
    pub catalog: Catalog,
    /// Output tables keyed by name
    pub tables: BTreeMap<String, OutputTable>,
    pub ledger: DiscrepancyLedger,
    pub stats: RunStats,
}

/// State of one reconciliation run
pub struct Session {
    catalog: Catalog,
    sources: Sources,
    options: ReconcileOptions,
    tables: BTreeMap<String, OutputTable>,
    ledger: DiscrepancyLedger,
    stats: RunStats,
}

/// A form feeding one output column
#[derive(Debug, Clone)]
struct Contributor<'a> {
    form: &'a str,
    precedence: i64,
    field: &'a str,
}

impl Session {
    pub fn new(catalog: Catalog, sources: Sources, options: ReconcileOptions) -> Self {
        Self {
            catalog,
            sources,
            options,
            tables: BTreeMap::new(),
            ledger: DiscrepancyLedger::new(),
            stats: RunStats::default(),
        }
    }

    /// Source forms, including fields added by date normalization
    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    /// Reconcile every output table in catalog order
    pub fn run(&mut self, sink: &mut dyn DiagnosticSink) -> Result<()> {
        let tables: Vec<String> = self
            .catalog
            .output_tables()
            .into_iter()
            .map(str::to_string)
            .collect();
        for table in &tables {
            self.reconcile_table(table, sink)?;
        }
        Ok(())
    }

    /// Reconcile one output table
    pub fn reconcile_table(&mut self, table: &str, sink: &mut dyn DiagnosticSink) -> Result<()> {
        info!("creating output table '{}'", table);
        let keys = self.catalog.key_columns(table);
        let key_fields = align_keys(&self.catalog, table, &keys, &self.sources)?;
        let dates = normalize_dates(&self.catalog, table, &mut self.sources, sink)?;
        self.ledger.add_key_columns(&keys);

        let mut output = OutputTable::new(table, keys.clone());
        let pass = TablePass {
            catalog: &self.catalog,
            sources: &self.sources,
            options: &self.options,
            table,
            keys: &keys,
            key_fields: &key_fields,
            dates: &dates,
        };

        for spec in self.catalog.columns_of(table) {
            if spec.is_key {
                continue;
            }
            if pass.reconcile_column(spec, &mut output, &mut self.ledger, sink)? {
                self.stats.columns_reconciled += 1;
            } else {
                self.stats.columns_skipped += 1;
            }
        }

        info!(
            "output table '{}': {} rows, {} columns",
            table,
            output.row_count(),
            output.columns.len() + output.key_columns.len()
        );
        self.stats.tables += 1;
        self.tables.insert(table.to_string(), output);
        Ok(())
    }

    pub fn finish(self) -> Outcome {
        let mut stats = self.stats;
        stats.discrepancies = self.ledger.len();
        Outcome {
            catalog: self.catalog,
            tables: self.tables,
            ledger: self.ledger,
            stats,
        }
    }
}

/// Run a whole reconciliation
pub fn reconcile(
    catalog: Catalog,
    sources: Sources,
    options: ReconcileOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<Outcome> {
    let mut session = Session::new(catalog, sources, options);
    session.run(sink)?;
    Ok(session.finish())
}

/// Column indices of the key fields, per contributing form.
///
/// Every form feeding the table must map and contain every key column.
fn align_keys(
    catalog: &Catalog,
    table: &str,
    keys: &[String],
    sources: &Sources,
) -> Result<HashMap<String, Vec<usize>>> {
    let mut aligned = HashMap::new();

    for form in catalog.forms_for(table) {
        let source = sources.get(form).ok_or_else(|| Error::UnknownForm {
            table: table.to_string(),
            form: form.to_string(),
        })?;
        let missing = |key: &str| Error::MissingKeyColumn {
            table: table.to_string(),
            form: form.to_string(),
            key: key.to_string(),
        };

        let mut indices = Vec::with_capacity(keys.len());
        for key in keys {
            let mapping = catalog
                .mappings_for_column(table, key)
                .into_iter()
                .find(|m| m.input_form == form)
                .ok_or_else(|| missing(key))?;
            let index = source
                .column_index(&mapping.input_field)
                .ok_or_else(|| missing(key))?;
            indices.push(index);
        }
        aligned.insert(form.to_string(), indices);
    }

    Ok(aligned)
}

/// Read-only context for reconciling the columns of one output table
struct TablePass<'a> {
    catalog: &'a Catalog,
    sources: &'a Sources,
    options: &'a ReconcileOptions,
    table: &'a str,
    keys: &'a [String],
    key_fields: &'a HashMap<String, Vec<usize>>,
    dates: &'a TableDates,
}

impl<'a> TablePass<'a> {
    /// Reconcile one non-key column into `output`.
    /// Returns `false` when the column is filled some other way or no form could supply it.
    fn reconcile_column(
        &self,
        spec: &OutputColumnSpec,
        output: &mut OutputTable,
        ledger: &mut DiscrepancyLedger,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<bool> {
        let column = spec.output_column.as_str();
        let mappings = self.catalog.mappings_for_column(self.table, column);
        let Some(first) = mappings.first() else {
            return Err(Error::NoProvenance {
                table: self.table.to_string(),
                column: column.to_string(),
            });
        };

        if self.dates.is_fanned_part(column) {
            debug!("'{}' is filled from the composite date", column);
            return Ok(false);
        }

        info!("retrieving value for '{}'", column);
        let contributors = self.contributors(&mappings, first);
        let rule = &first.comparison_rule;

        let (joined, forms) = self.join(column, &contributors, ledger, sink);
        if forms.is_empty() {
            info!("no form could supply '{}'", column);
            return Ok(false);
        }
        debug!("comparing {} forms for '{}'", forms.len(), column);

        let mut winners = Vec::with_capacity(joined.len());
        for (key, cells) in joined {
            let candidates: Vec<Candidate<'_>> = forms
                .iter()
                .zip(&cells)
                .map(|(c, cell)| Candidate {
                    form: c.form,
                    precedence: c.precedence,
                    value: cell.and_then(CellValue::value),
                })
                .collect();

            let selection = select_winner(&candidates, rule, self.options.symmetric_date_window);
            for e in &selection.rule_errors {
                sink.report(Diagnostic::recoverable(
                    format!("Error: Problem with comparing values based on given rule: {}", rule),
                    e.to_string(),
                ));
            }

            if selection.resolved.is_discrepancy() {
                debug!("discrepancy in {}.{} for {:?}", self.table, column, key.values());
                ledger.push(DiscrepancyRecord {
                    output_table: self.table.to_string(),
                    output_column: column.to_string(),
                    key: self.keys.iter().cloned().zip(key.0.iter().cloned()).collect(),
                    values: forms
                        .iter()
                        .zip(&cells)
                        .map(|(c, cell)| {
                            (c.form.to_string(), cell.map(|v| v.raw().to_string()).unwrap_or_default())
                        })
                        .collect(),
                });
            }
            winners.push((key, selection.resolved));
        }

        if self.dates.fans_out(column) {
            self.merge_with_parts(column, winners, output, sink);
        } else {
            output.merge_column(column, winners);
        }
        Ok(true)
    }

    /// Mapped forms of the column, plus, for the composite date, every form
    /// whose date was synthesized from day/month/year fields.
    fn contributors(&self, mappings: &[&'a FieldMapping], first: &FieldMapping) -> Vec<Contributor<'a>> {
        let mut contributors: Vec<Contributor<'a>> = mappings
            .iter()
            .map(|m| Contributor {
                form: &m.input_form,
                precedence: m.form_precedence,
                field: &m.input_field,
            })
            .collect();

        if first.date_marker == Some(DateMarker::Date) {
            for m in self.catalog.mappings_for_table(self.table) {
                if m.date_marker != Some(DateMarker::Day) {
                    continue;
                }
                if let Some(field) = self.dates.synthesized_date(&m.input_form) {
                    contributors.push(Contributor {
                        form: &m.input_form,
                        precedence: m.form_precedence,
                        field,
                    });
                }
            }
        }
        contributors
    }

    /// Join the contributors' values on the key tuple.
    ///
    /// Returns one row per key seen in any form, with one slot per form
    /// that could be read, and the list of those forms.
    #[allow(clippy::type_complexity)]
    fn join<'c>(
        &self,
        column: &str,
        contributors: &'c [Contributor<'a>],
        ledger: &mut DiscrepancyLedger,
        sink: &mut dyn DiagnosticSink,
    ) -> (BTreeMap<KeyTuple, Vec<Option<&'a CellValue>>>, Vec<&'c Contributor<'a>>) {
        let mut joined: BTreeMap<KeyTuple, Vec<Option<&'a CellValue>>> = BTreeMap::new();
        let mut forms: Vec<&'c Contributor<'a>> = Vec::new();

        for contributor in contributors {
            let (Some(source), Some(key_idx)) = (
                self.sources.get(contributor.form),
                self.key_fields.get(contributor.form),
            ) else {
                continue;
            };
            let Some(field) = source.column_index(contributor.field) else {
                sink.report(Diagnostic::recoverable(
                    format!(
                        "Error: '{}' is not contained in the form '{}'. Column '{}' can not be compared across forms",
                        contributor.field, contributor.form, column
                    ),
                    String::new(),
                ));
                continue;
            };

            ledger.add_form(contributor.form);
            let slot = forms.len();
            forms.push(contributor);

            for (n, row) in source.rows.iter().enumerate() {
                let key: KeyTuple = key_idx
                    .iter()
                    .map(|&i| row.get(i).map(CellValue::raw).unwrap_or_default())
                    .collect();
                let cells = joined.entry(key).or_default();
                cells.resize(slot + 1, None);
                if cells[slot].is_some() {
                    sink.report(Diagnostic::recoverable(
                        format!("Error: Duplicate key in form '{}' for column '{}'", contributor.form, column),
                        format!("row {} repeats a key; the first row is kept", n + 1),
                    ));
                    continue;
                }
                cells[slot] = row.get(field);
            }
        }

        for cells in joined.values_mut() {
            cells.resize(forms.len(), None);
        }
        (joined, forms)
    }

    /// Merge composite date winners together with their day, month and year parts
    fn merge_with_parts(
        &self,
        column: &str,
        winners: Vec<(KeyTuple, Resolved)>,
        output: &mut OutputTable,
        sink: &mut dyn DiagnosticSink,
    ) {
        let mut parts: [Vec<(KeyTuple, Resolved)>; 3] = Default::default();

        for (key, resolved) in &winners {
            let split = match resolved {
                Resolved::Value(v) => match split_date(v) {
                    Some((m, d, y)) => [d, m, y].map(|p| Resolved::Value(p.to_string())),
                    None => {
                        sink.report(Diagnostic::recoverable(
                            "Error: Problem with adding the values to the output table".to_string(),
                            format!("'{}' in '{}' is not a month/day/year date", v, column),
                        ));
                        [Resolved::NoData, Resolved::NoData, Resolved::NoData]
                    }
                },
                other => [other.clone(), other.clone(), other.clone()],
            };
            for (list, value) in parts.iter_mut().zip(split) {
                list.push((key.clone(), value));
            }
        }

        output.merge_column(column, winners);
        let roles = [DateMarker::Day, DateMarker::Month, DateMarker::Year];
        for (role, values) in roles.into_iter().zip(parts) {
            if let Some(target) = self.dates.column_for(role) {
                output.merge_column(target, values);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use crate::parser::parse_csv_str;

    fn candidate(form: &'static str, precedence: i64, value: Option<&'static str>) -> Candidate<'static> {
        Candidate { form, precedence, value }
    }

    fn value(v: &str) -> Resolved {
        Resolved::Value(v.to_string())
    }

    fn mapping(column: &str, form: &str, precedence: i64, field: &str, rule: &str) -> FieldMapping {
        FieldMapping {
            output_table: "visits".to_string(),
            output_column: column.to_string(),
            form_precedence: precedence,
            input_form: form.to_string(),
            input_field: field.to_string(),
            date_marker: None,
            comparison_rule: ComparisonRule::parse(rule),
        }
    }

    fn spec(column: &str, is_key: bool, order: i64) -> OutputColumnSpec {
        OutputColumnSpec {
            output_table: "visits".to_string(),
            output_column: column.to_string(),
            is_key,
            display_order: order,
        }
    }

    fn key(k: &str) -> KeyTuple {
        KeyTuple(vec![k.to_string()])
    }

    #[test]
    fn test_select_no_values() {
        let selection = select_winner(
            &[candidate("a", 1, None), candidate("b", 1, None)],
            &ComparisonRule::Strict,
            false,
        );
        assert_eq!(selection.resolved, Resolved::NoData);
    }

    #[test]
    fn test_select_single_value_wins() {
        let selection = select_winner(
            &[candidate("a", 1, None), candidate("b", 5, Some("y"))],
            &ComparisonRule::Strict,
            false,
        );
        assert_eq!(selection.resolved, value("y"));
    }

    #[test]
    fn test_select_precedence_override() {
        let selection = select_winner(
            &[candidate("b", 2, Some("y")), candidate("a", 1, Some("x"))],
            &ComparisonRule::Strict,
            false,
        );
        assert_eq!(selection.resolved, value("x"));

        let selection = select_winner(
            &[candidate("a", 1, Some("x")), candidate("b", 2, Some("y"))],
            &ComparisonRule::Strict,
            false,
        );
        assert_eq!(selection.resolved, value("x"));
    }

    #[test]
    fn test_select_tie_is_discrepancy() {
        let selection = select_winner(
            &[candidate("a", 1, Some("x")), candidate("b", 1, Some("y"))],
            &ComparisonRule::Strict,
            false,
        );
        assert_eq!(selection.resolved, Resolved::Discrepancy);
        assert!(selection.rule_errors.is_empty());
    }

    #[test]
    fn test_select_equal_values_agree() {
        let selection = select_winner(
            &[candidate("a", 1, Some("x")), candidate("b", 1, Some("x"))],
            &ComparisonRule::Strict,
            false,
        );
        assert_eq!(selection.resolved, value("x"));
    }

    #[test]
    fn test_select_higher_precedence_clears_dispute() {
        let selection = select_winner(
            &[
                candidate("a", 2, Some("x")),
                candidate("b", 2, Some("y")),
                candidate("c", 1, Some("z")),
            ],
            &ComparisonRule::Strict,
            false,
        );
        assert_eq!(selection.resolved, value("z"));
    }

    #[test]
    fn test_select_tolerance_keeps_first_value() {
        let selection = select_winner(
            &[candidate("a", 1, Some("01/01/2020")), candidate("b", 1, Some("01/05/2020"))],
            &ComparisonRule::parse("date_90_day"),
            false,
        );
        assert_eq!(selection.resolved, value("01/01/2020"));
    }

    #[test]
    fn test_select_numeric_tolerance() {
        let selection = select_winner(
            &[candidate("a", 1, Some("2")), candidate("b", 1, Some("2.0"))],
            &ComparisonRule::NumericEqual,
            false,
        );
        assert_eq!(selection.resolved, value("2"));
    }

    #[test]
    fn test_select_rule_error_is_discrepancy() {
        let selection = select_winner(
            &[candidate("a", 1, Some("two")), candidate("b", 1, Some("2"))],
            &ComparisonRule::NumericEqual,
            false,
        );
        assert_eq!(selection.resolved, Resolved::Discrepancy);
        assert_eq!(selection.rule_errors.len(), 1);
    }

    #[test]
    fn test_select_oversized_date_window_is_discrepancy() {
        let selection = select_winner(
            &[candidate("a", 1, Some("1/1/2020")), candidate("b", 1, Some("1/2/2020"))],
            &ComparisonRule::parse("date_99999999999999999_year"),
            false,
        );
        assert_eq!(selection.resolved, Resolved::Discrepancy);
        assert!(matches!(selection.rule_errors[..], [RuleError::WindowOverflow(_)]));
    }

    #[test]
    fn test_output_table_outer_join() {
        let mut table = OutputTable::new("visits", vec!["subject".to_string()]);
        table.merge_column("a", vec![(key("1"), value("x"))]);
        table.merge_column("b", vec![(key("2"), value("y"))]);

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell_text(&key("1"), "subject"), "1");
        assert_eq!(table.cell_text(&key("1"), "a"), "x");
        assert_eq!(table.cell_text(&key("1"), "b"), "");
        assert_eq!(table.cell_text(&key("2"), "b"), "y");
        assert_eq!(table.columns, vec!["a", "b"]);
    }

    fn session(mappings: Vec<FieldMapping>, outputs: Vec<OutputColumnSpec>, forms: &[(&str, &str)]) -> Session {
        let catalog = Catalog::new(mappings, outputs).unwrap();
        let sources = forms
            .iter()
            .map(|(name, csv)| parse_csv_str(csv, name).unwrap())
            .collect();
        Session::new(catalog, sources, ReconcileOptions::default())
    }

    #[test]
    fn test_session_tie_goes_to_ledger() {
        let mut session = session(
            vec![
                mapping("subject", "a", 1, "id", ""),
                mapping("subject", "b", 1, "id", ""),
                mapping("weight", "a", 1, "wt", ""),
                mapping("weight", "b", 1, "wt", ""),
            ],
            vec![spec("subject", true, 1), spec("weight", false, 2)],
            &[("a", "id,wt\n1,70\n2,80\n"), ("b", "id,wt\n1,71\n3,90\n")],
        );
        let mut sink = MemorySink::new();
        session.run(&mut sink).unwrap();
        let outcome = session.finish();

        let table = &outcome.tables["visits"];
        assert_eq!(table.cell_text(&key("1"), "weight"), DISCREPANCY);
        assert_eq!(table.cell_text(&key("2"), "weight"), "80");
        assert_eq!(table.cell_text(&key("3"), "weight"), "90");

        assert_eq!(outcome.ledger.len(), 1);
        assert_eq!(outcome.ledger.rows()[0], vec!["visits", "weight", "1", "70", "71"]);
        assert_eq!(outcome.stats.discrepancies, 1);
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn test_session_missing_field_is_recoverable() {
        let mut session = session(
            vec![
                mapping("subject", "a", 1, "id", ""),
                mapping("subject", "b", 1, "id", ""),
                mapping("weight", "a", 1, "wt", ""),
                mapping("weight", "b", 1, "weight", ""),
            ],
            vec![spec("subject", true, 1), spec("weight", false, 2)],
            &[("a", "id,wt\n1,70\n"), ("b", "id,wt\n1,71\n")],
        );
        let mut sink = MemorySink::new();
        session.run(&mut sink).unwrap();
        let outcome = session.finish();

        assert_eq!(outcome.tables["visits"].cell_text(&key("1"), "weight"), "70");
        assert_eq!(sink.error_count(), 1);
        assert!(outcome.ledger.is_empty());
    }

    #[test]
    fn test_session_missing_key_is_fatal() {
        let mut session = session(
            vec![
                mapping("subject", "a", 1, "id", ""),
                mapping("weight", "a", 1, "wt", ""),
                mapping("weight", "b", 1, "wt", ""),
            ],
            vec![spec("subject", true, 1), spec("weight", false, 2)],
            &[("a", "id,wt\n1,70\n"), ("b", "id,wt\n1,71\n")],
        );
        let err = session.run(&mut MemorySink::new()).unwrap_err();
        assert!(matches!(err, Error::MissingKeyColumn { ref form, .. } if form == "b"));
    }

    #[test]
    fn test_session_no_provenance_is_fatal() {
        let mut session = session(
            vec![mapping("subject", "a", 1, "id", "")],
            vec![spec("subject", true, 1), spec("height", false, 2)],
            &[("a", "id\n1\n")],
        );
        let err = session.run(&mut MemorySink::new()).unwrap_err();
        assert!(matches!(err, Error::NoProvenance { ref column, .. } if column == "height"));
    }

    #[test]
    fn test_session_duplicate_key_keeps_first_row() {
        let mut session = session(
            vec![mapping("subject", "a", 1, "id", ""), mapping("weight", "a", 1, "wt", "")],
            vec![spec("subject", true, 1), spec("weight", false, 2)],
            &[("a", "id,wt\n1,70\n1,99\n")],
        );
        let mut sink = MemorySink::new();
        session.run(&mut sink).unwrap();
        let outcome = session.finish();

        assert_eq!(outcome.tables["visits"].cell_text(&key("1"), "weight"), "70");
        assert_eq!(sink.error_count(), 1);
    }
}
