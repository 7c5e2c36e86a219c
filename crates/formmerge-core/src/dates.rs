//! Date representation normalizer
//!
//! Some forms record a composite `month/day/year` date, others record day,
//! month and year in separate fields. Before an output table is reconciled,
//! every contributing form gets whichever representation it lacks, so the
//! composite date column can be compared across all of them.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{Error, Result};
use crate::scanner::Sources;
use crate::schema::{Catalog, DateMarker};
use crate::table::{CellValue, SourceTable};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Split a composite date into `(month, day, year)`.
///
/// The value must have exactly three `/`-separated parts; zero padding is
/// neither required nor removed.
pub fn split_date(value: &str) -> Option<(&str, &str, &str)> {
    let mut parts = value.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(month), Some(day), Some(year), None) => Some((month.trim(), day.trim(), year.trim())),
        _ => None,
    }
}

/// Build a composite `month/day/year` date
pub fn join_date(month: &str, day: &str, year: &str) -> String {
    format!("{}/{}/{}", month.trim(), day.trim(), year.trim())
}

/// Fields added to source forms, looked up by `(form, role)`
#[derive(Debug, Clone, Default)]
pub struct DerivedFields {
    fields: HashMap<(String, DateMarker), String>,
}

impl DerivedFields {
    pub fn get(&self, form: &str, role: DateMarker) -> Option<&str> {
        self.fields
            .get(&(form.to_string(), role))
            .map(String::as_str)
    }

    fn insert(&mut self, form: &str, role: DateMarker, field: String) {
        self.fields.insert((form.to_string(), role), field);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Per-table date context, rebuilt before each output table is reconciled
#[derive(Debug, Clone, Default)]
pub struct TableDates {
    /// Output column bound to each date role
    pub bindings: BTreeMap<DateMarker, String>,
    /// Whether any form in the table carries split day/month/year fields
    pub split: bool,
    pub derived: DerivedFields,
}

impl TableDates {
    pub fn column_for(&self, role: DateMarker) -> Option<&str> {
        self.bindings.get(&role).map(String::as_str)
    }

    pub fn role_of(&self, column: &str) -> Option<DateMarker> {
        self.bindings
            .iter()
            .find(|(_, c)| c.as_str() == column)
            .map(|(role, _)| *role)
    }

    /// The composite date column, when its winners also fill day, month and year
    pub fn fans_out(&self, column: &str) -> bool {
        self.split && self.column_for(DateMarker::Date) == Some(column)
    }

    /// Day, month and year columns filled from the composite date's winners.
    ///
    /// Without a `date` binding there is no composite to fan out, so split
    /// columns are reconciled directly like any other column.
    pub fn is_fanned_part(&self, column: &str) -> bool {
        self.split
            && self.column_for(DateMarker::Date).is_some()
            && matches!(
                self.role_of(column),
                Some(DateMarker::Day | DateMarker::Month | DateMarker::Year)
            )
    }

    /// Composite date field synthesized for a form that only had day/month/year
    pub fn synthesized_date(&self, form: &str) -> Option<&str> {
        self.derived.get(form, DateMarker::Date)
    }

    fn field_name(&self, role: DateMarker, form: &str) -> String {
        let base = self.column_for(role).unwrap_or(role.as_str());
        format!("{}_{}", base, form)
    }
}

/// Give every form contributing to `table` the date representations the
/// reconciliation of that table will need.
pub fn normalize_dates(
    catalog: &Catalog,
    table: &str,
    sources: &mut Sources,
    sink: &mut dyn DiagnosticSink,
) -> Result<TableDates> {
    let mut dates = TableDates::default();
    // role -> form -> field, sorted by form
    let mut fields: BTreeMap<DateMarker, BTreeMap<String, String>> = BTreeMap::new();

    for mapping in catalog.mappings_for_table(table) {
        let Some(marker) = mapping.date_marker else {
            continue;
        };
        if let Some(bound) = dates.bindings.get(&marker) {
            if bound != &mapping.output_column {
                return Err(Error::DateMarkerConflict {
                    table: table.to_string(),
                    marker: marker.to_string(),
                    first: bound.clone(),
                    second: mapping.output_column.clone(),
                });
            }
        }
        dates.bindings.insert(marker, mapping.output_column.clone());
        fields
            .entry(marker)
            .or_default()
            .insert(mapping.input_form.clone(), mapping.input_field.clone());
    }

    let forms_with = |role: DateMarker| -> Vec<String> {
        fields
            .get(&role)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    };
    let date_forms = forms_with(DateMarker::Date);
    let day_forms = forms_with(DateMarker::Day);
    let month_forms = forms_with(DateMarker::Month);
    let year_forms = forms_with(DateMarker::Year);

    if day_forms.is_empty() && month_forms.is_empty() && year_forms.is_empty() {
        debug!("output table '{}' has no split dates", table);
        return Ok(dates);
    }
    if day_forms != month_forms || day_forms != year_forms {
        return Err(Error::IncompleteSplitDate {
            table: table.to_string(),
            day: day_forms,
            month: month_forms,
            year: year_forms,
        });
    }
    dates.split = true;

    let field_of = |role: DateMarker, form: &str| -> String {
        fields
            .get(&role)
            .and_then(|m| m.get(form))
            .cloned()
            .unwrap_or_default()
    };

    for form in day_forms.iter().filter(|f| !date_forms.contains(f)) {
        let source = form_table(sources, table, form)?;
        let parts = [
            field_of(DateMarker::Month, form),
            field_of(DateMarker::Day, form),
            field_of(DateMarker::Year, form),
        ];
        let Some(values) = compose_dates(source, &parts, sink) else {
            continue;
        };
        let name = unique_field(source, dates.field_name(DateMarker::Date, form));
        info!("form '{}': synthesized composite date field '{}'", form, name);
        add_field(sources, form, &name, values);
        dates.derived.insert(form, DateMarker::Date, name);
    }

    for form in date_forms.iter().filter(|f| !day_forms.contains(f)) {
        let source = form_table(sources, table, form)?;
        let Some([months, days, years]) = decompose_dates(source, &field_of(DateMarker::Date, form), sink) else {
            continue;
        };
        for (role, values) in [
            (DateMarker::Day, days),
            (DateMarker::Month, months),
            (DateMarker::Year, years),
        ] {
            let source = form_table(sources, table, form)?;
            let name = unique_field(source, dates.field_name(role, form));
            info!("form '{}': derived {} field '{}'", form, role, name);
            add_field(sources, form, &name, values);
            dates.derived.insert(form, role, name);
        }
    }

    Ok(dates)
}

fn form_table<'a>(sources: &'a Sources, table: &str, form: &str) -> Result<&'a SourceTable> {
    sources.get(form).ok_or_else(|| Error::UnknownForm {
        table: table.to_string(),
        form: form.to_string(),
    })
}

fn add_field(sources: &mut Sources, form: &str, name: &str, values: Vec<CellValue>) {
    if let Some(source) = sources.get_mut(form) {
        source.add_column(name, values);
    }
}

/// A field name not yet used by `source`
fn unique_field(source: &SourceTable, base: String) -> String {
    if !source.has_column(&base) {
        return base;
    }
    (1..)
        .map(|n| format!("{}_{}", base, n))
        .find(|name| !source.has_column(name))
        .unwrap_or(base)
}

fn lookup_fields(source: &SourceTable, fields: &[String], sink: &mut dyn DiagnosticSink) -> Option<Vec<usize>> {
    let mut indices = Vec::with_capacity(fields.len());
    for field in fields {
        match source.column_index(field) {
            Some(i) => indices.push(i),
            None => {
                sink.report(Diagnostic::recoverable(
                    format!(
                        "Error: Problem converting dates in form '{}'",
                        source.name
                    ),
                    format!("field '{}' not found", field),
                ));
                return None;
            }
        }
    }
    Some(indices)
}

/// `month/day/year` per row from the `[month, day, year]` fields.
/// A row missing any part gets an absent date.
fn compose_dates(source: &SourceTable, fields: &[String; 3], sink: &mut dyn DiagnosticSink) -> Option<Vec<CellValue>> {
    let idx = lookup_fields(source, fields, sink)?;
    let values = source
        .rows
        .iter()
        .map(|row| {
            let part = |i: usize| row.get(idx[i]).and_then(CellValue::value);
            match (part(0), part(1), part(2)) {
                (Some(m), Some(d), Some(y)) => CellValue::Present(join_date(m, d, y)),
                _ => CellValue::absent(),
            }
        })
        .collect();
    Some(values)
}

/// `[months, days, years]` split out of a composite date field
fn decompose_dates(
    source: &SourceTable,
    field: &str,
    sink: &mut dyn DiagnosticSink,
) -> Option<[Vec<CellValue>; 3]> {
    let idx = lookup_fields(source, &[field.to_string()], sink)?[0];
    let mut out: [Vec<CellValue>; 3] = Default::default();

    for (n, cell) in source.column_values(idx).enumerate() {
        let parts = match cell.value() {
            Some(value) => match split_date(value) {
                Some((m, d, y)) => Some([m, d, y]),
                None => {
                    sink.report(Diagnostic::recoverable(
                        "Error: Problem converting a column of dates into day, month and year".to_string(),
                        format!("form '{}', row {}: '{}' is not a month/day/year date", source.name, n + 1, value),
                    ));
                    None
                }
            },
            None => None,
        };
        for (i, column) in out.iter_mut().enumerate() {
            column.push(match parts {
                Some(p) => CellValue::Present(p[i].to_string()),
                None => CellValue::absent(),
            });
        }
    }

    Some(out)
}
