//! Discrepancy ledger shared by every output table of a run

/// First columns of every ledger row
pub const LEDGER_PREFIX: [&str; 2] = ["output_tn", "output_cn"];

/// One unresolved disagreement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscrepancyRecord {
    pub output_table: String,
    pub output_column: String,
    /// `(key column, value)` pairs of the disputed entity
    pub key: Vec<(String, String)>,
    /// `(form, raw value)` for every form that took part in the comparison
    pub values: Vec<(String, String)>,
}

/// Growing table of discrepancies.
///
/// Its column set only grows: key columns in the order output tables first
/// declare them, then form columns in the order forms first contribute.
#[derive(Debug, Clone, Default)]
pub struct DiscrepancyLedger {
    key_columns: Vec<String>,
    form_columns: Vec<String>,
    records: Vec<DiscrepancyRecord>,
}

impl DiscrepancyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register key columns of a newly processed output table
    pub fn add_key_columns(&mut self, keys: &[String]) {
        for key in keys {
            if !self.key_columns.contains(key) {
                self.key_columns.push(key.clone());
            }
        }
    }

    /// Register a form contributing to some column
    pub fn add_form(&mut self, form: &str) {
        if !self.form_columns.iter().any(|f| f == form) {
            self.form_columns.push(form.to_string());
        }
    }

    pub fn push(&mut self, record: DiscrepancyRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[DiscrepancyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Column headers in ledger order
    pub fn headers(&self) -> Vec<String> {
        LEDGER_PREFIX
            .iter()
            .map(|s| s.to_string())
            .chain(self.key_columns.iter().cloned())
            .chain(self.form_columns.iter().cloned())
            .collect()
    }

    /// Rows laid out under [`Self::headers`]; cells a record does not cover are empty
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.records
            .iter()
            .map(|record| {
                let lookup = |pairs: &[(String, String)], name: &str| {
                    pairs
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                };
                let mut row = vec![record.output_table.clone(), record.output_column.clone()];
                row.extend(self.key_columns.iter().map(|k| lookup(&record.key, k)));
                row.extend(self.form_columns.iter().map(|f| lookup(&record.values, f)));
                row
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(table: &str, key: &[(&str, &str)], values: &[(&str, &str)]) -> DiscrepancyRecord {
        let pairs = |p: &[(&str, &str)]| -> Vec<(String, String)> {
            p.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
        };
        DiscrepancyRecord {
            output_table: table.to_string(),
            output_column: "weight".to_string(),
            key: pairs(key),
            values: pairs(values),
        }
    }

    #[test]
    fn test_headers_grow_additively() {
        let mut ledger = DiscrepancyLedger::new();
        ledger.add_key_columns(&["subject".to_string()]);
        ledger.add_form("form_a");
        ledger.add_key_columns(&["subject".to_string(), "visit".to_string()]);
        ledger.add_form("form_b");
        ledger.add_form("form_a");

        assert_eq!(
            ledger.headers(),
            vec!["output_tn", "output_cn", "subject", "visit", "form_a", "form_b"]
        );
    }

    #[test]
    fn test_rows_align_with_headers() {
        let mut ledger = DiscrepancyLedger::new();
        ledger.add_key_columns(&["subject".to_string(), "visit".to_string()]);
        ledger.add_form("form_a");
        ledger.add_form("form_b");
        ledger.push(record("visits", &[("subject", "1"), ("visit", "2")], &[("form_b", "y"), ("form_a", "x")]));
        ledger.push(record("people", &[("subject", "9")], &[("form_a", "z")]));

        let rows = ledger.rows();
        assert_eq!(rows[0], vec!["visits", "weight", "1", "2", "x", "y"]);
        assert_eq!(rows[1], vec!["people", "weight", "9", "", "z", ""]);
        assert_eq!(ledger.len(), 2);
    }
}
