//! Tolerance rules deciding whether two differing values still agree
//!
//! Rules come from the `comparison_type` column of the mapping table:
//! - `nan` or blank: any difference is a discrepancy
//! - `date_<N>_<unit>`: `month/day/year` dates within N days, months (30 days)
//!   or years (365 days) of each other agree
//! - `compare_value_int`: values that are numerically equal agree (`1` and `1.0`)

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Unit of a date tolerance window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateUnit {
    Day,
    Month,
    Year,
}

impl DateUnit {
    fn days(self) -> i64 {
        match self {
            DateUnit::Day => 1,
            DateUnit::Month => 30,
            DateUnit::Year => 365,
        }
    }

    fn name(self) -> &'static str {
        match self {
            DateUnit::Day => "day",
            DateUnit::Month => "month",
            DateUnit::Year => "year",
        }
    }
}

/// A parsed comparison rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonRule {
    /// No rule declared
    Strict,
    /// Dates within `amount` units of each other agree
    DateWithin { amount: i64, unit: DateUnit },
    /// Values agree when they parse to the same number
    NumericEqual,
    /// Anything else, kept verbatim so it can be reported
    Unrecognized(String),
}

/// Why a rule could not be applied to a pair of values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("unrecognized comparison rule '{0}'")]
    Unrecognized(String),

    #[error("rule '{rule}': '{value}' is not a month/day/year date")]
    BadDate { rule: String, value: String },

    #[error("rule '{rule}': '{value}' is not a number")]
    BadNumber { rule: String, value: String },

    #[error("rule '{0}': window is too large to compare dates")]
    WindowOverflow(String),
}

impl ComparisonRule {
    /// Parse the text of a `comparison_type` cell
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("nan") {
            return ComparisonRule::Strict;
        }
        if text == "compare_value_int" {
            return ComparisonRule::NumericEqual;
        }

        let parts: Vec<&str> = text.split('_').collect();
        if let ["date", amount, unit] = parts.as_slice() {
            let unit = match *unit {
                "day" => Some(DateUnit::Day),
                "month" => Some(DateUnit::Month),
                "year" => Some(DateUnit::Year),
                _ => None,
            };
            if let (Ok(amount), Some(unit)) = (amount.parse::<i64>(), unit) {
                return ComparisonRule::DateWithin { amount, unit };
            }
        }

        ComparisonRule::Unrecognized(text.to_string())
    }

    /// Decide whether `candidate` and `current` agree under this rule.
    ///
    /// Date windows are directional unless `symmetric` is set: the pair
    /// agrees when `candidate - current <= window`, so a candidate that is
    /// any amount earlier than the current winner is accepted.
    pub fn tolerates(&self, candidate: &str, current: &str, symmetric: bool) -> Result<bool, RuleError> {
        match self {
            ComparisonRule::Strict => Ok(false),
            ComparisonRule::DateWithin { amount, unit } => {
                let first = self.parse_date(candidate)?;
                let second = self.parse_date(current)?;
                let span = (first - second).num_days();
                let span = if symmetric { span.abs() } else { span };
                let window = amount
                    .checked_mul(unit.days())
                    .ok_or_else(|| RuleError::WindowOverflow(self.to_string()))?;
                Ok(span <= window)
            }
            ComparisonRule::NumericEqual => {
                let first = self.parse_number(candidate)?;
                let second = self.parse_number(current)?;
                Ok(first == second)
            }
            ComparisonRule::Unrecognized(text) => Err(RuleError::Unrecognized(text.clone())),
        }
    }

    fn parse_date(&self, value: &str) -> Result<NaiveDate, RuleError> {
        parse_mdy(value).ok_or_else(|| RuleError::BadDate {
            rule: self.to_string(),
            value: value.to_string(),
        })
    }

    fn parse_number(&self, value: &str) -> Result<f64, RuleError> {
        value.trim().parse::<f64>().map_err(|_| RuleError::BadNumber {
            rule: self.to_string(),
            value: value.to_string(),
        })
    }
}

/// Parse a `month/day/year` string into a calendar date
pub fn parse_mdy(value: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = value.split('/').map(str::trim).collect();
    let [month, day, year] = parts.as_slice() else {
        return None;
    };
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

impl fmt::Display for ComparisonRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonRule::Strict => write!(f, "nan"),
            ComparisonRule::DateWithin { amount, unit } => write!(f, "date_{}_{}", amount, unit.name()),
            ComparisonRule::NumericEqual => write!(f, "compare_value_int"),
            ComparisonRule::Unrecognized(text) => write!(f, "{}", text),
        }
    }
}

impl Serialize for ComparisonRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
