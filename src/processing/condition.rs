//! Row condition evaluation.
//!
//! A [`Predicate`] combines one [`Condition`], the field it reads, and the [`Operand`] it compares
//! against. Evaluation never fails: a row value that cannot be coerced to the operand's type
//! simply does not match.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{CruncherError, CruncherResult};
use crate::types::Row;

/// Predicate kinds accepted by a Query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    Equals,
    Greater,
    Less,
    Not,
    After,
    Before,
    On,
    Between,
    NotBetween,
    Empty,
    NotEmpty,
    Contains,
    In,
}

impl Condition {
    /// Every condition, in keyword order.
    pub const ALL: [Condition; 13] = [
        Condition::Equals,
        Condition::Greater,
        Condition::Less,
        Condition::Not,
        Condition::After,
        Condition::Before,
        Condition::On,
        Condition::Between,
        Condition::NotBetween,
        Condition::Empty,
        Condition::NotEmpty,
        Condition::Contains,
        Condition::In,
    ];

    /// Upper-case keyword for this condition.
    pub fn keyword(self) -> &'static str {
        match self {
            Condition::Equals => "EQUALS",
            Condition::Greater => "GREATER",
            Condition::Less => "LESS",
            Condition::Not => "NOT",
            Condition::After => "AFTER",
            Condition::Before => "BEFORE",
            Condition::On => "ON",
            Condition::Between => "BETWEEN",
            Condition::NotBetween => "NOT_BETWEEN",
            Condition::Empty => "EMPTY",
            Condition::NotEmpty => "NOT_EMPTY",
            Condition::Contains => "CONTAINS",
            Condition::In => "IN",
        }
    }

    /// Whether this condition compares parsed dates.
    pub fn is_date(self) -> bool {
        matches!(
            self,
            Condition::After
                | Condition::Before
                | Condition::On
                | Condition::Between
                | Condition::NotBetween
        )
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for Condition {
    type Err = CruncherError;

    /// Case-insensitive; spaces are accepted in place of underscores (`not between`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let keyword = s.trim().to_ascii_uppercase().replace(' ', "_");
        Condition::ALL
            .into_iter()
            .find(|c| c.keyword() == keyword)
            .ok_or_else(|| {
                let valid: Vec<&str> = Condition::ALL.iter().map(|c| c.keyword()).collect();
                CruncherError::config(format!(
                    "unknown condition '{s}', must be one of: {}",
                    valid.join(", ")
                ))
            })
    }
}

/// The value a condition compares row values against.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Operand {
    /// No value configured (only valid for `EMPTY`/`NOT_EMPTY`).
    #[default]
    None,
    /// A numeric literal; `raw` keeps its original text for substring/membership tests.
    Number { value: f64, raw: String },
    /// A text literal.
    Text(String),
    /// A single parsed date.
    Date(NaiveDateTime),
    /// An ordered `(start, end)` pair of parsed dates.
    DateRange(NaiveDateTime, NaiveDateTime),
    /// A literal set of accepted values.
    List(Vec<String>),
}

impl Operand {
    /// Numeric literal if `raw` parses as a number, text otherwise.
    pub fn from_text(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Operand::Number { value, raw },
            _ => Operand::Text(raw),
        }
    }

    /// Parse `raw` with `format`, failing with [`CruncherError::InvalidConfiguration`].
    pub fn date(raw: &str, format: &str) -> CruncherResult<Self> {
        parse_date(raw, format)
            .map(Operand::Date)
            .ok_or_else(|| invalid_date(raw, format))
    }

    /// Parse a `(start, end)` pair with `format`.
    pub fn date_range(start: &str, end: &str, format: &str) -> CruncherResult<Self> {
        let s = parse_date(start, format).ok_or_else(|| invalid_date(start, format))?;
        let e = parse_date(end, format).ok_or_else(|| invalid_date(end, format))?;
        Ok(Operand::DateRange(s, e))
    }

    /// A literal set of values; each is trimmed.
    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Operand::List(values.into_iter().map(|v| v.as_ref().trim().to_owned()).collect())
    }
}

fn invalid_date(raw: &str, format: &str) -> CruncherError {
    CruncherError::config(format!(
        "couldn't parse date '{raw}' with format '{format}'"
    ))
}

/// Parse `raw` with a chrono `strftime` format. Date-only formats resolve to midnight.
pub fn parse_date(raw: &str, format: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, format).ok().or_else(|| {
        NaiveDate::parse_from_str(raw, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

/// Split a comma-separated literal (with CSV quoting) into trimmed values.
fn split_list(raw: &str) -> CruncherResult<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());
    let mut record = csv::StringRecord::new();
    if !rdr.read_record(&mut record)? {
        return Ok(Vec::new());
    }
    Ok(record.iter().map(str::to_owned).collect())
}

/// A validated (condition, field, operand) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    condition: Condition,
    field: String,
    operand: Operand,
    date_format: Option<String>,
}

impl Predicate {
    /// Check that `operand` fits `condition`.
    ///
    /// `IN` accepts a comma-separated text literal, which is split here. Date conditions require a
    /// `date_format` for parsing row values.
    pub fn new(
        condition: Condition,
        field: impl Into<String>,
        operand: Operand,
        date_format: Option<String>,
    ) -> CruncherResult<Self> {
        let field = field.into();
        if field.is_empty() {
            return Err(CruncherError::config(format!(
                "condition {condition} needs a field to test"
            )));
        }

        let operand = match (condition, operand) {
            (Condition::Empty | Condition::NotEmpty, op) => op,
            (
                Condition::Equals | Condition::Greater | Condition::Less | Condition::Not,
                op @ (Operand::Number { .. } | Operand::Text(_)),
            ) => op,
            (Condition::Contains, op @ (Operand::Number { .. } | Operand::Text(_))) => op,
            (Condition::In, Operand::Text(raw) | Operand::Number { raw, .. }) => {
                Operand::List(split_list(&raw)?)
            }
            (Condition::In, op @ Operand::List(_)) => op,
            (Condition::After | Condition::Before | Condition::On, op @ Operand::Date(_)) => op,
            (Condition::Between | Condition::NotBetween, op @ Operand::DateRange(..)) => op,
            (condition, op) => {
                return Err(CruncherError::config(format!(
                    "condition {condition} cannot compare against {op:?}"
                )));
            }
        };

        if condition.is_date() && date_format.is_none() {
            return Err(CruncherError::config(format!(
                "condition {condition} needs a date format for field '{field}'"
            )));
        }

        Ok(Self {
            condition,
            field,
            operand,
            date_format,
        })
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Whether `row` satisfies the predicate. A row without the field never matches.
    pub fn matches(&self, row: &Row) -> bool {
        match row.get(&self.field) {
            Some(v) => self.evaluate(v.as_text().trim()),
            None => false,
        }
    }

    /// Evaluate the predicate against an already-trimmed field value.
    pub fn evaluate(&self, value: &str) -> bool {
        match self.condition {
            Condition::Equals | Condition::Greater | Condition::Less | Condition::Not => {
                self.compare(value)
            }
            Condition::Empty => value.is_empty(),
            Condition::NotEmpty => !value.is_empty(),
            Condition::Contains => match &self.operand {
                Operand::Text(needle) | Operand::Number { raw: needle, .. } => {
                    value.contains(needle.as_str())
                }
                _ => false,
            },
            Condition::In => match &self.operand {
                Operand::List(values) => values.iter().any(|v| v == value),
                _ => false,
            },
            Condition::After
            | Condition::Before
            | Condition::On
            | Condition::Between
            | Condition::NotBetween => self.compare_date(value),
        }
    }

    fn compare(&self, value: &str) -> bool {
        match &self.operand {
            Operand::Number { value: target, .. } => {
                let Some(v) = value.parse::<f64>().ok().filter(|v| v.is_finite()) else {
                    return false;
                };
                match self.condition {
                    Condition::Equals => v == *target,
                    Condition::Not => v != *target,
                    Condition::Greater => v > *target,
                    Condition::Less => v < *target,
                    _ => false,
                }
            }
            Operand::Text(target) => match self.condition {
                Condition::Equals => value == target,
                Condition::Not => value != target,
                Condition::Greater => value > target.as_str(),
                Condition::Less => value < target.as_str(),
                _ => false,
            },
            _ => false,
        }
    }

    fn compare_date(&self, value: &str) -> bool {
        let Some(format) = self.date_format.as_deref() else {
            return false;
        };
        let Some(date) = parse_date(value, format) else {
            return false;
        };
        match (&self.condition, &self.operand) {
            (Condition::After, Operand::Date(d)) => date > *d,
            (Condition::Before, Operand::Date(d)) => date < *d,
            (Condition::On, Operand::Date(d)) => date == *d,
            (Condition::Between, Operand::DateRange(start, end)) => *start < date && date < *end,
            (Condition::NotBetween, Operand::DateRange(start, end)) => date < *start || date > *end,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_date, Condition, Operand, Predicate};
    use crate::error::CruncherError;

    fn pred(condition: Condition, operand: Operand) -> Predicate {
        Predicate::new(condition, "f", operand, None).unwrap()
    }

    fn dated(condition: Condition, operand: Operand) -> Predicate {
        Predicate::new(condition, "dob", operand, Some("%d/%m/%Y".to_string())).unwrap()
    }

    #[test]
    fn keywords_parse_case_insensitively() {
        assert_eq!("contains".parse::<Condition>().unwrap(), Condition::Contains);
        assert_eq!("Not Between".parse::<Condition>().unwrap(), Condition::NotBetween);
        assert_eq!("not_empty".parse::<Condition>().unwrap(), Condition::NotEmpty);
        let err = "LIKE".parse::<Condition>().unwrap_err();
        assert!(matches!(err, CruncherError::InvalidConfiguration { .. }));
        assert!(err.to_string().contains("NOT_BETWEEN"));
    }

    #[test]
    fn numeric_operand_coerces_row_value() {
        let p = pred(Condition::Equals, Operand::from_text("28"));
        assert!(p.evaluate("28"));
        assert!(p.evaluate("28.0"));
        assert!(!p.evaluate("abc"));

        let gt = pred(Condition::Greater, Operand::from_text("25"));
        assert!(gt.evaluate("28"));
        assert!(!gt.evaluate("25"));
        assert!(!gt.evaluate("n/a"));

        let not = pred(Condition::Not, Operand::from_text("25"));
        assert!(not.evaluate("15"));
        assert!(!not.evaluate("not a number"));
    }

    #[test]
    fn non_finite_row_values_never_match_numbers() {
        let gt = pred(Condition::Greater, Operand::from_text("10"));
        assert!(!gt.evaluate("inf"));
        assert!(!gt.evaluate("infinity"));
        assert!(!pred(Condition::Less, Operand::from_text("10")).evaluate("-inf"));
        assert!(!pred(Condition::Not, Operand::from_text("10")).evaluate("NaN"));
    }

    #[test]
    fn text_operand_uses_exact_match() {
        let p = pred(Condition::Equals, Operand::from_text("matt"));
        assert!(p.evaluate("matt"));
        assert!(!p.evaluate("Matt"));
        assert!(pred(Condition::Less, Operand::from_text("m")).evaluate("john"));
    }

    #[test]
    fn contains_is_case_sensitive() {
        let p = pred(Condition::Contains, Operand::from_text("samsung"));
        assert!(p.evaluate("samsung galaxy s6"));
        assert!(!p.evaluate("Samsung note 7"));
        assert!(!p.evaluate("apple iphone 6"));
    }

    #[test]
    fn in_accepts_delimited_text_or_list() {
        let p = pred(Condition::In, Operand::from_text("matt, tony ,\"a, b\""));
        assert_eq!(
            p.operand(),
            &Operand::List(vec!["matt".into(), "tony".into(), "a, b".into()])
        );
        assert!(p.evaluate("tony"));
        assert!(p.evaluate("a, b"));
        assert!(!p.evaluate("john"));

        let l = pred(Condition::In, Operand::list(["x", " y "]));
        assert!(l.evaluate("y"));
    }

    #[test]
    fn empty_tests_trimmed_length() {
        let e = pred(Condition::Empty, Operand::None);
        assert!(e.matches(&crate::row! { "f" => "   " }));
        assert!(!e.matches(&crate::row! { "f" => "x" }));
        let ne = pred(Condition::NotEmpty, Operand::None);
        assert!(ne.evaluate("x"));
    }

    #[test]
    fn between_bounds_are_exclusive() {
        let range = Operand::date_range("01/01/1985", "01/01/1995", "%d/%m/%Y").unwrap();
        let between = dated(Condition::Between, range.clone());
        assert!(between.evaluate("24/11/1987"));
        assert!(!between.evaluate("01/01/1985"));
        assert!(!between.evaluate("01/01/2000"));

        let outside = dated(Condition::NotBetween, range);
        assert!(outside.evaluate("01/01/2000"));
        assert!(!outside.evaluate("01/01/1995"));
        assert!(!outside.evaluate("garbage"));
    }

    #[test]
    fn single_date_comparisons() {
        let d = Operand::date("01/01/1990", "%d/%m/%Y").unwrap();
        assert!(dated(Condition::After, d.clone()).evaluate("02/05/1990"));
        assert!(dated(Condition::Before, d.clone()).evaluate("24/11/1987"));
        assert!(dated(Condition::On, d).evaluate("01/01/1990"));
    }

    #[test]
    fn date_configuration_errors_are_eager() {
        assert!(matches!(
            Operand::date("31/02/1990", "%d/%m/%Y").unwrap_err(),
            CruncherError::InvalidConfiguration { .. }
        ));
        let d = Operand::date("01/01/1990", "%d/%m/%Y").unwrap();
        assert!(Predicate::new(Condition::After, "dob", d, None).is_err());
        assert!(Predicate::new(Condition::Between, "dob", Operand::from_text("x"), Some("%Y".into())).is_err());
        assert!(Predicate::new(Condition::Contains, "f", Operand::None, None).is_err());
    }

    #[test]
    fn parse_date_accepts_date_and_datetime_formats() {
        assert!(parse_date("2016-03-01 10:30:00", "%Y-%m-%d %H:%M:%S").is_some());
        assert_eq!(
            parse_date("01/03/2016", "%d/%m/%Y").unwrap().to_string(),
            "2016-03-01 00:00:00"
        );
    }

    #[test]
    fn missing_field_never_matches() {
        let p = pred(Condition::NotEmpty, Operand::None);
        assert!(!p.matches(&crate::row! { "other" => "x" }));
    }
}
