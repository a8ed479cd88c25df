//! Grouping rules for [`super::statistics::Statistics`].

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use regex::Regex;

use crate::error::{CruncherError, CruncherResult};
use crate::types::Value;

use super::condition::parse_date;

/// How a rule turns a field value into a bucket key.
#[derive(Debug, Clone)]
pub enum Grouping {
    /// The trimmed value itself.
    Exact,
    /// `"{lower}, {lower + width}"` where `lower = floor(value / width) * width`.
    Numeric { width: f64 },
    /// Parse with `input`, re-format with `output` (e.g. `%d/%m/%Y` → `%Y`).
    Date { input: String, output: String },
    /// First capture group of the pattern (the whole match if it has no groups).
    Regex(Regex),
}

/// A (field, grouping, optional label) tuple.
///
/// ```rust
/// use data_cruncher::processing::Rule;
///
/// # fn main() -> Result<(), data_cruncher::CruncherError> {
/// let rule = Rule::new("phone").group_regex(r"^([\w\-]+)")?.label("company");
/// assert_eq!(rule.bucket(&"samsung galaxy s6".into()).as_deref(), Some("samsung"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Rule {
    field: String,
    grouping: Grouping,
    label: Option<String>,
}

impl Rule {
    /// Rule over `field`, grouping by exact value until told otherwise.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            grouping: Grouping::Exact,
            label: None,
        }
    }

    pub fn group_exact(mut self) -> Self {
        self.grouping = Grouping::Exact;
        self
    }

    /// Bucket numeric values into ranges of `width`.
    pub fn group_numeric(mut self, width: f64) -> CruncherResult<Self> {
        if !(width.is_finite() && width > 0.0) {
            return Err(CruncherError::config(format!(
                "numeric bucket width must be a positive number, got {width}"
            )));
        }
        self.grouping = Grouping::Numeric { width };
        Ok(self)
    }

    /// Bucket dates parsed with `input` by their `output` rendering.
    pub fn group_date(mut self, input: impl Into<String>, output: impl Into<String>) -> CruncherResult<Self> {
        let input = input.into();
        let output = output.into();
        for format in [&input, &output] {
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                return Err(CruncherError::config(format!(
                    "invalid date format '{format}'"
                )));
            }
        }
        self.grouping = Grouping::Date { input, output };
        Ok(self)
    }

    /// Bucket by the first capture group of `pattern`.
    pub fn group_regex(mut self, pattern: &str) -> CruncherResult<Self> {
        let re = Regex::new(pattern).map_err(|e| {
            CruncherError::config(format!("invalid pattern '{pattern}': {e}"))
        })?;
        self.grouping = Grouping::Regex(re);
        Ok(self)
    }

    /// Human-readable name for this rule's results.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn grouping(&self) -> &Grouping {
        &self.grouping
    }

    pub fn get_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Bucket key for one field value, or `None` if the value falls outside every bucket
    /// (not numeric, not a date in the input format, or no regex match).
    pub fn bucket(&self, value: &Value) -> Option<String> {
        let text = value.as_text();
        let text = text.trim();
        match &self.grouping {
            Grouping::Exact => Some(text.to_owned()),
            Grouping::Numeric { width } => {
                let v = value.as_f64()?;
                let lower = (v / width).floor() * width;
                Some(format!("{}, {}", lower, lower + width))
            }
            Grouping::Date { input, output } => {
                let date = parse_date(text, input)?;
                let mut key = String::new();
                write!(key, "{}", date.format(output)).ok()?;
                Some(key)
            }
            Grouping::Regex(re) => {
                let caps = re.captures(text)?;
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_owned())
            }
        }
    }
}
