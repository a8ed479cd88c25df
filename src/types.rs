//! Core data model types.
//!
//! Sources produce [`Row`]s one at a time: an ordered mapping from field name to [`Value`].
//! Rows are transient; a source never retains the rows it has handed out.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A single value in a [`Row`].
///
/// Delimited-text codecs only ever produce [`Value::Utf8`]; hierarchical codecs keep the scalar
/// type they read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
}

impl Value {
    /// Textual form of the value, as used by comparisons and text sinks.
    ///
    /// [`Value::Null`] renders as the empty string.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::Utf8(s) => Cow::Borrowed(s.as_str()),
            Value::Int64(v) => Cow::Owned(v.to_string()),
            Value::Float64(v) => Cow::Owned(v.to_string()),
            Value::Bool(v) => Cow::Borrowed(if *v { "true" } else { "false" }),
        }
    }

    /// Numeric view of the value. Strings are parsed after trimming; `NaN` and infinities are
    /// not numbers here.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            Value::Int64(v) => *v as f64,
            Value::Float64(v) => *v,
            Value::Utf8(s) => s.trim().parse::<f64>().ok()?,
            Value::Null | Value::Bool(_) => return None,
        };
        v.is_finite().then_some(v)
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn approx_bytes(&self) -> usize {
        match self {
            Value::Utf8(s) => s.len(),
            _ => std::mem::size_of::<Value>(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// One record from a tabular source, keyed by field name.
///
/// Field order is the order in which fields were inserted; inserting an existing field replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty row with room for `capacity` fields.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of `field`, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    /// Returns `true` if the row carries `field`.
    pub fn contains_field(&self, field: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == field)
    }

    /// Insert or replace a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let field = field.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((field, value));
                None
            }
        }
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(name, _)| name == field)?;
        Some(self.entries.remove(idx).1)
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate `(field, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, v)| (name.as_str(), v))
    }

    /// Keep only the fields present in `selection`, preserving row order.
    pub fn project(self, selection: &HashSet<String>) -> Row {
        Row {
            entries: self
                .entries
                .into_iter()
                .filter(|(name, _)| selection.contains(name))
                .collect(),
        }
    }

    /// Build a fresh row with fields renamed according to `mappings`.
    ///
    /// Fields without a mapping keep their name.
    pub fn renamed(self, mappings: &HashMap<String, String>) -> Row {
        let mut out = Row::with_capacity(self.entries.len());
        for (name, value) in self.entries {
            match mappings.get(&name) {
                Some(target) => out.insert(target.clone(), value),
                None => out.insert(name, value),
            };
        }
        out
    }

    /// Union of two rows: `self`'s fields first, then `other`'s.
    ///
    /// `other` overwrites values on colliding fields, except for `keep`, whose value from `self`
    /// is retained.
    pub fn merged_with(&self, other: &Row, keep: &str) -> Row {
        let mut out = self.clone();
        for (name, value) in other.iter() {
            if name == keep && out.contains_field(keep) {
                continue;
            }
            out.insert(name, value.clone());
        }
        out
    }

    /// Rough number of bytes held by the row's names and values.
    pub fn approx_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|(name, value)| name.len() + value.approx_bytes())
            .sum()
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Build a [`Row`] from `field => value` pairs.
///
/// ```rust
/// use data_cruncher::row;
/// use data_cruncher::types::Value;
///
/// let r = row! { "name" => "matt", "age" => "28" };
/// assert_eq!(r.get("age"), Some(&Value::Utf8("28".to_string())));
/// ```
#[macro_export]
macro_rules! row {
    ($($field:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut r = $crate::types::Row::new();
        $( r.insert($field, $value); )*
        r
    }};
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::{Row, Value};

    fn person() -> Row {
        crate::row! { "name" => "matt", "age" => "28", "phone" => "apple iphone 6" }
    }

    #[test]
    fn as_f64_rejects_non_finite_numbers() {
        assert_eq!(Value::from(" 2.5 ").as_f64(), Some(2.5));
        assert_eq!(Value::from("NaN").as_f64(), None);
        assert_eq!(Value::from("inf").as_f64(), None);
        assert_eq!(Value::Float64(f64::NEG_INFINITY).as_f64(), None);
        assert_eq!(Value::Int64(3).as_f64(), Some(3.0));
    }

    #[test]
    fn insert_replaces_in_place_and_keeps_order() {
        let mut r = person();
        let prev = r.insert("age", "29");
        assert_eq!(prev, Some(Value::Utf8("28".to_string())));
        assert_eq!(r.field_names().collect::<Vec<_>>(), vec!["name", "age", "phone"]);
    }

    #[test]
    fn project_keeps_selected_fields_only() {
        let selection: HashSet<String> = ["phone", "name"].iter().map(|s| s.to_string()).collect();
        let r = person().project(&selection);
        assert_eq!(r.field_names().collect::<Vec<_>>(), vec!["name", "phone"]);
    }

    #[test]
    fn renamed_builds_fresh_row_and_ignores_identity_mappings() {
        let mappings: HashMap<String, String> = [("name", "first_name"), ("age", "age")]
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        let r = person().renamed(&mappings);
        assert_eq!(
            r.field_names().collect::<Vec<_>>(),
            vec!["first_name", "age", "phone"]
        );
        assert!(r.get("name").is_none());
    }

    #[test]
    fn renamed_onto_existing_field_overwrites_it() {
        let mappings: HashMap<String, String> = [("name", "age")]
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        let r = person().renamed(&mappings);
        assert_eq!(r.get("age"), Some(&Value::Utf8("28".to_string())));
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn merged_with_lets_right_overwrite_non_key_fields() {
        let left = crate::row! { "id" => "1", "x" => "a", "shared" => "left" };
        let right = crate::row! { "id" => "1", "y" => "b", "shared" => "right" };
        let merged = left.merged_with(&right, "id");
        assert_eq!(
            merged.field_names().collect::<Vec<_>>(),
            vec!["id", "x", "shared", "y"]
        );
        assert_eq!(merged.get("shared"), Some(&Value::Utf8("right".to_string())));
    }

    #[test]
    fn value_text_and_numeric_views() {
        assert_eq!(Value::Int64(3).as_text(), "3");
        assert_eq!(Value::Null.as_text(), "");
        assert_eq!(Value::Utf8(" 2.5 ".to_string()).as_f64(), Some(2.5));
        assert_eq!(Value::Utf8("abc".to_string()).as_f64(), None);
        assert_eq!(Value::Bool(true).as_f64(), None);
    }

    #[test]
    fn row_serializes_as_ordered_json_object() {
        let r = crate::row! { "b" => 1i64, "a" => Value::Null };
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"b":1,"a":null}"#);
    }
}
