//! Filtered, projected extraction from one source.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{CruncherError, CruncherResult};
use crate::execution::{EngineMetrics, EngineObserver, Operation, RowOutput, Run, Timed, open_with_sink, reborrow};
use crate::sources::{DataSource, Rows};
use crate::types::Row;

use super::condition::{Condition, Operand, Predicate};

/// Query engine.
///
/// Configure a source, an optional field selection and an optional predicate, then call
/// [`Query::execute`]. Selection applies only to rows that pass the predicate.
///
/// ```rust
/// use data_cruncher::processing::Query;
/// use data_cruncher::row;
/// use data_cruncher::sources::MemorySource;
///
/// # fn main() -> Result<(), data_cruncher::CruncherError> {
/// let mut src = MemorySource::new(
///     "phones",
///     vec![
///         row! { "name" => "matthew", "phone" => "samsung galaxy s6" },
///         row! { "name" => "matt", "phone" => "apple iphone 6" },
///     ],
/// );
/// let out = Query::new()
///     .from_source(&mut src)
///     .select(["name"])?
///     .condition("contains")?
///     .where_field("phone")
///     .value("samsung")
///     .execute(None, None)?
///     .into_data();
/// assert_eq!(out.rows().unwrap(), &[row! { "name" => "matthew" }]);
/// # Ok(())
/// # }
/// ```
pub struct Query<'a> {
    source: Option<&'a mut dyn DataSource>,
    selection: Option<HashSet<String>>,
    condition: Option<Condition>,
    field: Option<String>,
    date_format: Option<String>,
    operand: Operand,
    limit: usize,
    timer: bool,
    observer: Option<Arc<dyn EngineObserver>>,
    metrics: Arc<EngineMetrics>,
}

impl<'a> Query<'a> {
    pub fn new() -> Self {
        Self {
            source: None,
            selection: None,
            condition: None,
            field: None,
            date_format: None,
            operand: Operand::None,
            limit: 0,
            timer: false,
            observer: None,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    pub fn from_source(mut self, source: &'a mut dyn DataSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Keep only these fields on matching rows. Order is irrelevant.
    pub fn select<I, S>(mut self, fields: I) -> CruncherResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: HashSet<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(CruncherError::config("select needs at least one field"));
        }
        self.selection = Some(fields);
        Ok(self)
    }

    /// Set the condition by keyword (`"EQUALS"`, `"not between"`, ...).
    pub fn condition(self, keyword: &str) -> CruncherResult<Self> {
        let condition = keyword.parse::<Condition>()?;
        Ok(self.with_condition(condition))
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Field the condition reads.
    pub fn where_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Field the condition reads, holding dates in `format`.
    pub fn where_date(mut self, field: impl Into<String>, format: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self.date_format = Some(format.into());
        self
    }

    /// Comparison literal. Numeric literals make comparisons numeric.
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.operand = Operand::from_text(value);
        self
    }

    /// Literal set for `IN`.
    pub fn values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.operand = Operand::list(values);
        self
    }

    /// Date literal for `AFTER`/`BEFORE`/`ON`, parsed eagerly.
    pub fn date_value(mut self, value: &str, format: &str) -> CruncherResult<Self> {
        self.operand = Operand::date(value, format)?;
        if self.date_format.is_none() {
            self.date_format = Some(format.to_owned());
        }
        Ok(self)
    }

    /// `(start, end)` pair for `BETWEEN`/`NOT_BETWEEN`, parsed eagerly.
    pub fn date_range(mut self, start: &str, end: &str, format: &str) -> CruncherResult<Self> {
        self.operand = Operand::date_range(start, end, format)?;
        if self.date_format.is_none() {
            self.date_format = Some(format.to_owned());
        }
        Ok(self)
    }

    /// Stop after `limit` matches. Zero means unlimited.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Wrap the result in a timer envelope.
    pub fn timer(mut self) -> Self {
        self.timer = true;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    fn predicate(&self) -> CruncherResult<Option<Predicate>> {
        let Some(condition) = self.condition else {
            return Ok(None);
        };
        let field = self.field.clone().ok_or_else(|| {
            CruncherError::config(format!(
                "condition {condition} set without a field, use where_field"
            ))
        })?;
        Predicate::new(condition, field, self.operand.clone(), self.date_format.clone()).map(Some)
    }

    /// Run the query.
    ///
    /// Matching rows are collected in memory, or written to `sink` when one is given. `mappings`
    /// renames fields on matching rows (old name → new name).
    pub fn execute(
        &mut self,
        mut sink: Option<&mut dyn DataSource>,
        mappings: Option<&HashMap<String, String>>,
    ) -> CruncherResult<Timed<RowOutput>> {
        let predicate = self.predicate()?;
        let source = self
            .source
            .as_deref_mut()
            .ok_or_else(|| CruncherError::config("no source configured, set one with from_source"))?;

        let mut run = Run::start(
            Operation::Query,
            self.observer.as_deref(),
            &self.metrics,
            vec![source.name().to_string()],
        );
        if let Err(e) = open_with_sink(&run, source, reborrow(&mut sink)) {
            return run.finish(Err(e), self.timer);
        }

        let scan = Scan {
            predicate: predicate.as_ref(),
            selection: self.selection.as_ref(),
            mappings,
            limit: self.limit,
        };
        let scanned = scan.run(&mut run, source, reborrow(&mut sink));
        let scanned = run.close_after(scanned, source);

        let result = match (scanned, sink) {
            (Ok(Matched::Rows(rows)), _) => Ok(RowOutput::Rows(rows)),
            (Ok(Matched::Written(n)), Some(sink)) => {
                run.finalize_sink(sink, n).map(|out| out.into_row_output())
            }
            (Ok(Matched::Written(n)), None) => Ok(RowOutput::Written { rows: n }),
            (Err(e), Some(sink)) => {
                let _ = run.close(sink);
                Err(e)
            }
            (Err(e), None) => Err(e),
        };
        run.finish(result, self.timer)
    }
}

impl Default for Query<'_> {
    fn default() -> Self {
        Self::new()
    }
}

enum Matched {
    Rows(Vec<Row>),
    Written(usize),
}

struct Scan<'q> {
    predicate: Option<&'q Predicate>,
    selection: Option<&'q HashSet<String>>,
    mappings: Option<&'q HashMap<String, String>>,
    limit: usize,
}

impl Scan<'_> {
    fn shape(&self, row: Row) -> Row {
        let row = match self.selection {
            Some(selection) => row.project(selection),
            None => row,
        };
        match self.mappings {
            Some(mappings) => row.renamed(mappings),
            None => row,
        }
    }

    fn run(
        &self,
        run: &mut Run<'_>,
        source: &mut dyn DataSource,
        mut sink: Option<&mut dyn DataSource>,
    ) -> CruncherResult<Matched> {
        let name = source.name().to_string();
        let mut rows = Vec::new();
        let mut matched = 0usize;
        let mut scanned = 0u64;

        for (i, row) in Rows::new(source).enumerate() {
            let row = row?;
            scanned += 1;
            if i == 0 {
                if let Some(p) = self.predicate {
                    if !row.contains_field(p.field()) {
                        return Err(CruncherError::FieldNotFound {
                            field: p.field().to_string(),
                            source_name: name,
                        });
                    }
                }
            }
            // A row counts toward retained memory from the moment it is read until it is
            // dropped or handed to the sink.
            let bytes = row.approx_bytes();
            run.retain(bytes);
            if self.predicate.is_some_and(|p| !p.matches(&row)) {
                run.release(bytes);
                continue;
            }

            let row = self.shape(row);
            match sink.as_deref_mut() {
                Some(sink) => {
                    sink.write_row(&row)?;
                    run.release(bytes);
                }
                None => rows.push(row),
            }
            run.emitted();
            matched += 1;
            if self.limit > 0 && matched >= self.limit {
                break;
            }
        }

        run.scanned(&name, scanned);
        Ok(match sink {
            Some(_) => Matched::Written(matched),
            None => Matched::Rows(rows),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::Query;
    use crate::error::CruncherError;
    use crate::row;
    use crate::sources::{CsvBuffer, DataSource, MemorySource};

    fn people() -> MemorySource {
        MemorySource::new(
            "people",
            vec![
                row! { "name" => "matt", "age" => "28", "dob" => "24/11/1987" },
                row! { "name" => "matthew", "age" => "35", "dob" => "01/12/1980" },
                row! { "name" => "tony", "age" => "25", "dob" => "02/05/1990" },
                row! { "name" => "john", "age" => "15", "dob" => "01/01/2000" },
            ],
        )
    }

    fn names(out: &crate::execution::RowOutput) -> Vec<String> {
        out.rows()
            .unwrap()
            .iter()
            .map(|r| r.get("name").unwrap().as_text().into_owned())
            .collect()
    }

    #[test]
    fn numeric_greater_coerces_row_values() {
        let mut src = people();
        let out = Query::new()
            .from_source(&mut src)
            .condition("greater")
            .unwrap()
            .where_field("age")
            .value("26")
            .execute(None, None)
            .unwrap()
            .into_data();
        assert_eq!(names(&out), vec!["matt", "matthew"]);
        assert!(!src.is_open());
    }

    #[test]
    fn no_condition_passes_every_row_and_limit_caps() {
        let mut src = people();
        let out = Query::new()
            .from_source(&mut src)
            .limit(2)
            .execute(None, None)
            .unwrap()
            .into_data();
        assert_eq!(names(&out), vec!["matt", "matthew"]);
        assert!(!src.is_open());
    }

    #[test]
    fn date_between_is_exclusive() {
        let mut src = people();
        let out = Query::new()
            .from_source(&mut src)
            .condition("BETWEEN")
            .unwrap()
            .where_date("dob", "%d/%m/%Y")
            .date_range("24/11/1987", "01/01/2000", "%d/%m/%Y")
            .unwrap()
            .execute(None, None)
            .unwrap()
            .into_data();
        assert_eq!(names(&out), vec!["tony"]);
    }

    #[test]
    fn mappings_rename_selected_fields() {
        let mut src = people();
        let mappings = HashMap::from([
            ("name".to_string(), "first_name".to_string()),
            ("age".to_string(), "age".to_string()),
        ]);
        let out = Query::new()
            .from_source(&mut src)
            .select(["name", "age"])
            .unwrap()
            .condition("EQUALS")
            .unwrap()
            .where_field("name")
            .value("tony")
            .execute(None, Some(&mappings))
            .unwrap()
            .into_data();
        assert_eq!(out.rows().unwrap(), &[row! { "first_name" => "tony", "age" => "25" }]);
    }

    #[test]
    fn missing_where_field_fails_on_first_row() {
        let mut src = people();
        let err = Query::new()
            .from_source(&mut src)
            .condition("EQUALS")
            .unwrap()
            .where_field("shoe_size")
            .value("9")
            .execute(None, None)
            .unwrap_err();
        assert!(matches!(
            err,
            CruncherError::FieldNotFound { ref field, ref source_name } if field == "shoe_size" && source_name == "people"
        ));
        assert!(!src.is_open());
    }

    #[test]
    fn bad_configuration_is_rejected_eagerly() {
        assert!(matches!(
            Query::new().condition("LIKE").err().unwrap(),
            CruncherError::InvalidConfiguration { .. }
        ));
        assert!(Query::new().select(Vec::<String>::new()).is_err());
        assert!(Query::new().date_value("not a date", "%d/%m/%Y").is_err());

        let mut src = people();
        let err = Query::new()
            .from_source(&mut src)
            .condition("AFTER")
            .unwrap()
            .where_field("dob")
            .value("01/01/1990")
            .execute(None, None)
            .unwrap_err();
        assert!(matches!(err, CruncherError::InvalidConfiguration { .. }));
        assert!(!src.is_open());
    }

    #[test]
    fn stream_sink_returns_buffer() {
        let mut src = people();
        let mut sink = CsvBuffer::new();
        let out = Query::new()
            .from_source(&mut src)
            .select(["name"])
            .unwrap()
            .condition("LESS")
            .unwrap()
            .where_field("age")
            .value("26")
            .execute(Some(&mut sink), None)
            .unwrap()
            .into_data();
        assert_eq!(out.buffer(), Some("name\ntony\njohn\n"));
        assert!(!sink.is_open());
    }

    #[test]
    fn timer_wraps_output() {
        let mut src = people();
        let timed = Query::new()
            .from_source(&mut src)
            .timer()
            .execute(None, None)
            .unwrap();
        assert!(timed.timer.is_some());
        assert!(timed.timer.unwrap().memory > 0);
        let json = serde_json::to_value(&timed).unwrap();
        assert_eq!(json["data"].as_array().unwrap().len(), 4);
        assert!(json["timer"]["elapsed"].is_u64());
    }

    #[test]
    fn opening_twice_is_an_error() {
        let mut src = people();
        src.open().unwrap();
        let err = Query::new()
            .from_source(&mut src)
            .execute(None, None)
            .unwrap_err();
        assert!(matches!(err, CruncherError::ResourceAlreadyOpen { .. }));
    }
}
