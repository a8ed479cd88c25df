//! Grouped frequency analysis over one source.

use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{CruncherError, CruncherResult};
use crate::execution::{EngineMetrics, EngineObserver, Operation, Run, SinkOutput, Timed, open_with_sink, reborrow};
use crate::sources::{DataSource, Rows};
use crate::types::{Row, Value};

use super::rule::Rule;

/// Counts or percentages.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Aggregation {
    #[default]
    Count,
    /// `100 * count / total`, rounded to `precision` decimal places when set.
    Percent { precision: Option<u32> },
}

/// One bucket's figure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Tally {
    Count(u64),
    Percent(f64),
}

impl Tally {
    pub fn as_f64(self) -> f64 {
        match self {
            Tally::Count(c) => c as f64,
            Tally::Percent(p) => p,
        }
    }

    fn to_value(self) -> Value {
        match self {
            Tally::Count(c) => Value::Int64(c.min(i64::MAX as u64) as i64),
            Tally::Percent(p) => Value::Float64(p),
        }
    }
}

/// Bucket key → tally for one rule, in first-seen order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Buckets {
    entries: Vec<(String, Tally)>,
}

impl Buckets {
    pub fn get(&self, key: &str) -> Option<Tally> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, t)| *t)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Tally)> {
        self.entries.iter().map(|(k, t)| (k.as_str(), *t))
    }
}

impl Serialize for Buckets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, t) in &self.entries {
            map.serialize_entry(k, t)?;
        }
        map.end()
    }
}

/// Result of a Statistics run.
#[derive(Debug, Clone, PartialEq)]
pub enum StatisticsOutput {
    /// Every rule carried a label: `label → buckets`, in rule order.
    Labelled(Vec<(String, Buckets)>),
    /// One bucket set per rule, in rule order.
    Ordered(Vec<Buckets>),
    /// Full contents of a stream sink.
    Buffer(String),
    /// Number of bucket rows written to a file sink.
    Written { rows: usize },
}

impl StatisticsOutput {
    /// Buckets of the `index`-th rule, whatever the result shape.
    pub fn rule(&self, index: usize) -> Option<&Buckets> {
        match self {
            StatisticsOutput::Labelled(sets) => sets.get(index).map(|(_, b)| b),
            StatisticsOutput::Ordered(sets) => sets.get(index),
            _ => None,
        }
    }

    /// Buckets for `label` in a labelled result.
    pub fn labelled(&self, label: &str) -> Option<&Buckets> {
        match self {
            StatisticsOutput::Labelled(sets) => {
                sets.iter().find(|(l, _)| l == label).map(|(_, b)| b)
            }
            _ => None,
        }
    }

    pub fn buffer(&self) -> Option<&str> {
        match self {
            StatisticsOutput::Buffer(s) => Some(s),
            _ => None,
        }
    }

    pub fn written(&self) -> Option<usize> {
        match self {
            StatisticsOutput::Written { rows } => Some(*rows),
            _ => None,
        }
    }
}

impl Serialize for StatisticsOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StatisticsOutput::Labelled(sets) => {
                let mut map = serializer.serialize_map(Some(sets.len()))?;
                for (label, buckets) in sets {
                    map.serialize_entry(label, buckets)?;
                }
                map.end()
            }
            StatisticsOutput::Ordered(sets) => {
                let mut seq = serializer.serialize_seq(Some(sets.len()))?;
                for buckets in sets {
                    seq.serialize_element(buckets)?;
                }
                seq.end()
            }
            StatisticsOutput::Buffer(s) => serializer.serialize_str(s),
            StatisticsOutput::Written { rows } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("rows", rows)?;
                map.end()
            }
        }
    }
}

/// Per-rule counters, ordered by first sighting.
#[derive(Debug, Default)]
struct Counter {
    order: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl Counter {
    /// Count one hit; returns the key's byte size when it is new.
    fn hit(&mut self, key: String) -> usize {
        if let Some(&i) = self.index.get(&key) {
            self.order[i].1 += 1;
            return 0;
        }
        let bytes = key.len();
        self.index.insert(key.clone(), self.order.len());
        self.order.push((key, 1));
        bytes
    }
}

#[derive(Debug)]
struct Tallies {
    counters: Vec<Counter>,
    total: u64,
    retained: usize,
}

impl Tallies {
    fn new(rules: usize) -> Self {
        Self {
            counters: (0..rules).map(|_| Counter::default()).collect(),
            total: 0,
            retained: 0,
        }
    }

    fn observe(mut self, rules: &[Rule], row: &Row) -> Self {
        self.total += 1;
        for (rule, counter) in rules.iter().zip(self.counters.iter_mut()) {
            let key = row.get(rule.field()).and_then(|v| rule.bucket(v));
            if let Some(key) = key {
                self.retained += counter.hit(key);
            }
        }
        self
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision.min(15) as i32);
    (value * factor).round() / factor
}

fn finalize(counter: Counter, total: u64, aggregation: Aggregation) -> Buckets {
    let entries = counter
        .order
        .into_iter()
        .map(|(key, count)| {
            let tally = match aggregation {
                Aggregation::Count => Tally::Count(count),
                Aggregation::Percent { precision } => {
                    let pct = if total == 0 {
                        0.0
                    } else {
                        100.0 * count as f64 / total as f64
                    };
                    Tally::Percent(precision.map_or(pct, |p| round_to(pct, p)))
                }
            };
            (key, tally)
        })
        .collect();
    Buckets { entries }
}

/// Statistics engine: one pass over a source, every [`Rule`] evaluated on every row.
///
/// ```rust
/// use data_cruncher::processing::{Rule, Statistics, Tally};
/// use data_cruncher::row;
/// use data_cruncher::sources::MemorySource;
///
/// # fn main() -> Result<(), data_cruncher::CruncherError> {
/// let mut src = MemorySource::new(
///     "people",
///     vec![
///         row! { "name" => "matt", "age" => "28" },
///         row! { "name" => "tony", "age" => "25" },
///         row! { "name" => "john", "age" => "15" },
///     ],
/// );
/// let out = Statistics::new()
///     .from_source(&mut src)
///     .add_rule(Rule::new("age").group_numeric(10.0)?)
///     .percentages(Some(1))
///     .execute(None)?
///     .into_data();
/// let ages = out.rule(0).unwrap();
/// assert_eq!(ages.get("10, 20"), Some(Tally::Percent(33.3)));
/// assert_eq!(ages.get("20, 30"), Some(Tally::Percent(66.7)));
/// # Ok(())
/// # }
/// ```
pub struct Statistics<'a> {
    source: Option<&'a mut dyn DataSource>,
    rules: Vec<Rule>,
    aggregation: Aggregation,
    timer: bool,
    observer: Option<Arc<dyn EngineObserver>>,
    metrics: Arc<EngineMetrics>,
}

impl<'a> Statistics<'a> {
    pub fn new() -> Self {
        Self {
            source: None,
            rules: Vec::new(),
            aggregation: Aggregation::Count,
            timer: false,
            observer: None,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    pub fn from_source(mut self, source: &'a mut dyn DataSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn add_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Report `100 * count / total` per bucket, optionally rounded.
    pub fn percentages(mut self, precision: Option<u32>) -> Self {
        self.aggregation = Aggregation::Percent { precision };
        self
    }

    /// Report raw counts per bucket (the default).
    pub fn counts(mut self) -> Self {
        self.aggregation = Aggregation::Count;
        self
    }

    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
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

    /// Run the analysis. With a `sink`, one row per bucket is written to it instead of returning
    /// the bucket sets.
    pub fn execute(
        &mut self,
        mut sink: Option<&mut dyn DataSource>,
    ) -> CruncherResult<Timed<StatisticsOutput>> {
        if self.rules.is_empty() {
            return Err(CruncherError::config("no rules configured, add one with add_rule"));
        }
        let source = self
            .source
            .as_deref_mut()
            .ok_or_else(|| CruncherError::config("no source configured, set one with from_source"))?;

        let mut run = Run::start(
            Operation::Statistics,
            self.observer.as_deref(),
            &self.metrics,
            vec![source.name().to_string()],
        );
        if let Err(e) = open_with_sink(&run, source, reborrow(&mut sink)) {
            return run.finish(Err(e), self.timer);
        }

        let rules = &self.rules;
        let tallied = tally(rules, source);
        let tallied = run.close_after(tallied, source);
        let result = match (tallied, sink) {
            (Ok(tallies), None) => {
                run.scanned(source.name(), tallies.total);
                run.retain(tallies.retained);
                Ok(shape(rules, tallies, self.aggregation))
            }
            (Ok(tallies), Some(sink)) => {
                run.scanned(source.name(), tallies.total);
                let retained = tallies.retained;
                run.retain(retained);
                let written = write_buckets(&run, rules, tallies, self.aggregation, sink);
                run.release(retained);
                written
                    .and_then(|n| run.finalize_sink(sink, n))
                    .map(|out| match out {
                        SinkOutput::Buffer(s) => StatisticsOutput::Buffer(s),
                        SinkOutput::Written(rows) => StatisticsOutput::Written { rows },
                    })
            }
            (Err(e), Some(sink)) => {
                let _ = run.close(sink);
                Err(e)
            }
            (Err(e), None) => Err(e),
        };
        run.finish(result, self.timer)
    }
}

impl Default for Statistics<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn tally(rules: &[Rule], source: &mut dyn DataSource) -> CruncherResult<Tallies> {
    let name = source.name().to_string();
    Rows::new(source)
        .enumerate()
        .try_fold(Tallies::new(rules.len()), |acc, (i, row)| {
            let row = row?;
            if i == 0 {
                if let Some(rule) = rules.iter().find(|r| !row.contains_field(r.field())) {
                    return Err(CruncherError::FieldNotFound {
                        field: rule.field().to_string(),
                        source_name: name.clone(),
                    });
                }
            }
            Ok(acc.observe(rules, &row))
        })
}

fn shape(rules: &[Rule], tallies: Tallies, aggregation: Aggregation) -> StatisticsOutput {
    let total = tallies.total;
    let sets = tallies
        .counters
        .into_iter()
        .map(|c| finalize(c, total, aggregation));
    let labels: Option<Vec<String>> = rules
        .iter()
        .map(|r| r.get_label().map(str::to_owned))
        .collect();
    match labels {
        Some(labels) => StatisticsOutput::Labelled(labels.into_iter().zip(sets).collect()),
        None => StatisticsOutput::Ordered(sets.collect()),
    }
}

/// Every bucket row has the same three columns, so rows from different rules share one header.
fn write_buckets(
    run: &Run<'_>,
    rules: &[Rule],
    tallies: Tallies,
    aggregation: Aggregation,
    sink: &mut dyn DataSource,
) -> CruncherResult<usize> {
    let tally_field = match aggregation {
        Aggregation::Count => "COUNT",
        Aggregation::Percent { .. } => "PERCENT",
    };
    let total = tallies.total;
    let mut written = 0;
    for (rule, counter) in rules.iter().zip(tallies.counters) {
        let rule_name = rule.get_label().unwrap_or(rule.field());
        for (bucket, tally) in finalize(counter, total, aggregation).entries {
            let mut row = Row::with_capacity(3);
            row.insert("RULE", rule_name);
            row.insert("BUCKET", bucket);
            row.insert(tally_field, tally.to_value());
            sink.write_row(&row)?;
            run.emitted();
            written += 1;
        }
    }
    Ok(written)
}
