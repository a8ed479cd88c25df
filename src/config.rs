//! JSON job definitions.
//!
//! A job names one engine run: its sources, its settings, and optionally an output sink.
//!
//! ```rust
//! use data_cruncher::config::JobConfig;
//!
//! let job: JobConfig = r#"{
//!     "job": "statistics",
//!     "source": { "path": "people.csv" },
//!     "rules": [ { "field": "age", "group": "numeric", "width": 10, "label": "ages" } ],
//!     "percentages": true,
//!     "precision": 1
//! }"#
//! .parse()
//! .unwrap();
//! assert!(matches!(job, JobConfig::Statistics(_)));
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{CruncherError, CruncherResult};
use crate::execution::{EngineObserver, TracingObserver};
use crate::processing::{Condition, Merger, Query, Rule, Statistics};
use crate::sources::{
    generate, generate_glob, generate_path, CsvFile, CsvOptions, DataSource, JsonFile, OpenMode,
    SourceFormat, SourceTarget,
};

/// One runnable job.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "job", rename_all = "lowercase")]
pub enum JobConfig {
    Query(QueryJob),
    Merge(MergeJob),
    Statistics(StatisticsJob),
}

/// Where a job reads rows from.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub path: PathBuf,
    /// Inferred from the extension when absent.
    #[serde(default)]
    pub format: Option<SourceFormat>,
    /// Dot path of the record array inside a JSON document.
    #[serde(default)]
    pub records: Option<String>,
    /// Single-byte CSV delimiter.
    #[serde(default)]
    pub delimiter: Option<char>,
}

/// Where a job writes rows to. Without a `path`, output goes to an in-memory CSV buffer whose
/// contents become the job result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub format: Option<SourceFormat>,
}

/// A comparison literal: text, number, or a list (for `IN`, or a `[start, end]` date pair).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ValueConfig {
    Text(String),
    Number(f64),
    List(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryJob {
    pub source: SourceConfig,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default, rename = "where")]
    pub where_field: Option<String>,
    #[serde(default)]
    pub value: Option<ValueConfig>,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub mappings: Option<HashMap<String, String>>,
    #[serde(default)]
    pub timer: bool,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeJob {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Glob expanded to additional sources, in sorted path order.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Format for the `pattern` matches; inferred per file when absent.
    #[serde(default)]
    pub format: Option<SourceFormat>,
    pub on: String,
    #[serde(default)]
    pub timer: bool,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

/// A grouping rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "group", rename_all = "lowercase")]
pub enum RuleConfig {
    Exact {
        field: String,
        #[serde(default)]
        label: Option<String>,
    },
    Numeric {
        field: String,
        #[serde(default)]
        label: Option<String>,
        width: f64,
    },
    Date {
        field: String,
        #[serde(default)]
        label: Option<String>,
        input: String,
        output: String,
    },
    Regex {
        field: String,
        #[serde(default)]
        label: Option<String>,
        pattern: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatisticsJob {
    pub source: SourceConfig,
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub percentages: bool,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub timer: bool,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

impl JobConfig {
    /// Read a job from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> CruncherResult<Self> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
    }

    /// Run the job, logging engine events through `tracing`.
    pub fn run(&self) -> CruncherResult<serde_json::Value> {
        self.run_with(Arc::new(TracingObserver))
    }

    /// Run the job, reporting engine events to `observer`.
    ///
    /// The result is the engine output as JSON: rows, bucket sets, a sink buffer, or
    /// `{"rows": n}` for a file sink, wrapped in `{"data", "timer"}` when timing was requested.
    pub fn run_with(&self, observer: Arc<dyn EngineObserver>) -> CruncherResult<serde_json::Value> {
        match self {
            JobConfig::Query(job) => job.run(observer),
            JobConfig::Merge(job) => job.run(observer),
            JobConfig::Statistics(job) => job.run(observer),
        }
    }
}

impl FromStr for JobConfig {
    type Err = CruncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

impl SourceConfig {
    /// Build the unopened source.
    pub fn build(&self) -> CruncherResult<Box<dyn DataSource>> {
        let format = match self.format {
            Some(f) => f,
            None => SourceFormat::infer(&self.path)?,
        };
        match format {
            SourceFormat::Csv | SourceFormat::Tsv => {
                let mut options = match format {
                    SourceFormat::Tsv => CsvOptions::tab_separated(),
                    _ => CsvOptions::default(),
                };
                if let Some(d) = self.delimiter {
                    options.delimiter = u8::try_from(d).map_err(|_| {
                        CruncherError::config(format!("delimiter '{d}' is not a single byte"))
                    })?;
                }
                Ok(Box::new(CsvFile::reader(&self.path).with_options(options)))
            }
            SourceFormat::Json => {
                let file = JsonFile::reader(&self.path);
                Ok(Box::new(match &self.records {
                    Some(records) => file.with_records_at(records.clone()),
                    None => file,
                }))
            }
        }
    }
}

impl OutputConfig {
    /// Build the unopened sink.
    pub fn build(&self) -> CruncherResult<Box<dyn DataSource>> {
        match &self.path {
            Some(path) => generate_path(path, self.format, OpenMode::Write),
            None => generate(
                self.format.unwrap_or(SourceFormat::Csv),
                SourceTarget::System,
                OpenMode::Write,
            ),
        }
    }
}

impl ValueConfig {
    fn to_text(&self) -> String {
        match self {
            ValueConfig::Text(s) => s.clone(),
            ValueConfig::Number(n) => n.to_string(),
            ValueConfig::List(items) => items.join(","),
        }
    }
}

impl RuleConfig {
    pub fn build(&self) -> CruncherResult<Rule> {
        let (rule, label) = match self {
            RuleConfig::Exact { field, label } => (Rule::new(field), label),
            RuleConfig::Numeric {
                field,
                label,
                width,
            } => (Rule::new(field).group_numeric(*width)?, label),
            RuleConfig::Date {
                field,
                label,
                input,
                output,
            } => (Rule::new(field).group_date(input, output)?, label),
            RuleConfig::Regex {
                field,
                label,
                pattern,
            } => (Rule::new(field).group_regex(pattern)?, label),
        };
        Ok(match label {
            Some(label) => rule.label(label),
            None => rule,
        })
    }
}

fn sink_of(sink: &mut Option<Box<dyn DataSource>>) -> Option<&mut dyn DataSource> {
    match sink {
        Some(s) => {
            let s: &mut dyn DataSource = s.as_mut();
            Some(s)
        }
        None => None,
    }
}

fn build_output(output: &Option<OutputConfig>) -> CruncherResult<Option<Box<dyn DataSource>>> {
    output.as_ref().map(OutputConfig::build).transpose()
}

impl QueryJob {
    fn run(&self, observer: Arc<dyn EngineObserver>) -> CruncherResult<serde_json::Value> {
        let mut source = self.source.build()?;
        let mut sink = build_output(&self.output)?;

        let mut query = Query::new()
            .from_source(source.as_mut())
            .limit(self.limit)
            .with_observer(observer);
        if let Some(fields) = &self.fields {
            query = query.select(fields.iter().cloned())?;
        }
        if let Some(keyword) = &self.condition {
            let condition: Condition = keyword.parse()?;
            query = query.with_condition(condition);
            if let Some(field) = &self.where_field {
                query = match &self.date_format {
                    Some(format) => query.where_date(field, format),
                    None => query.where_field(field),
                };
            }
            query = match (&self.value, condition.is_date(), &self.date_format) {
                (Some(ValueConfig::List(pair)), true, Some(format)) if pair.len() == 2 => {
                    query.date_range(&pair[0], &pair[1], format)?
                }
                (Some(value), true, Some(format)) => query.date_value(&value.to_text(), format)?,
                (Some(ValueConfig::List(items)), _, _) => query.values(items),
                (Some(value), _, _) => query.value(value.to_text()),
                (None, _, _) => query,
            };
        }
        if self.timer {
            query = query.timer();
        }

        let out = query.execute(sink_of(&mut sink), self.mappings.as_ref())?;
        Ok(serde_json::to_value(&out)?)
    }
}

impl MergeJob {
    fn run(&self, observer: Arc<dyn EngineObserver>) -> CruncherResult<serde_json::Value> {
        let mut sources = self
            .sources
            .iter()
            .map(SourceConfig::build)
            .collect::<CruncherResult<Vec<_>>>()?;
        if let Some(pattern) = &self.pattern {
            sources.extend(generate_glob(pattern, self.format)?);
        }
        let mut sink = build_output(&self.output)?;

        let mut merger = Merger::new()
            .from_sources(&mut sources)
            .on(self.on.clone())
            .with_observer(observer);
        if self.timer {
            merger = merger.timer();
        }
        let out = merger.execute(sink_of(&mut sink))?;
        Ok(serde_json::to_value(&out)?)
    }
}

impl StatisticsJob {
    fn run(&self, observer: Arc<dyn EngineObserver>) -> CruncherResult<serde_json::Value> {
        let mut source = self.source.build()?;
        let mut sink = build_output(&self.output)?;

        let mut stats = Statistics::new()
            .from_source(source.as_mut())
            .with_observer(observer);
        for rule in &self.rules {
            stats = stats.add_rule(rule.build()?);
        }
        if self.percentages {
            stats = stats.percentages(self.precision);
        }
        if self.timer {
            stats = stats.timer();
        }
        let out = stats.execute(sink_of(&mut sink))?;
        Ok(serde_json::to_value(&out)?)
    }
}
