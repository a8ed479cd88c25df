//! `data-cruncher` is a small row-streaming toolkit for tabular data.
//!
//! Rows come from sources implementing [`sources::DataSource`] (CSV files, JSON files, in-memory
//! buffers) and flow through one of three engines:
//!
//! - [`processing::Query`]: filter rows by a single condition, project and rename fields, cap
//!   the result count
//! - [`processing::Merger`]: nested-loop equality join of several sources on one field
//! - [`processing::Statistics`]: group field values (exact, numeric bucket, date, regex) and
//!   report counts or percentages
//!
//! Every engine opens the sources it is given, streams them without materializing whole files,
//! and closes them again on every exit path. Results are returned in memory, or written to a sink
//! source. Runs can be timed and observed.
//!
//! ## Quick example: query a CSV file
//!
//! ```no_run
//! use data_cruncher::processing::Query;
//! use data_cruncher::sources::CsvFile;
//!
//! # fn main() -> Result<(), data_cruncher::CruncherError> {
//! let mut people = CsvFile::reader("people.csv");
//! let out = Query::new()
//!     .from_source(&mut people)
//!     .select(["name", "email"])?
//!     .condition("CONTAINS")?
//!     .where_field("phone")
//!     .value("samsung")
//!     .execute(None, None)?
//!     .into_data();
//! println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! ## Quick example: dates and percentages
//!
//! Date formats use `strftime` syntax.
//!
//! ```no_run
//! use data_cruncher::processing::{Rule, Statistics};
//! use data_cruncher::sources::CsvFile;
//!
//! # fn main() -> Result<(), data_cruncher::CruncherError> {
//! let mut people = CsvFile::reader("people.csv");
//! let out = Statistics::new()
//!     .from_source(&mut people)
//!     .add_rule(Rule::new("dob").group_date("%d/%m/%Y", "%Y")?.label("year"))
//!     .add_rule(Rule::new("age").group_numeric(10.0)?.label("ages"))
//!     .percentages(Some(1))
//!     .timer()
//!     .execute(None)?;
//! println!("{}", serde_json::to_string(&out).unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`sources`]: the source contract, CSV/JSON/in-memory codecs, and a source factory
//! - [`processing`]: the Query, Merger and Statistics engines plus the condition evaluator
//! - [`execution`]: run plumbing shared by the engines (timer envelope, observers, metrics)
//! - [`config`]: JSON job definitions
//! - [`types`]: [`types::Row`] and [`types::Value`]
//! - [`error`]: error types used across the crate

pub mod config;
pub mod error;
pub mod execution;
pub mod processing;
pub mod sources;
pub mod types;

pub use error::{CruncherError, CruncherResult};
pub use processing::{Merger, Query, Rule, Statistics};
