//! The three engines: [`Query`], [`Merger`] and [`Statistics`].
//!
//! Each engine borrows its sources for one `execute` call, opens them, streams rows through a
//! single pass (or a nested pass for [`Merger`]) and closes every source it opened, on success
//! and on failure alike.
//!
//! ## Example: query → statistics
//!
//! ```rust
//! use data_cruncher::processing::{Query, Rule, Statistics, Tally};
//! use data_cruncher::row;
//! use data_cruncher::sources::MemorySource;
//!
//! # fn main() -> Result<(), data_cruncher::CruncherError> {
//! let mut people = MemorySource::new(
//!     "people",
//!     vec![
//!         row! { "name" => "matt", "phone" => "apple iphone 6" },
//!         row! { "name" => "matthew", "phone" => "samsung galaxy s6" },
//!         row! { "name" => "tony", "phone" => "samsung note 7" },
//!     ],
//! );
//!
//! // Keep the samsung owners.
//! let rows = Query::new()
//!     .from_source(&mut people)
//!     .condition("CONTAINS")?
//!     .where_field("phone")
//!     .value("samsung")
//!     .execute(None, None)?
//!     .into_data()
//!     .into_rows()
//!     .unwrap_or_default();
//! assert_eq!(rows.len(), 2);
//!
//! // Group everyone by phone maker.
//! let stats = Statistics::new()
//!     .from_source(&mut people)
//!     .add_rule(Rule::new("phone").group_regex(r"^(\w+)")?.label("company"))
//!     .execute(None)?
//!     .into_data();
//! assert_eq!(stats.labelled("company").and_then(|b| b.get("samsung")), Some(Tally::Count(2)));
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod merger;
pub mod query;
pub mod rule;
pub mod statistics;

pub use condition::{Condition, Operand, Predicate, parse_date};
pub use merger::Merger;
pub use query::Query;
pub use rule::{Grouping, Rule};
pub use statistics::{Aggregation, Buckets, Statistics, StatisticsOutput, Tally};
