//! The tabular-source contract and its concrete implementations.
//!
//! Every source and sink implements [`DataSource`]. The lifecycle is strict:
//!
//! - `unopened → open → (producing rows)* → closed`
//! - [`DataSource::open`] on an already-open source fails with
//!   [`CruncherError::ResourceAlreadyOpen`]
//! - [`DataSource::reset`] rewinds an open source to its first row without releasing the resource
//!
//! Concrete codecs:
//! - [`csv::CsvFile`]: delimited text file
//! - [`json::JsonFile`]: newline-delimited JSON, or a JSON document with records at a dot path
//! - [`buffer::CsvBuffer`]: in-memory CSV stream sink
//! - [`memory::MemorySource`]: vector-backed rows
//!
//! Use [`factory::generate`] to build a boxed source from a format/target pair.

pub mod buffer;
pub mod csv;
pub mod factory;
pub mod json;
pub mod memory;

use std::fmt;

use crate::error::{CruncherError, CruncherResult};
use crate::types::Row;

pub use buffer::CsvBuffer;
pub use csv::{CsvFile, CsvOptions};
pub use factory::{generate, generate_glob, generate_path, SourceFormat, SourceTarget};
pub use json::{JsonFile, JsonLayout};
pub use memory::MemorySource;

/// How a caller should materialize output written to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Backed by a file on disk; output is reported as a row count.
    File,
    /// Backed by an in-memory buffer; output is read back as bytes.
    Stream,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::File => f.write_str("file"),
            SourceKind::Stream => f.write_str("stream"),
        }
    }
}

/// Whether a file-backed source reads rows or writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read rows from an existing resource.
    #[default]
    Read,
    /// Create/truncate the resource and append rows to it.
    Write,
}

/// Contract implemented by every tabular source and sink.
///
/// Sources are single-cursor and not thread-safe; one engine owns a source for the duration of
/// one `execute` call.
pub trait DataSource {
    /// Acquire the underlying resource.
    fn open(&mut self) -> CruncherResult<()>;

    /// Produce the next row, or `None` once the sequence is exhausted.
    ///
    /// Calling again after exhaustion keeps returning `None` until [`DataSource::reset`].
    fn next_row(&mut self) -> CruncherResult<Option<Row>>;

    /// Rewind the cursor to the first row without releasing the resource.
    fn reset(&mut self) -> CruncherResult<()>;

    /// Release the resource. Closing a source that is not open fails with
    /// [`CruncherError::ResourceNotOpen`].
    fn close(&mut self) -> CruncherResult<()>;

    /// Whether the source currently holds an open resource.
    fn is_open(&self) -> bool;

    /// Append one row. The first written row establishes the field order.
    fn write_row(&mut self, _row: &Row) -> CruncherResult<()> {
        Err(CruncherError::Unsupported {
            name: self.name().to_string(),
            operation: "write_row",
        })
    }

    /// Full buffered contents of a [`SourceKind::Stream`] sink, read from the current cursor.
    fn buffered_contents(&mut self) -> CruncherResult<String> {
        Err(CruncherError::Unsupported {
            name: self.name().to_string(),
            operation: "buffered_contents",
        })
    }

    /// Backing kind of this source.
    fn kind(&self) -> SourceKind;

    /// Identifier used in error messages.
    fn name(&self) -> &str;
}

/// Iterator adapter over the remaining rows of a source.
///
/// ```rust
/// use data_cruncher::row;
/// use data_cruncher::sources::{DataSource, MemorySource, Rows};
///
/// # fn main() -> Result<(), data_cruncher::CruncherError> {
/// let mut src = MemorySource::new("people", vec![row! { "name" => "matt" }, row! { "name" => "tony" }]);
/// src.open()?;
/// let rows = Rows::new(&mut src).collect::<Result<Vec<_>, _>>()?;
/// assert_eq!(rows.len(), 2);
/// src.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Rows<'a> {
    source: &'a mut dyn DataSource,
    done: bool,
}

impl<'a> Rows<'a> {
    pub fn new(source: &'a mut dyn DataSource) -> Self {
        Self {
            source,
            done: false,
        }
    }
}

impl Iterator for Rows<'_> {
    type Item = CruncherResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.source.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

pub(crate) fn not_open(name: &str) -> CruncherError {
    CruncherError::ResourceNotOpen {
        name: name.to_string(),
    }
}

pub(crate) fn already_open(name: &str) -> CruncherError {
    CruncherError::ResourceAlreadyOpen {
        name: name.to_string(),
    }
}
