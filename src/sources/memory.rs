//! Vector-backed source, mostly for programmatic callers and tests.

use crate::error::CruncherResult;
use crate::types::Row;

use super::{already_open, not_open, DataSource, SourceKind};

/// Rows held in a `Vec`.
///
/// Writing appends; [`DataSource::buffered_contents`] renders the rows as NDJSON.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    rows: Vec<Row>,
    cursor: usize,
    open: bool,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
            cursor: 0,
            open: false,
        }
    }

    /// Empty source, typically used as a sink.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// All rows currently held, regardless of cursor position.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl DataSource for MemorySource {
    fn open(&mut self) -> CruncherResult<()> {
        if self.open {
            return Err(already_open(&self.name));
        }
        self.open = true;
        self.cursor = 0;
        Ok(())
    }

    fn next_row(&mut self) -> CruncherResult<Option<Row>> {
        if !self.open {
            return Err(not_open(&self.name));
        }
        let row = self.rows.get(self.cursor).cloned();
        if row.is_some() {
            self.cursor += 1;
        }
        Ok(row)
    }

    fn reset(&mut self) -> CruncherResult<()> {
        if !self.open {
            return Err(not_open(&self.name));
        }
        self.cursor = 0;
        Ok(())
    }

    fn close(&mut self) -> CruncherResult<()> {
        if !self.open {
            return Err(not_open(&self.name));
        }
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write_row(&mut self, row: &Row) -> CruncherResult<()> {
        if !self.open {
            return Err(not_open(&self.name));
        }
        self.rows.push(row.clone());
        Ok(())
    }

    fn buffered_contents(&mut self) -> CruncherResult<String> {
        if !self.open {
            return Err(not_open(&self.name));
        }
        let mut out = String::new();
        for row in &self.rows[self.cursor.min(self.rows.len())..] {
            out.push_str(&serde_json::to_string(row)?);
            out.push('\n');
        }
        Ok(out)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Stream
    }

    fn name(&self) -> &str {
        &self.name
    }
}
