//! In-memory CSV stream: the "system" output target.

use std::io::Cursor;

use crate::error::{CruncherError, CruncherResult};
use crate::types::Row;

use super::csv::{record_to_row, row_to_record};
use super::{already_open, not_open, DataSource, SourceKind};

struct BufferReader {
    reader: csv::Reader<Cursor<Vec<u8>>>,
    headers: Vec<String>,
    record: csv::StringRecord,
}

/// CSV text held in memory.
///
/// Written rows are encoded immediately; reading (or [`DataSource::buffered_contents`]) starts
/// from the beginning of the buffer after a [`DataSource::reset`].
pub struct CsvBuffer {
    name: String,
    seed: Vec<u8>,
    data: Option<Vec<u8>>,
    header: Option<Vec<String>>,
    reader: Option<BufferReader>,
}

impl CsvBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::from_text("")
    }

    /// A buffer pre-filled with CSV text (header row first).
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            name: "memory buffer".to_string(),
            seed: text.into().into_bytes(),
            data: None,
            header: None,
            reader: None,
        }
    }

    /// Override the name used in error messages.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn data(&self) -> CruncherResult<&Vec<u8>> {
        self.data.as_ref().ok_or_else(|| not_open(&self.name))
    }

    fn encode(fields: &[String]) -> CruncherResult<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(fields)?;
        writer
            .into_inner()
            .map_err(|e| CruncherError::Io(e.into_error()))
    }
}

impl Default for CsvBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for CsvBuffer {
    fn open(&mut self) -> CruncherResult<()> {
        if self.data.is_some() {
            return Err(already_open(&self.name));
        }
        self.data = Some(self.seed.clone());
        self.header = None;
        self.reader = None;
        Ok(())
    }

    fn next_row(&mut self) -> CruncherResult<Option<Row>> {
        if self.reader.is_none() {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .trim(csv::Trim::All)
                .from_reader(Cursor::new(self.data()?.clone()));
            let headers = reader.headers()?.iter().map(str::to_owned).collect();
            self.reader = Some(BufferReader {
                reader,
                headers,
                record: csv::StringRecord::new(),
            });
        }
        let Some(state) = self.reader.as_mut() else {
            return Ok(None);
        };
        if state.reader.read_record(&mut state.record)? {
            Ok(Some(record_to_row(&state.headers, &state.record)))
        } else {
            Ok(None)
        }
    }

    fn reset(&mut self) -> CruncherResult<()> {
        self.data()?;
        self.reader = None;
        Ok(())
    }

    fn close(&mut self) -> CruncherResult<()> {
        if self.data.take().is_none() {
            return Err(not_open(&self.name));
        }
        self.header = None;
        self.reader = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.data.is_some()
    }

    fn write_row(&mut self, row: &Row) -> CruncherResult<()> {
        self.data()?;
        let mut bytes = Vec::new();
        if self.header.is_none() {
            let h: Vec<String> = row.field_names().map(str::to_owned).collect();
            bytes.extend(Self::encode(&h)?);
            self.header = Some(h);
        }
        let header = self.header.as_deref().unwrap_or_default();
        bytes.extend(Self::encode(&row_to_record(header, row))?);

        let data = self.data.as_mut().ok_or_else(|| not_open(&self.name))?;
        data.extend(bytes);
        self.reader = None;
        Ok(())
    }

    fn buffered_contents(&mut self) -> CruncherResult<String> {
        String::from_utf8(self.data()?.clone()).map_err(|e| CruncherError::SourceNotReadable {
            name: self.name.clone(),
            message: e.to_string(),
        })
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Stream
    }

    fn name(&self) -> &str {
        &self.name
    }
}
