//! JSON source/sink.
//!
//! Supported inputs:
//! - Newline-delimited JSON (NDJSON): `{"a":1}\n{"a":2}\n`, streamed one line at a time
//! - A JSON document holding an array of objects, either at the root (`[{"a":1}]`) or at a dot
//!   path (`{"data":{"people":[...]}}` with records at `data.people`)
//!
//! Nested objects flatten to dot-path field names (`user.name`). Arrays are kept as their JSON
//! text. A document layout is parsed whole on open; NDJSON is never materialized.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde_json::Map;

use crate::error::{CruncherError, CruncherResult};
use crate::types::{Row, Value};

use super::{already_open, not_open, DataSource, OpenMode, SourceKind};

/// Where records live inside a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JsonLayout {
    /// Document if the first non-whitespace byte is `[`, NDJSON otherwise.
    #[default]
    Auto,
    /// One object per line.
    Lines,
    /// A single document; records are the array at `records` (dot path), or the root when `None`.
    Document { records: Option<String> },
}

enum JsonState {
    Closed,
    Lines {
        reader: BufReader<File>,
        line: String,
        line_no: usize,
    },
    Document {
        records: Vec<Row>,
        cursor: usize,
    },
    Writing {
        writer: BufWriter<File>,
        header: Option<Vec<String>>,
    },
}

/// A JSON file source (read) or NDJSON sink (write).
pub struct JsonFile {
    path: PathBuf,
    name: String,
    mode: OpenMode,
    layout: JsonLayout,
    state: JsonState,
}

impl JsonFile {
    /// Create an unopened JSON source.
    pub fn new(path: impl AsRef<Path>, mode: OpenMode) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: path.display().to_string(),
            path,
            mode,
            layout: JsonLayout::default(),
            state: JsonState::Closed,
        }
    }

    /// Unopened JSON source in read mode.
    pub fn reader(path: impl AsRef<Path>) -> Self {
        Self::new(path, OpenMode::Read)
    }

    /// Unopened NDJSON sink in write mode.
    pub fn writer(path: impl AsRef<Path>) -> Self {
        Self::new(path, OpenMode::Write)
    }

    /// Read records from the array at `path` inside a JSON document.
    pub fn with_records_at(mut self, path: impl Into<String>) -> Self {
        self.layout = JsonLayout::Document {
            records: Some(path.into()),
        };
        self
    }

    /// Override the layout.
    pub fn with_layout(mut self, layout: JsonLayout) -> Self {
        self.layout = layout;
        self
    }

    fn unreadable(&self, message: impl std::fmt::Display) -> CruncherError {
        CruncherError::SourceNotReadable {
            name: self.name.clone(),
            message: message.to_string(),
        }
    }

    fn open_reader(&self) -> CruncherResult<JsonState> {
        let file = File::open(&self.path).map_err(|e| self.unreadable(e))?;
        let mut reader = BufReader::new(file);

        let layout = match &self.layout {
            JsonLayout::Auto => {
                let first = reader
                    .fill_buf()
                    .map_err(|e| self.unreadable(e))?
                    .iter()
                    .copied()
                    .find(|b| !b.is_ascii_whitespace());
                if first == Some(b'[') {
                    JsonLayout::Document { records: None }
                } else {
                    JsonLayout::Lines
                }
            }
            other => other.clone(),
        };

        match layout {
            JsonLayout::Document { records } => {
                let doc: serde_json::Value =
                    serde_json::from_reader(reader).map_err(|e| self.unreadable(e))?;
                let records = self.records_of(&doc, records.as_deref())?;
                Ok(JsonState::Document { records, cursor: 0 })
            }
            _ => Ok(JsonState::Lines {
                reader,
                line: String::new(),
                line_no: 0,
            }),
        }
    }

    fn records_of(&self, doc: &serde_json::Value, path: Option<&str>) -> CruncherResult<Vec<Row>> {
        let target = match path {
            None => Some(doc),
            Some(p) => p.split('.').try_fold(doc, |cur, segment| cur.get(segment)),
        };
        let items = target.and_then(|v| v.as_array()).ok_or_else(|| {
            self.unreadable(format!(
                "no array of records at '{}'",
                path.unwrap_or("<root>")
            ))
        })?;
        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                item.as_object()
                    .map(flatten_object)
                    .ok_or_else(|| self.unreadable(format!("record {} is not a json object", idx + 1)))
            })
            .collect()
    }
}

/// Flatten a JSON object into a row, joining nested keys with `.`.
pub(crate) fn flatten_object(obj: &Map<String, serde_json::Value>) -> Row {
    let mut row = Row::with_capacity(obj.len());
    flatten_into(&mut row, None, obj);
    row
}

fn flatten_into(row: &mut Row, prefix: Option<&str>, obj: &Map<String, serde_json::Value>) {
    for (key, value) in obj {
        let name = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            serde_json::Value::Object(inner) => flatten_into(row, Some(&name), inner),
            other => {
                row.insert(name, json_to_value(other));
            }
        }
    }
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::String(s) => Value::Utf8(s.clone()),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
        },
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Utf8(v.to_string()),
    }
}

impl DataSource for JsonFile {
    fn open(&mut self) -> CruncherResult<()> {
        if self.is_open() {
            return Err(already_open(&self.name));
        }
        self.state = match self.mode {
            OpenMode::Read => self.open_reader()?,
            OpenMode::Write => {
                let file = File::create(&self.path).map_err(|e| self.unreadable(e))?;
                JsonState::Writing {
                    writer: BufWriter::new(file),
                    header: None,
                }
            }
        };
        Ok(())
    }

    fn next_row(&mut self) -> CruncherResult<Option<Row>> {
        match &mut self.state {
            JsonState::Closed => Err(not_open(&self.name)),
            JsonState::Writing { .. } => Err(CruncherError::Unsupported {
                name: self.name.clone(),
                operation: "next_row on a write-mode file",
            }),
            JsonState::Document { records, cursor } => {
                let row = records.get(*cursor).cloned();
                if row.is_some() {
                    *cursor += 1;
                }
                Ok(row)
            }
            JsonState::Lines {
                reader,
                line,
                line_no,
            } => loop {
                line.clear();
                if reader.read_line(line)? == 0 {
                    return Ok(None);
                }
                *line_no += 1;
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                let value: serde_json::Value = serde_json::from_str(text)?;
                return match value.as_object() {
                    Some(obj) => Ok(Some(flatten_object(obj))),
                    None => Err(CruncherError::SourceNotReadable {
                        name: self.name.clone(),
                        message: format!("line {line_no} is not a json object"),
                    }),
                };
            },
        }
    }

    fn reset(&mut self) -> CruncherResult<()> {
        match &mut self.state {
            JsonState::Closed => Err(not_open(&self.name)),
            JsonState::Lines {
                reader, line_no, ..
            } => {
                reader.seek(SeekFrom::Start(0))?;
                *line_no = 0;
                Ok(())
            }
            JsonState::Document { cursor, .. } => {
                *cursor = 0;
                Ok(())
            }
            JsonState::Writing { writer, .. } => {
                writer.flush()?;
                Ok(())
            }
        }
    }

    fn close(&mut self) -> CruncherResult<()> {
        match std::mem::replace(&mut self.state, JsonState::Closed) {
            JsonState::Closed => Err(not_open(&self.name)),
            JsonState::Writing { mut writer, .. } => {
                writer.flush()?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        !matches!(self.state, JsonState::Closed)
    }

    fn write_row(&mut self, row: &Row) -> CruncherResult<()> {
        match &mut self.state {
            JsonState::Closed => Err(not_open(&self.name)),
            JsonState::Writing { writer, header } => {
                if header.is_none() {
                    *header = Some(row.field_names().map(str::to_owned).collect());
                }
                let header = header.as_deref().unwrap_or_default();
                let ordered: Row = header
                    .iter()
                    .map(|f| (f.clone(), row.get(f).cloned().unwrap_or(Value::Null)))
                    .collect();
                serde_json::to_writer(&mut *writer, &ordered)?;
                writer.write_all(b"\n")?;
                Ok(())
            }
            _ => Err(CruncherError::Unsupported {
                name: self.name.clone(),
                operation: "write_row on a read-mode file",
            }),
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn name(&self) -> &str {
        &self.name
    }
}
