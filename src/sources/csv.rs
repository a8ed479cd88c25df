//! Delimited-text file source/sink.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{CruncherError, CruncherResult};
use crate::types::{Row, Value};

use super::{already_open, not_open, DataSource, OpenMode, SourceKind};

/// Options for reading and writing delimited text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Trim surrounding whitespace from headers and values.
    pub trim: bool,
}

impl CsvOptions {
    /// Defaults with a tab delimiter.
    pub fn tab_separated() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::default()
        }
    }
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            trim: true,
        }
    }
}

enum CsvState {
    Closed,
    Reading {
        reader: csv::Reader<File>,
        headers: Vec<String>,
        start: csv::Position,
        record: csv::StringRecord,
    },
    Writing {
        writer: csv::Writer<File>,
        header: Option<Vec<String>>,
    },
}

/// A CSV file with a header row.
///
/// In [`OpenMode::Read`] the header row names the fields of every produced [`Row`], and
/// [`DataSource::reset`] seeks back to the first data record without reopening the file.
/// In [`OpenMode::Write`] the file is truncated on open and the first written row establishes
/// the header.
pub struct CsvFile {
    path: PathBuf,
    name: String,
    mode: OpenMode,
    options: CsvOptions,
    state: CsvState,
}

impl CsvFile {
    /// Create an unopened CSV source.
    pub fn new(path: impl AsRef<Path>, mode: OpenMode) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: path.display().to_string(),
            path,
            mode,
            options: CsvOptions::default(),
            state: CsvState::Closed,
        }
    }

    /// Unopened CSV source in read mode.
    pub fn reader(path: impl AsRef<Path>) -> Self {
        Self::new(path, OpenMode::Read)
    }

    /// Unopened CSV sink in write mode.
    pub fn writer(path: impl AsRef<Path>) -> Self {
        Self::new(path, OpenMode::Write)
    }

    /// Override the codec options.
    pub fn with_options(mut self, options: CsvOptions) -> Self {
        self.options = options;
        self
    }

    /// Path backing this source.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open mode this source was created with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn unreadable(&self, err: impl std::fmt::Display) -> CruncherError {
        CruncherError::SourceNotReadable {
            name: self.name.clone(),
            message: err.to_string(),
        }
    }

    fn open_reader(&self) -> CruncherResult<CsvState> {
        let file = File::open(&self.path).map_err(|e| self.unreadable(e))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(self.options.delimiter)
            .trim(if self.options.trim {
                csv::Trim::All
            } else {
                csv::Trim::None
            })
            .from_reader(file);
        let headers = reader
            .headers()
            .map_err(|e| self.unreadable(e))?
            .iter()
            .map(str::to_owned)
            .collect();
        let start = reader.position().clone();
        Ok(CsvState::Reading {
            reader,
            headers,
            start,
            record: csv::StringRecord::new(),
        })
    }

    fn open_writer(&self) -> CruncherResult<CsvState> {
        let file = File::create(&self.path).map_err(|e| self.unreadable(e))?;
        let writer = csv::WriterBuilder::new()
            .delimiter(self.options.delimiter)
            .from_writer(file);
        Ok(CsvState::Writing {
            writer,
            header: None,
        })
    }
}

/// Build a row from a header and one record. Short records pad with [`Value::Null`].
pub(crate) fn record_to_row(headers: &[String], record: &csv::StringRecord) -> Row {
    let mut row = Row::with_capacity(headers.len());
    for (idx, name) in headers.iter().enumerate() {
        let value = match record.get(idx) {
            Some(raw) => Value::Utf8(raw.to_owned()),
            None => Value::Null,
        };
        row.insert(name.clone(), value);
    }
    row
}

/// Values of `row` in `header` order; absent fields render empty.
pub(crate) fn row_to_record(header: &[String], row: &Row) -> Vec<String> {
    header
        .iter()
        .map(|field| {
            row.get(field)
                .map(|v| v.as_text().into_owned())
                .unwrap_or_default()
        })
        .collect()
}

impl DataSource for CsvFile {
    fn open(&mut self) -> CruncherResult<()> {
        if self.is_open() {
            return Err(already_open(&self.name));
        }
        self.state = match self.mode {
            OpenMode::Read => self.open_reader()?,
            OpenMode::Write => self.open_writer()?,
        };
        Ok(())
    }

    fn next_row(&mut self) -> CruncherResult<Option<Row>> {
        match &mut self.state {
            CsvState::Closed => Err(not_open(&self.name)),
            CsvState::Writing { .. } => Err(CruncherError::Unsupported {
                name: self.name.clone(),
                operation: "next_row on a write-mode file",
            }),
            CsvState::Reading {
                reader,
                headers,
                record,
                ..
            } => {
                if reader.read_record(record)? {
                    Ok(Some(record_to_row(headers, record)))
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn reset(&mut self) -> CruncherResult<()> {
        match &mut self.state {
            CsvState::Closed => Err(not_open(&self.name)),
            CsvState::Reading { reader, start, .. } => {
                reader.seek(start.clone())?;
                Ok(())
            }
            CsvState::Writing { writer, .. } => {
                writer.flush()?;
                Ok(())
            }
        }
    }

    fn close(&mut self) -> CruncherResult<()> {
        match std::mem::replace(&mut self.state, CsvState::Closed) {
            CsvState::Closed => Err(not_open(&self.name)),
            CsvState::Reading { .. } => Ok(()),
            CsvState::Writing { mut writer, .. } => {
                writer.flush()?;
                Ok(())
            }
        }
    }

    fn is_open(&self) -> bool {
        !matches!(self.state, CsvState::Closed)
    }

    fn write_row(&mut self, row: &Row) -> CruncherResult<()> {
        match &mut self.state {
            CsvState::Closed => Err(not_open(&self.name)),
            CsvState::Reading { .. } => Err(CruncherError::Unsupported {
                name: self.name.clone(),
                operation: "write_row on a read-mode file",
            }),
            CsvState::Writing { writer, header } => {
                if header.is_none() {
                    let h: Vec<String> = row.field_names().map(str::to_owned).collect();
                    writer.write_record(&h)?;
                    *header = Some(h);
                }
                let header = header.as_deref().unwrap_or_default();
                writer.write_record(row_to_record(header, row))?;
                Ok(())
            }
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::CsvFile;
    use crate::error::CruncherError;
    use crate::sources::{DataSource, Rows};
    use crate::types::Value;

    fn fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_rows_keyed_by_trimmed_header() {
        let f = fixture("name, age\nmatt, 28\ntony, 25\n");
        let mut src = CsvFile::reader(f.path());
        src.open().unwrap();
        let rows = Rows::new(&mut src).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("age"), Some(&Value::Utf8("28".to_string())));
        assert_eq!(rows[1].get("name"), Some(&Value::Utf8("tony".to_string())));
        // exhausted sequences stay exhausted
        assert!(src.next_row().unwrap().is_none());
        src.close().unwrap();
    }

    #[test]
    fn reset_rewinds_to_first_data_record() {
        let f = fixture("id\n1\n2\n3\n");
        let mut src = CsvFile::reader(f.path());
        src.open().unwrap();
        let first = Rows::new(&mut src).collect::<Result<Vec<_>, _>>().unwrap();
        src.reset().unwrap();
        let second = Rows::new(&mut src).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        src.close().unwrap();
    }

    #[test]
    fn double_open_is_an_error() {
        let f = fixture("id\n1\n");
        let mut src = CsvFile::reader(f.path());
        src.open().unwrap();
        let err = src.open().unwrap_err();
        assert!(matches!(err, CruncherError::ResourceAlreadyOpen { .. }));
        src.close().unwrap();
    }

    #[test]
    fn reset_before_open_is_an_error() {
        let mut src = CsvFile::reader("tests/fixtures/people.csv");
        assert!(matches!(
            src.reset().unwrap_err(),
            CruncherError::ResourceNotOpen { .. }
        ));
    }

    #[test]
    fn missing_file_is_not_readable() {
        let mut src = CsvFile::reader("definitely/not/here.csv");
        assert!(matches!(
            src.open().unwrap_err(),
            CruncherError::SourceNotReadable { .. }
        ));
        assert!(!src.is_open());
    }

    #[test]
    fn writer_takes_header_from_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvFile::writer(&path);
        sink.open().unwrap();
        sink.write_row(&crate::row! { "name" => "matt", "age" => "28" })
            .unwrap();
        sink.write_row(&crate::row! { "age" => "25", "name" => "tony" })
            .unwrap();
        sink.close().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "name,age\nmatt,28\ntony,25\n"
        );
    }
}
