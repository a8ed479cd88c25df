//! Construct sources from a format tag and a target.
//!
//! The set of supported (format, target) pairs is closed:
//!
//! | format | [`SourceTarget::File`] | [`SourceTarget::System`] |
//! |---|---|---|
//! | [`SourceFormat::Csv`] | [`CsvFile`] | [`CsvBuffer`] |
//! | [`SourceFormat::Tsv`] | [`CsvFile`] with a tab delimiter | not supported |
//! | [`SourceFormat::Json`] | [`JsonFile`] | not supported |

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CruncherError, CruncherResult};

use super::{CsvBuffer, CsvFile, CsvOptions, DataSource, JsonFile, OpenMode};

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Comma-separated values.
    Csv,
    /// Tab-separated values.
    Tsv,
    /// NDJSON or a JSON document.
    Json,
}

impl SourceFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "json" | "ndjson" | "jsonl" => Some(Self::Json),
            _ => None,
        }
    }

    /// Infer the format of `path` from its extension.
    pub fn infer(path: &Path) -> CruncherResult<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                CruncherError::config(format!(
                    "cannot infer format: path has no extension ({})",
                    path.display()
                ))
            })?;
        Self::from_extension(ext).ok_or_else(|| {
            CruncherError::config(format!(
                "cannot infer format from extension '{ext}' for path ({})",
                path.display()
            ))
        })
    }
}

impl FromStr for SourceFormat {
    type Err = CruncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "json" => Ok(Self::Json),
            other => Err(CruncherError::config(format!("unknown source format '{other}'"))),
        }
    }
}

/// Where a source's rows live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTarget {
    /// A file on disk.
    File(PathBuf),
    /// An in-memory stream owned by the process.
    System,
}

/// Build an unopened source for `format` at `target`.
///
/// `mode` only applies to file targets; system targets are always readable and writable.
pub fn generate(
    format: SourceFormat,
    target: SourceTarget,
    mode: OpenMode,
) -> CruncherResult<Box<dyn DataSource>> {
    match (format, target) {
        (SourceFormat::Csv, SourceTarget::File(path)) => Ok(Box::new(CsvFile::new(path, mode))),
        (SourceFormat::Tsv, SourceTarget::File(path)) => {
            Ok(Box::new(CsvFile::new(path, mode).with_options(CsvOptions::tab_separated())))
        }
        (SourceFormat::Json, SourceTarget::File(path)) => Ok(Box::new(JsonFile::new(path, mode))),
        (SourceFormat::Csv, SourceTarget::System) => Ok(Box::new(CsvBuffer::new())),
        (SourceFormat::Tsv, SourceTarget::System) => Err(CruncherError::config(
            "tsv is not available as a system output; use csv",
        )),
        (SourceFormat::Json, SourceTarget::System) => Err(CruncherError::config(
            "json is not available as a system output; use csv",
        )),
    }
}

/// Build an unopened file source, inferring the format from the extension unless `format` is set.
pub fn generate_path(
    path: impl AsRef<Path>,
    format: Option<SourceFormat>,
    mode: OpenMode,
) -> CruncherResult<Box<dyn DataSource>> {
    let path = path.as_ref();
    let format = match format {
        Some(f) => f,
        None => SourceFormat::infer(path)?,
    };
    generate(format, SourceTarget::File(path.to_path_buf()), mode)
}

/// Build one read source per file matching `pattern`, in sorted path order.
///
/// Useful for handing a directory of same-shaped files to the Merger.
pub fn generate_glob(
    pattern: &str,
    format: Option<SourceFormat>,
) -> CruncherResult<Vec<Box<dyn DataSource>>> {
    let mut paths = Vec::new();
    for entry in glob::glob(pattern)? {
        let path = entry.map_err(|e| CruncherError::Io(e.into_error()))?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    paths
        .into_iter()
        .map(|p| generate_path(p, format, OpenMode::Read))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{generate, generate_path, SourceFormat, SourceTarget};
    use crate::error::CruncherError;
    use crate::sources::{OpenMode, SourceKind};

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(SourceFormat::from_extension("CSV"), Some(SourceFormat::Csv));
        assert_eq!(SourceFormat::from_extension("ndjson"), Some(SourceFormat::Json));
        assert_eq!(SourceFormat::from_extension("TSV"), Some(SourceFormat::Tsv));
        assert_eq!(SourceFormat::from_extension("xlsx"), None);
    }

    #[test]
    fn infer_rejects_missing_extension() {
        let err = SourceFormat::infer(Path::new("no_extension")).unwrap_err();
        assert!(err.to_string().contains("has no extension"));
    }

    #[test]
    fn system_csv_is_a_stream() {
        let src = generate(SourceFormat::Csv, SourceTarget::System, OpenMode::Write).unwrap();
        assert_eq!(src.kind(), SourceKind::Stream);
    }

    #[test]
    fn tsv_extension_reads_tab_separated_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.tsv");
        std::fs::write(&path, "name\tage\nmatt\t28\n").unwrap();

        let mut src = generate_path(&path, None, OpenMode::Read).unwrap();
        src.open().unwrap();
        let row = src.next_row().unwrap().unwrap();
        assert_eq!(row.field_names().collect::<Vec<_>>(), vec!["name", "age"]);
        assert_eq!(row.get("age"), Some(&crate::types::Value::from("28")));
        src.close().unwrap();
    }

    #[test]
    fn system_json_is_rejected() {
        let err = generate(SourceFormat::Json, SourceTarget::System, OpenMode::Write).err();
        assert!(matches!(err, Some(CruncherError::InvalidConfiguration { .. })));
    }

    #[test]
    fn file_targets_report_file_kind() {
        let src = generate(
            SourceFormat::Json,
            SourceTarget::File("x.json".into()),
            OpenMode::Read,
        )
        .unwrap();
        assert_eq!(src.kind(), SourceKind::File);
        assert_eq!(src.name(), "x.json");
    }
}
