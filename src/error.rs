use thiserror::Error;

/// Convenience result type for source and engine operations.
pub type CruncherResult<T> = Result<T, CruncherError>;

/// Error type returned by sources and by the Query/Merger/Statistics engines.
///
/// Lifecycle misuse, configuration mistakes and data-shape mismatches each get their own variant;
/// codec failures are wrapped transparently.
#[derive(Debug, Error)]
pub enum CruncherError {
    /// `open` was called on a source that already holds an open resource.
    #[error("resource already open: '{name}' must be closed before it can be opened again")]
    ResourceAlreadyOpen { name: String },

    /// A cursor operation (`next_row`, `reset`, `close`, ...) was called on a source that is not open.
    #[error("resource not open: '{name}'")]
    ResourceNotOpen { name: String },

    /// A configured field (predicate, join or grouping field) is absent from the first row of a source.
    #[error("field '{field}' not found in {source_name}")]
    FieldNotFound { field: String, source_name: String },

    /// Malformed Query/Merger/Statistics setup.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The underlying resource of a source could not be acquired.
    #[error("source '{name}' is not readable: {message}")]
    SourceNotReadable { name: String, message: String },

    /// The source does not support the requested operation (e.g. writing to a read-only file).
    #[error("source '{name}' does not support {operation}")]
    Unsupported { name: String, operation: &'static str },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV codec error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON codec error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid glob pattern passed to the source factory.
    #[error("pattern error: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl CruncherError {
    /// Shorthand for [`CruncherError::InvalidConfiguration`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Whether the error came from a failure to reach the underlying resource.
    pub fn is_io(&self) -> bool {
        match self {
            Self::Io(_) | Self::SourceNotReadable { .. } => true,
            Self::Csv(err) => matches!(err.kind(), ::csv::ErrorKind::Io(_)),
            _ => false,
        }
    }
}
