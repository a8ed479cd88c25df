use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::sources::SourceKind;

/// The engine an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Merge,
    Statistics,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Query => f.write_str("query"),
            Operation::Merge => f.write_str("merge"),
            Operation::Statistics => f.write_str("statistics"),
        }
    }
}

/// Events emitted by the engines while they run.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    RunStarted { operation: Operation, sources: Vec<String> },
    SourceOpened { name: String, kind: SourceKind },
    SourceReset { name: String },
    SourceClosed { name: String },
    RowsScanned { source: String, rows: u64 },
    RunFinished {
        operation: Operation,
        elapsed: Duration,
        metrics: EngineMetricsSnapshot,
    },
    RunFailed { operation: Operation, error: String },
}

/// Observer hook for engine events.
pub trait EngineObserver: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

/// Logs every event to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl EngineObserver for StdErrObserver {
    fn on_event(&self, event: &EngineEvent) {
        eprintln!("[cruncher] {event:?}");
    }
}

/// Forwards events to `tracing`: failures at `warn`, run boundaries at `debug`, the rest at `trace`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl EngineObserver for TracingObserver {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::RunFailed { operation, error } => {
                tracing::warn!(%operation, %error, "run failed");
            }
            EngineEvent::RunStarted { operation, sources } => {
                tracing::debug!(%operation, sources = ?sources, "run started");
            }
            EngineEvent::RunFinished {
                operation,
                elapsed,
                metrics,
            } => {
                tracing::debug!(%operation, ?elapsed, %metrics, "run finished");
            }
            other => tracing::trace!(event = ?other, "engine event"),
        }
    }
}

/// Fans events out to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn EngineObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn EngineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl EngineObserver for CompositeObserver {
    fn on_event(&self, event: &EngineEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}

/// Appends run boundaries and failures to a local log file.
///
/// Writes are best-effort; failures to open/write the log file are ignored.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl EngineObserver for FileObserver {
    fn on_event(&self, event: &EngineEvent) {
        let line = match event {
            EngineEvent::RunStarted { operation, sources } => {
                format!("{} start op={operation} sources={sources:?}", unix_ts())
            }
            EngineEvent::RunFinished {
                operation, metrics, ..
            } => format!("{} ok op={operation} {metrics}", unix_ts()),
            EngineEvent::RunFailed { operation, error } => {
                format!("{} fail op={operation} err={error}", unix_ts())
            }
            _ => return,
        };
        self.append_line(&line);
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Counters for the most recent run of an engine.
///
/// Engines update these while executing; callers can snapshot them at any time.
pub struct EngineMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,
    rows_scanned: AtomicU64,
    rows_emitted: AtomicU64,
    sources_opened: AtomicU64,
    resets: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            rows_scanned: AtomicU64::new(0),
            rows_emitted: AtomicU64::new(0),
            sources_opened: AtomicU64::new(0),
            resets: AtomicU64::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.rows_scanned.store(0, Ordering::SeqCst);
        self.rows_emitted.store(0, Ordering::SeqCst);
        self.sources_opened.store(0, Ordering::SeqCst);
        self.resets.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub fn on_rows_scanned(&self, n: u64) {
        let _ = self.rows_scanned.fetch_add(n, Ordering::SeqCst);
    }

    pub fn on_row_emitted(&self) {
        let _ = self.rows_emitted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_source_opened(&self) {
        let _ = self.sources_opened.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_reset(&self) {
        let _ = self.resets.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        EngineMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            rows_scanned: self.rows_scanned.load(Ordering::SeqCst),
            rows_emitted: self.rows_emitted.load(Ordering::SeqCst),
            sources_opened: self.sources_opened.load(Ordering::SeqCst),
            resets: self.resets.load(Ordering::SeqCst),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of [`EngineMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub rows_scanned: u64,
    pub rows_emitted: u64,
    pub sources_opened: u64,
    pub resets: u64,
}

impl fmt::Display for EngineMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, rows_scanned={}, rows_emitted={}, sources_opened={}, resets={}, elapsed={:?}",
            self.run_id,
            self.rows_scanned,
            self.rows_emitted,
            self.sources_opened,
            self.resets,
            self.elapsed
        )
    }
}
