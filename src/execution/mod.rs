//! Run-time plumbing shared by the Query, Merger and Statistics engines.
//!
//! This module sits underneath [`crate::processing`] and provides:
//!
//! - source lifecycle handling that guarantees every opened source is closed on every exit path
//! - sink finalization (read back a stream sink, or report a row count for a file sink)
//! - the optional [`Timed`] envelope (elapsed milliseconds + peak retained bytes)
//! - observer hooks and per-engine [`EngineMetrics`]

mod observer;
mod timer;

use serde::Serialize;

use crate::error::{CruncherError, CruncherResult};
use crate::sources::{DataSource, SourceKind};
use crate::types::Row;

pub use observer::{
    CompositeObserver, EngineEvent, EngineMetrics, EngineMetricsSnapshot, EngineObserver, FileObserver,
    Operation, StdErrObserver, TracingObserver,
};
pub use timer::{Stopwatch, Timed, TimerReport};

/// Row-producing engine output (Query, Merger).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowOutput {
    /// Rows collected in memory (no sink given).
    Rows(Vec<Row>),
    /// Full contents of a stream sink.
    Buffer(String),
    /// Number of rows written to a file sink.
    Written { rows: usize },
}

impl RowOutput {
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            RowOutput::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            RowOutput::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn buffer(&self) -> Option<&str> {
        match self {
            RowOutput::Buffer(s) => Some(s),
            _ => None,
        }
    }

    pub fn written(&self) -> Option<usize> {
        match self {
            RowOutput::Written { rows } => Some(*rows),
            _ => None,
        }
    }
}

/// What a finalized sink hands back.
pub(crate) enum SinkOutput {
    Buffer(String),
    Written(usize),
}

impl SinkOutput {
    pub(crate) fn into_row_output(self) -> RowOutput {
        match self {
            SinkOutput::Buffer(s) => RowOutput::Buffer(s),
            SinkOutput::Written(rows) => RowOutput::Written { rows },
        }
    }
}

/// One engine run: observer/metrics plumbing plus the stopwatch.
pub(crate) struct Run<'e> {
    operation: Operation,
    observer: Option<&'e dyn EngineObserver>,
    metrics: &'e EngineMetrics,
    stopwatch: Stopwatch,
}

impl<'e> Run<'e> {
    pub(crate) fn start(
        operation: Operation,
        observer: Option<&'e dyn EngineObserver>,
        metrics: &'e EngineMetrics,
        sources: Vec<String>,
    ) -> Self {
        metrics.begin_run();
        let run = Self {
            operation,
            observer,
            metrics,
            stopwatch: Stopwatch::start(),
        };
        run.emit(EngineEvent::RunStarted { operation, sources });
        run
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(obs) = self.observer {
            obs.on_event(&event);
        }
    }

    /// Open a source; any failure other than lifecycle misuse surfaces as
    /// [`CruncherError::SourceNotReadable`].
    pub(crate) fn open(&self, source: &mut dyn DataSource) -> CruncherResult<()> {
        match source.open() {
            Ok(()) => {
                self.metrics.on_source_opened();
                self.emit(EngineEvent::SourceOpened {
                    name: source.name().to_string(),
                    kind: source.kind(),
                });
                Ok(())
            }
            Err(e @ (CruncherError::ResourceAlreadyOpen { .. } | CruncherError::SourceNotReadable { .. })) => {
                Err(e)
            }
            Err(other) => Err(CruncherError::SourceNotReadable {
                name: source.name().to_string(),
                message: other.to_string(),
            }),
        }
    }

    pub(crate) fn reset(&self, source: &mut dyn DataSource) -> CruncherResult<()> {
        source.reset()?;
        self.metrics.on_reset();
        self.emit(EngineEvent::SourceReset {
            name: source.name().to_string(),
        });
        Ok(())
    }

    pub(crate) fn close(&self, source: &mut dyn DataSource) -> CruncherResult<()> {
        source.close()?;
        self.emit(EngineEvent::SourceClosed {
            name: source.name().to_string(),
        });
        Ok(())
    }

    /// Close `source` regardless of `result`. A close failure only surfaces when `result` is `Ok`.
    pub(crate) fn close_after<T>(
        &self,
        result: CruncherResult<T>,
        source: &mut dyn DataSource,
    ) -> CruncherResult<T> {
        let closed = self.close(source);
        let value = result?;
        closed?;
        Ok(value)
    }

    pub(crate) fn scanned(&self, source: &str, rows: u64) {
        self.metrics.on_rows_scanned(rows);
        self.emit(EngineEvent::RowsScanned {
            source: source.to_string(),
            rows,
        });
    }

    pub(crate) fn emitted(&self) {
        self.metrics.on_row_emitted();
    }

    pub(crate) fn retain(&mut self, bytes: usize) {
        self.stopwatch.retain(bytes);
    }

    pub(crate) fn release(&mut self, bytes: usize) {
        self.stopwatch.release(bytes);
    }

    /// Hand back a sink's output and close it.
    ///
    /// Stream sinks are rewound and read back in full; file sinks report `written`.
    pub(crate) fn finalize_sink(
        &self,
        sink: &mut dyn DataSource,
        written: usize,
    ) -> CruncherResult<SinkOutput> {
        match sink.kind() {
            SourceKind::Stream => {
                let contents = sink.reset().and_then(|()| sink.buffered_contents());
                self.close_after(contents, sink).map(SinkOutput::Buffer)
            }
            SourceKind::File => self.close(sink).map(|()| SinkOutput::Written(written)),
        }
    }

    /// End the run, emitting the outcome and wrapping the value in a [`Timed`] envelope.
    pub(crate) fn finish<T>(self, result: CruncherResult<T>, timed: bool) -> CruncherResult<Timed<T>> {
        let elapsed = self.stopwatch.elapsed();
        self.metrics.end_run(elapsed);
        match result {
            Ok(data) => {
                self.emit(EngineEvent::RunFinished {
                    operation: self.operation,
                    elapsed,
                    metrics: self.metrics.snapshot(),
                });
                Ok(Timed {
                    data,
                    timer: timed.then(|| self.stopwatch.report()),
                })
            }
            Err(e) => {
                self.emit(EngineEvent::RunFailed {
                    operation: self.operation,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

/// Reborrow an optional sink for one call without giving it up.
pub(crate) fn reborrow<'r>(sink: &'r mut Option<&mut dyn DataSource>) -> Option<&'r mut dyn DataSource> {
    match sink {
        Some(s) => {
            let s: &'r mut dyn DataSource = &mut **s;
            Some(s)
        }
        None => None,
    }
}

/// Open `sink` after `source` has been opened; if the sink fails, the source is closed again.
pub(crate) fn open_with_sink(
    run: &Run<'_>,
    source: &mut dyn DataSource,
    sink: Option<&mut dyn DataSource>,
) -> CruncherResult<()> {
    run.open(source)?;
    if let Some(sink) = sink {
        if let Err(e) = run.open(sink) {
            let _ = run.close(source);
            return Err(e);
        }
    }
    Ok(())
}
