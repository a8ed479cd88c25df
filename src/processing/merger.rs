//! N-way equality join across sources.

use std::sync::Arc;

use crate::error::{CruncherError, CruncherResult};
use crate::execution::{EngineMetrics, EngineObserver, Operation, RowOutput, Run, Timed, reborrow};
use crate::sources::{DataSource, Rows};
use crate::types::Row;

/// Merger engine.
///
/// Nested-loop join on one field: every row of each source is compared against every row of the
/// sources after it. Merged rows carry the left row's fields followed by the right row's; on a
/// collision the right value wins, except for the join field itself.
///
/// `execute` takes `self`, so a Merger runs once.
///
/// ```rust
/// use data_cruncher::processing::Merger;
/// use data_cruncher::row;
/// use data_cruncher::sources::MemorySource;
///
/// # fn main() -> Result<(), data_cruncher::CruncherError> {
/// let mut a = MemorySource::new("a", vec![row! { "id" => 1i64, "x" => "a" }]);
/// let mut b = MemorySource::new("b", vec![row! { "id" => 1i64, "y" => "b" }]);
/// let out = Merger::new()
///     .from_source(&mut a)
///     .from_source(&mut b)
///     .on("id")
///     .execute(None)?
///     .into_data();
/// assert_eq!(out.rows().unwrap(), &[row! { "id" => 1i64, "x" => "a", "y" => "b" }]);
/// # Ok(())
/// # }
/// ```
pub struct Merger<'a> {
    sources: Vec<&'a mut dyn DataSource>,
    field: Option<String>,
    timer: bool,
    observer: Option<Arc<dyn EngineObserver>>,
    metrics: Arc<EngineMetrics>,
}

impl<'a> Merger<'a> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            field: None,
            timer: false,
            observer: None,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    /// Append a source to merge.
    pub fn from_source(mut self, source: &'a mut dyn DataSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Append several boxed sources, e.g. from [`crate::sources::generate_glob`].
    pub fn from_sources(mut self, sources: &'a mut [Box<dyn DataSource>]) -> Self {
        for source in sources.iter_mut() {
            self.sources.push(source.as_mut());
        }
        self
    }

    /// The join field; it must exist in every source.
    pub fn on(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn timer(mut self) -> Self {
        self.timer = true;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the join, collecting merged rows or writing them to `sink`.
    pub fn execute(mut self, mut sink: Option<&mut dyn DataSource>) -> CruncherResult<Timed<RowOutput>> {
        if self.sources.is_empty() {
            return Err(CruncherError::config("no sources configured, add some with from_source"));
        }
        let field = match self.field.as_deref() {
            Some(f) if !f.is_empty() => f,
            _ => return Err(CruncherError::config("no join field configured, set one with on")),
        };

        let names = self.sources.iter().map(|s| s.name().to_string()).collect();
        let mut run = Run::start(Operation::Merge, self.observer.as_deref(), &self.metrics, names);

        if let Err(e) = open_all(&run, &mut self.sources, reborrow(&mut sink)) {
            return run.finish(Err(e), self.timer);
        }

        let joined = join(&mut run, field, &mut self.sources, reborrow(&mut sink));
        let closed = close_all(&run, &mut self.sources);
        let joined = joined.and_then(|m| closed.map(|()| m));

        let result = match (joined, sink) {
            (Ok(Joined::Rows(rows)), _) => Ok(RowOutput::Rows(rows)),
            (Ok(Joined::Written(n)), Some(sink)) => {
                run.finalize_sink(sink, n).map(|out| out.into_row_output())
            }
            (Ok(Joined::Written(n)), None) => Ok(RowOutput::Written { rows: n }),
            (Err(e), Some(sink)) => {
                let _ = run.close(sink);
                Err(e)
            }
            (Err(e), None) => Err(e),
        };
        run.finish(result, self.timer)
    }
}

impl Default for Merger<'_> {
    fn default() -> Self {
        Self::new()
    }
}

enum Joined {
    Rows(Vec<Row>),
    Written(usize),
}

/// Open every source and then the sink; on failure, close whatever was opened.
fn open_all(
    run: &Run<'_>,
    sources: &mut [&mut dyn DataSource],
    sink: Option<&mut dyn DataSource>,
) -> CruncherResult<()> {
    for i in 0..sources.len() {
        if let Err(e) = run.open(&mut *sources[i]) {
            let _ = close_all(run, &mut sources[..i]);
            return Err(e);
        }
    }
    if let Some(sink) = sink {
        if let Err(e) = run.open(sink) {
            let _ = close_all(run, sources);
            return Err(e);
        }
    }
    Ok(())
}

/// Close every source, reporting the first failure.
fn close_all(run: &Run<'_>, sources: &mut [&mut dyn DataSource]) -> CruncherResult<()> {
    let mut first = Ok(());
    for source in sources.iter_mut() {
        let closed = run.close(&mut **source);
        if first.is_ok() {
            first = closed;
        }
    }
    first
}

fn join(
    run: &mut Run<'_>,
    field: &str,
    sources: &mut [&mut dyn DataSource],
    mut sink: Option<&mut dyn DataSource>,
) -> CruncherResult<Joined> {
    let mut merged = Vec::new();
    let mut emitted = 0usize;
    let mut pending = sources;

    while let Some((left, rest)) = std::mem::take(&mut pending).split_first_mut() {
        let left_name = left.name().to_string();
        let mut scanned = 0u64;

        for (i, row) in Rows::new(&mut **left).enumerate() {
            let row = row?;
            scanned += 1;
            if i == 0 && !row.contains_field(field) {
                return Err(CruncherError::FieldNotFound {
                    field: field.to_string(),
                    source_name: left_name,
                });
            }
            let Some(key) = row.get(field).map(|v| v.as_text().into_owned()) else {
                continue;
            };

            for right in rest.iter_mut() {
                let mut right_scanned = 0u64;
                for other in Rows::new(&mut **right) {
                    let other = other?;
                    right_scanned += 1;
                    if other.get(field).is_some_and(|v| v.as_text() == key) {
                        let out = row.merged_with(&other, field);
                        let bytes = out.approx_bytes();
                        run.retain(bytes);
                        match sink.as_deref_mut() {
                            Some(sink) => {
                                sink.write_row(&out)?;
                                run.release(bytes);
                            }
                            None => merged.push(out),
                        }
                        run.emitted();
                        emitted += 1;
                    }
                }
                run.scanned(right.name(), right_scanned);
                run.reset(&mut **right)?;
            }
        }

        run.scanned(&left_name, scanned);
        run.reset(&mut **left)?;
        pending = rest;
    }

    Ok(match sink {
        Some(_) => Joined::Written(emitted),
        None => Joined::Rows(merged),
    })
}

#[cfg(test)]
mod tests {
    use super::Merger;
    use crate::error::CruncherError;
    use crate::row;
    use crate::sources::{CsvBuffer, DataSource, MemorySource};

    #[test]
    fn joins_on_matching_key() {
        let mut a = MemorySource::new("a", vec![row! { "id" => "1", "x" => "a" }]);
        let mut b = MemorySource::new("b", vec![row! { "id" => "1", "y" => "b" }]);
        let out = Merger::new()
            .from_source(&mut a)
            .from_source(&mut b)
            .on("id")
            .execute(None)
            .unwrap()
            .into_data();
        assert_eq!(out.rows().unwrap(), &[row! { "id" => "1", "x" => "a", "y" => "b" }]);
        assert!(!a.is_open());
        assert!(!b.is_open());
    }

    #[test]
    fn mismatched_keys_produce_nothing() {
        let mut a = MemorySource::new("a", vec![row! { "id" => "1", "x" => "a" }]);
        let mut b = MemorySource::new("b", vec![row! { "id" => "2", "y" => "b" }]);
        let out = Merger::new()
            .from_source(&mut a)
            .from_source(&mut b)
            .on("id")
            .execute(None)
            .unwrap()
            .into_data();
        assert!(out.rows().unwrap().is_empty());
    }

    #[test]
    fn right_side_overwrites_colliding_fields_except_join_key() {
        let mut a = MemorySource::new("a", vec![row! { "id" => "7", "name" => "left" }]);
        let mut b = MemorySource::new("b", vec![row! { "id" => "7", "name" => "right" }]);
        let out = Merger::new()
            .from_source(&mut a)
            .from_source(&mut b)
            .on("id")
            .execute(None)
            .unwrap()
            .into_data();
        assert_eq!(out.rows().unwrap(), &[row! { "id" => "7", "name" => "right" }]);
    }

    #[test]
    fn three_way_pairs_every_later_source() {
        let mut a = MemorySource::new("a", vec![row! { "id" => "1", "a" => "x" }, row! { "id" => "2", "a" => "y" }]);
        let mut b = MemorySource::new("b", vec![row! { "id" => "1", "b" => "x" }]);
        let mut c = MemorySource::new("c", vec![row! { "id" => "1", "c" => "x" }, row! { "id" => "2", "c" => "y" }]);
        let merger = Merger::new()
            .from_source(&mut a)
            .from_source(&mut b)
            .from_source(&mut c)
            .on("id");
        let metrics = merger.metrics();
        let out = merger.execute(None).unwrap().into_data();
        let rows = out.rows().unwrap();
        // a×b: 1, a×c: 2, b×c: 1
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], row! { "id" => "1", "a" => "x", "b" => "x" });
        assert_eq!(rows[1], row! { "id" => "1", "a" => "x", "c" => "x" });
        assert_eq!(rows[2], row! { "id" => "2", "a" => "y", "c" => "y" });
        assert_eq!(rows[3], row! { "id" => "1", "b" => "x", "c" => "x" });
        assert_eq!(metrics.snapshot().rows_emitted, 4);
        assert_eq!(metrics.snapshot().sources_opened, 3);
    }

    #[test]
    fn missing_join_field_fails_and_closes_everything() {
        let mut a = MemorySource::new("a", vec![row! { "key" => "1" }]);
        let mut b = MemorySource::new("b", vec![row! { "id" => "1" }]);
        let err = Merger::new()
            .from_source(&mut a)
            .from_source(&mut b)
            .on("id")
            .execute(None)
            .unwrap_err();
        assert!(matches!(err, CruncherError::FieldNotFound { ref source_name, .. } if source_name == "a"));
        assert!(!a.is_open());
        assert!(!b.is_open());
    }

    #[test]
    fn open_failure_closes_sources_already_opened() {
        let mut a = MemorySource::new("a", vec![row! { "id" => "1" }]);
        let mut b = MemorySource::new("b", vec![row! { "id" => "1" }]);
        b.open().unwrap();
        let err = Merger::new()
            .from_source(&mut a)
            .from_source(&mut b)
            .on("id")
            .execute(None)
            .unwrap_err();
        assert!(matches!(err, CruncherError::ResourceAlreadyOpen { .. }));
        assert!(!a.is_open());
    }

    #[test]
    fn requires_sources_and_field() {
        assert!(matches!(
            Merger::new().on("id").execute(None).unwrap_err(),
            CruncherError::InvalidConfiguration { .. }
        ));
        let mut a = MemorySource::new("a", vec![]);
        assert!(matches!(
            Merger::new().from_source(&mut a).execute(None).unwrap_err(),
            CruncherError::InvalidConfiguration { .. }
        ));
    }

    #[test]
    fn writes_to_stream_sink() {
        let mut a = MemorySource::new("a", vec![row! { "id" => "1", "x" => "a" }]);
        let mut b = MemorySource::new("b", vec![row! { "id" => "1", "y" => "b" }]);
        let mut sink = CsvBuffer::new();
        let out = Merger::new()
            .from_source(&mut a)
            .from_source(&mut b)
            .on("id")
            .execute(Some(&mut sink))
            .unwrap()
            .into_data();
        assert_eq!(out.buffer(), Some("id,x,y\n1,a,b\n"));
    }
}
