use std::time::{Duration, Instant};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Elapsed time and peak retained memory of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerReport {
    /// Wall-clock time in milliseconds.
    pub elapsed: u64,
    /// Peak bytes of row/bucket data retained by the engine during the run.
    pub memory: u64,
}

/// Result of an engine run, with timing when it was requested.
///
/// Serializes as the bare `data` when untimed, and as `{"data": ..., "timer": {...}}` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Timed<T> {
    pub data: T,
    pub timer: Option<TimerReport>,
}

impl<T> Timed<T> {
    pub fn untimed(data: T) -> Self {
        Self { data, timer: None }
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T: Serialize> Serialize for Timed<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.timer {
            None => self.data.serialize(serializer),
            Some(timer) => {
                let mut s = serializer.serialize_struct("Timed", 2)?;
                s.serialize_field("data", &self.data)?;
                s.serialize_field("timer", timer)?;
                s.end()
            }
        }
    }
}

/// Measures wall-clock time and tracks the high-water mark of retained bytes.
#[derive(Debug)]
pub struct Stopwatch {
    started: Instant,
    retained: usize,
    peak: usize,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            retained: 0,
            peak: 0,
        }
    }

    /// Record `bytes` newly held by the engine.
    pub fn retain(&mut self, bytes: usize) {
        self.retained = self.retained.saturating_add(bytes);
        self.peak = self.peak.max(self.retained);
    }

    /// Record `bytes` no longer held by the engine.
    pub fn release(&mut self, bytes: usize) {
        self.retained = self.retained.saturating_sub(bytes);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn report(&self) -> TimerReport {
        TimerReport {
            elapsed: self.elapsed().as_millis().min(u64::MAX as u128) as u64,
            memory: self.peak as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Stopwatch, Timed, TimerReport};

    #[test]
    fn peak_survives_release() {
        let mut sw = Stopwatch::start();
        sw.retain(100);
        sw.retain(50);
        sw.release(120);
        sw.retain(10);
        assert_eq!(sw.report().memory, 150);
    }

    #[test]
    fn untimed_serializes_as_bare_data() {
        let t = Timed::untimed(vec![1, 2]);
        assert_eq!(serde_json::to_string(&t).unwrap(), "[1,2]");
    }

    #[test]
    fn timed_serializes_as_envelope() {
        let t = Timed {
            data: 3,
            timer: Some(TimerReport {
                elapsed: 5,
                memory: 64,
            }),
        };
        assert_eq!(
            serde_json::to_string(&t).unwrap(),
            r#"{"data":3,"timer":{"elapsed":5,"memory":64}}"#
        );
    }
}
