use crate::error::{Result, SpeakError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An open mono f32 output stream.
///
/// `write` blocks until the device has accepted the whole buffer.
pub trait OutputStream: Send {
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Release the device. Called exactly once by [`StreamGuard`].
    fn close(&mut self) -> Result<()>;
}

/// Pluggable audio output for the playback station.
///
/// Pairs with [`TtsBackend`](crate::tts::TtsBackend) on the input side.
pub trait AudioSink: Send + Sync {
    /// Open a mono f32 stream at `sample_rate`.
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputStream>>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

impl<T: AudioSink + ?Sized> AudioSink for Arc<T> {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputStream>> {
        (**self).open(sample_rate)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Closes the wrapped stream when dropped.
///
/// Every exit path of the playback station (success, write error, stop,
/// unwinding) releases the device through this guard.
pub struct StreamGuard {
    stream: Box<dyn OutputStream>,
    closed: bool,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn OutputStream>) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    pub fn write(&mut self, samples: &[f32]) -> Result<()> {
        self.stream.write(samples)
    }

    /// Close explicitly and surface the error.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.stream.close()
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if !self.closed
            && let Err(e) = self.stream.close()
        {
            tracing::warn!(error = %e, "Failed to close audio stream");
        }
    }
}

/// Everything a [`CollectorSink`] saw.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkRecord {
    Opened { sample_rate: u32 },
    Written { samples: usize },
    Closed,
}

#[derive(Debug, Default)]
struct CollectorState {
    records: Vec<SinkRecord>,
    opens: usize,
    writes: usize,
}

/// Sink that records stream activity instead of playing it.
///
/// Used in tests and as a dry-run output. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    state: Arc<Mutex<CollectorState>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    fail_open_on: HashSet<usize>,
    fail_write_on: HashSet<usize>,
    write_delay: Option<Duration>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the n-th `open` call (zero-based).
    pub fn with_open_failure_on(mut self, n: usize) -> Self {
        self.fail_open_on.insert(n);
        self
    }

    /// Fail the n-th `write` call (zero-based).
    pub fn with_write_failure_on(mut self, n: usize) -> Self {
        self.fail_write_on.insert(n);
        self
    }

    /// Simulate playback duration.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.state
            .lock()
            .map(|s| s.records.clone())
            .unwrap_or_default()
    }

    /// Buffer lengths of successful writes, in order.
    pub fn written(&self) -> Vec<usize> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                SinkRecord::Written { samples } => Some(samples),
                _ => None,
            })
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.count(|r| matches!(r, SinkRecord::Opened { .. }))
    }

    pub fn close_count(&self) -> usize {
        self.count(|r| matches!(r, SinkRecord::Closed))
    }

    /// Highest number of streams that were open at the same time.
    pub fn max_concurrent_streams(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn count(&self, pred: impl Fn(&SinkRecord) -> bool) -> usize {
        self.records().iter().filter(|r| pred(r)).count()
    }

    fn record(&self, record: SinkRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.records.push(record);
        }
    }
}

impl AudioSink for CollectorSink {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputStream>> {
        let n = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| SpeakError::Other("collector state poisoned".to_string()))?;
            let n = state.opens;
            state.opens += 1;
            n
        };
        if self.fail_open_on.contains(&n) {
            return Err(SpeakError::Playback {
                message: format!("collector open failure on call {}", n),
            });
        }

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.record(SinkRecord::Opened { sample_rate });

        Ok(Box::new(CollectorStream {
            sink: self.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

struct CollectorStream {
    sink: CollectorSink,
}

impl OutputStream for CollectorStream {
    fn write(&mut self, samples: &[f32]) -> Result<()> {
        let n = {
            let mut state = self
                .sink
                .state
                .lock()
                .map_err(|_| SpeakError::Other("collector state poisoned".to_string()))?;
            let n = state.writes;
            state.writes += 1;
            n
        };
        if let Some(delay) = self.sink.write_delay {
            std::thread::sleep(delay);
        }
        if self.sink.fail_write_on.contains(&n) {
            return Err(SpeakError::Playback {
                message: format!("collector write failure on call {}", n),
            });
        }
        self.sink.record(SinkRecord::Written {
            samples: samples.len(),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.sink.active.fetch_sub(1, Ordering::SeqCst);
        self.sink.record(SinkRecord::Closed);
        Ok(())
    }
}
