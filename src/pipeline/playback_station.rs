//! Playback station: plays audio items and reports which sentence is audible.

use crate::audio::sink::{AudioSink, StreamGuard};
use crate::defaults;
use crate::pipeline::control::RunControl;
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{AudioItem, EventEmitter, PipelineEvent};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::Duration;

/// Exclusive use of the output device, shared by every run of a controller.
///
/// A stopped run can leave its playback thread detached inside a blocking
/// write. The next run's playback waits here until that stream is closed.
#[derive(Debug, Default)]
pub struct DeviceLock {
    held: Mutex<()>,
}

impl DeviceLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the device, re-checking `control` every `poll`.
    ///
    /// Returns `None` once the item should be discarded.
    pub fn acquire(&self, control: &RunControl, poll: Duration) -> Option<MutexGuard<'_, ()>> {
        let mut waited = false;
        loop {
            match self.held.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if control.should_discard() {
                        return None;
                    }
                    if !waited {
                        tracing::debug!("Output device busy, waiting for the previous stream");
                        waited = true;
                    }
                    thread::sleep(poll);
                }
            }
        }
    }
}

/// Opens, writes and closes one output stream per sentence.
///
/// At most one stream is open at any time; it is released through
/// [`StreamGuard`] on every path out of [`Station::process`].
pub struct PlaybackStation {
    sink: Arc<dyn AudioSink>,
    events: EventEmitter,
    device: Arc<DeviceLock>,
    poll_interval: Duration,
    played: usize,
}

impl PlaybackStation {
    pub fn new(sink: Arc<dyn AudioSink>, events: EventEmitter) -> Self {
        Self {
            sink,
            events,
            device: Arc::new(DeviceLock::new()),
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            played: 0,
        }
    }

    /// Share the device with the playback stations of other runs.
    pub fn with_device_lock(mut self, device: Arc<DeviceLock>, poll_interval: Duration) -> Self {
        self.device = device;
        self.poll_interval = poll_interval;
        self
    }
}

impl Station for PlaybackStation {
    type Input = AudioItem;
    type Output = ();

    fn name(&self) -> &'static str {
        "playback"
    }

    fn process(
        &mut self,
        item: AudioItem,
        control: &RunControl,
    ) -> Result<Option<()>, StationError> {
        if !self.events.emit(PipelineEvent::Highlight { index: item.index }) {
            tracing::warn!(index = item.index, "Highlight notification not delivered");
        }

        if item.samples.is_empty() {
            tracing::warn!(index = item.index, "Empty audio, nothing to play");
            return Ok(None);
        }

        if control.is_stopped() {
            return Ok(None);
        }

        // Declared before the stream so it is released after the stream closes.
        let Some(_device) = self.device.acquire(control, self.poll_interval) else {
            tracing::debug!(index = item.index, "Discarded while waiting for the device");
            return Ok(None);
        };

        let stream = self.sink.open(item.sample_rate).map_err(|e| {
            StationError::Recoverable(format!("sentence {}: {}", item.index, e))
        })?;
        let mut stream = StreamGuard::new(stream);

        if control.is_stopped() {
            return Ok(None);
        }

        tracing::debug!(
            index = item.index,
            samples = item.samples.len(),
            secs = item.duration_secs(),
            "Playing"
        );
        stream.write(&item.samples).map_err(|e| {
            StationError::Recoverable(format!("sentence {}: {}", item.index, e))
        })?;

        stream.close().map_err(|e| {
            StationError::Recoverable(format!("sentence {}: {}", item.index, e))
        })?;

        if control.is_stopped() {
            tracing::debug!(index = item.index, "Stop requested during playback");
            return Ok(None);
        }

        self.played += 1;
        Ok(None)
    }

    fn shutdown(&mut self) {
        tracing::debug!(played = self.played, "Playback station done");
    }
}
