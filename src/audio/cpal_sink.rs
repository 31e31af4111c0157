//! Audio playback through CPAL (Cross-Platform Audio Library).

use crate::audio::sink::{AudioSink, OutputStream};
use crate::error::{Result, SpeakError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Extra time allowed beyond the buffer's play duration before `write` gives up.
const DRAIN_MARGIN: Duration = Duration::from_secs(2);

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// List output devices by name.
pub fn list_output_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.output_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| SpeakError::Playback {
        message: format!("Failed to enumerate output devices: {}", e),
    })?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

fn find_output_device(name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        match name {
            Some(name) => {
                let devices = host.output_devices().map_err(|e| SpeakError::Playback {
                    message: format!("Failed to enumerate devices: {}", e),
                })?;
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        return Ok(dev);
                    }
                }
                Err(SpeakError::AudioDeviceNotFound {
                    device: name.to_string(),
                })
            }
            None => host
                .default_output_device()
                .ok_or_else(|| SpeakError::AudioDeviceNotFound {
                    device: "default".to_string(),
                }),
        }
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is created, paused and dropped by the playback
/// station thread that owns the `CpalStream`; it is never shared.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Samples waiting for the device callback.
#[derive(Default)]
struct PendingSamples {
    queue: Mutex<VecDeque<f32>>,
    drained: Condvar,
}

/// Plays mono f32 audio on the default or a named output device.
///
/// Opens one device stream per sentence at the sentence's sample rate;
/// devices that cannot run at that rate fail the item, there is no resampling.
#[derive(Debug, Clone, Default)]
pub struct CpalSink {
    device: Option<String>,
}

impl CpalSink {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }
}

impl AudioSink for CpalSink {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputStream>> {
        let device = find_output_device(self.device.as_deref())?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let pending = Arc::new(PendingSamples::default());
        let feed = Arc::clone(&pending);

        let stream = with_suppressed_stderr(|| {
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut queue) = feed.queue.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    for out in data.iter_mut() {
                        *out = queue.pop_front().unwrap_or(0.0);
                    }
                    if queue.is_empty() {
                        feed.drained.notify_all();
                    }
                },
                |err| tracing::warn!(error = %err, "Audio stream error"),
                None,
            )
        })
        .map_err(|e| SpeakError::Playback {
            message: format!("Failed to open output stream at {} Hz: {}", sample_rate, e),
        })?;

        stream.play().map_err(|e| SpeakError::Playback {
            message: format!("Failed to start output stream: {}", e),
        })?;

        tracing::debug!(sample_rate, device = ?self.device, "Output stream opened");

        Ok(Box::new(CpalStream {
            stream: Some(SendableStream(stream)),
            pending,
            sample_rate,
        }))
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

struct CpalStream {
    stream: Option<SendableStream>,
    pending: Arc<PendingSamples>,
    sample_rate: u32,
}

impl OutputStream for CpalStream {
    /// Queue the buffer and block until the callback has consumed it.
    fn write(&mut self, samples: &[f32]) -> Result<()> {
        if self.stream.is_none() {
            return Err(SpeakError::Playback {
                message: "write on closed stream".to_string(),
            });
        }

        let play_time =
            Duration::from_secs_f64(samples.len() as f64 / f64::from(self.sample_rate.max(1)));
        let deadline = Instant::now() + play_time + DRAIN_MARGIN;

        let mut queue = self.pending.queue.lock().map_err(|_| SpeakError::Playback {
            message: "playback buffer poisoned".to_string(),
        })?;
        queue.extend(samples.iter().copied());

        while !queue.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                let left = queue.len();
                queue.clear();
                return Err(SpeakError::Playback {
                    message: format!("device stopped consuming audio, {} samples dropped", left),
                });
            }
            queue = match self.pending.drained.wait_timeout(queue, deadline - now) {
                Ok((guard, _)) => guard,
                Err(_) => {
                    return Err(SpeakError::Playback {
                        message: "playback buffer poisoned".to_string(),
                    });
                }
            };
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(SendableStream(stream)) = self.stream.take() {
            stream.pause().map_err(|e| SpeakError::Playback {
                message: format!("Failed to stop output stream: {}", e),
            })?;
        }
        Ok(())
    }
}
