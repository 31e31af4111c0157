//! WAV export: one file per spoken sentence instead of device playback.

use crate::audio::sink::{AudioSink, OutputStream};
use crate::error::{Result, SpeakError};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Writes each opened stream to `<dir>/<n>.wav` as 32-bit float mono.
#[derive(Debug)]
pub struct WavDirSink {
    dir: PathBuf,
    next: AtomicUsize,
}

impl WavDirSink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            next: AtomicUsize::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl AudioSink for WavDirSink {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputStream>> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("{:04}.wav", n));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(&path, spec).map_err(|e| SpeakError::Playback {
            message: format!("Failed to create {}: {}", path.display(), e),
        })?;
        tracing::debug!(path = %path.display(), "Exporting sentence");
        Ok(Box::new(WavStream {
            writer: Some(writer),
            path,
        }))
    }

    fn name(&self) -> &'static str {
        "wav"
    }
}

struct WavStream {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
}

impl OutputStream for WavStream {
    fn write(&mut self, samples: &[f32]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| SpeakError::Playback {
            message: "write on closed WAV stream".to_string(),
        })?;
        for &s in samples {
            writer.write_sample(s).map_err(|e| SpeakError::Playback {
                message: format!("Failed to write {}: {}", self.path.display(), e),
            })?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| SpeakError::Playback {
                message: format!("Failed to finalize {}: {}", self.path.display(), e),
            })?;
        }
        Ok(())
    }
}
