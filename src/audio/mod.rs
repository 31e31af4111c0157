//! Audio output: the sink seam, the device sink and WAV export.

#[cfg(feature = "cpal-audio")]
pub mod cpal_sink;
pub mod sink;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use cpal_sink::{CpalSink, list_output_devices};
pub use sink::{AudioSink, CollectorSink, OutputStream, SinkRecord, StreamGuard};
pub use wav::WavDirSink;
