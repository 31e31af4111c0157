//! Default configuration constants for speakline.
//!
//! Shared between the config file types, the pipeline and the CLI so every
//! entry point agrees on the same values.

/// Default Kokoro voice.
///
/// Also the first fallback when a requested voice is not offered by the backend.
pub const DEFAULT_VOICE: &str = "af_heart";

/// Default speaking rate multiplier.
pub const DEFAULT_SPEED: f32 = 0.75;

/// Slowest accepted speaking rate.
pub const MIN_SPEED: f32 = 0.5;

/// Fastest accepted speaking rate.
pub const MAX_SPEED: f32 = 2.0;

/// Default language code passed to the backend.
pub const DEFAULT_LANGUAGE: &str = "en-us";

/// Capacity of the sentence task queue.
///
/// Bounds how far synthesis may run ahead of submission.
pub const TASK_QUEUE_CAPACITY: usize = 2;

/// Capacity of the synthesized audio queue.
pub const AUDIO_QUEUE_CAPACITY: usize = 5;

/// How long a worker blocks on an empty queue before re-checking run control.
pub const POLL_INTERVAL_MS: u64 = 10;

/// Upper bound for joining a stopped worker thread.
pub const JOIN_TIMEOUT_MS: u64 = 1000;

/// Run log file name, placed in the data directory.
pub const RUN_LOG_FILE: &str = "speakline.log";

/// Rotate the run log once it would grow past this size.
pub const RUN_LOG_MAX_BYTES: u64 = 1024 * 1024;

/// Number of rotated run log files kept (`.1` .. `.N`).
pub const RUN_LOG_BACKUPS: usize = 5;

/// Status text reported when a run has ended.
pub const STATUS_READY: &str = "Ready";
