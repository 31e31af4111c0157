//! speakline - read text aloud sentence by sentence
//!
//! Streams text through a local neural TTS model: synthesis of the next
//! sentence overlaps playback of the current one, with stop, skip and a
//! highlight cursor that follows whatever is audible.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
#[cfg(feature = "model-download")]
pub mod models;
#[cfg(feature = "cli")]
pub mod output;
pub mod pipeline;
pub mod run_log;
pub mod text;
pub mod tts;

// Composition root - needs everything
#[cfg(all(feature = "cpal-audio", feature = "model-download", feature = "cli"))]
pub mod app;

// Core traits (backend → pipeline → sink)
pub use audio::sink::{AudioSink, CollectorSink, OutputStream};
pub use tts::backend::{MockBackend, TtsBackend};

// Pipeline
pub use pipeline::orchestrator::{
    PipelineConfig, PipelineController, PipelineState, RunHandle, RunOutcome, RunSummary,
};
pub use pipeline::types::{PipelineEvent, SpeakRequest};

// Error handling
pub use error::{Result, SpeakError};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::Station;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(
                hash_part.len(),
                7,
                "Git hash should be 7 chars, got: {}",
                hash_part
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
