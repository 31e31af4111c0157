//! Synthesis station: sentence tasks in, f32 audio items out.

use crate::defaults::DEFAULT_VOICE;
use crate::pipeline::control::RunControl;
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{AudioItem, SentenceTask};
use crate::tts::backend::TtsBackend;
use crate::tts::voice::resolve_voice;
use std::sync::Arc;

/// Calls the TTS backend for one sentence at a time.
///
/// The voice is resolved against the backend's voice list on the first task
/// and reused for the rest of the run.
pub struct SynthesisStation {
    backend: Arc<dyn TtsBackend>,
    voice: String,
    speed: f32,
    language: String,
    resolved_voice: Option<String>,
}

impl SynthesisStation {
    pub fn new(backend: Arc<dyn TtsBackend>, voice: &str, speed: f32, language: &str) -> Self {
        Self {
            backend,
            voice: voice.to_string(),
            speed,
            language: language.to_string(),
            resolved_voice: None,
        }
    }

    fn voice_for_run(&mut self) -> Result<String, StationError> {
        if let Some(voice) = &self.resolved_voice {
            return Ok(voice.clone());
        }

        let available = match self.backend.list_voices() {
            Ok(voices) => voices,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list voices, assuming {}", DEFAULT_VOICE);
                vec![DEFAULT_VOICE.to_string()]
            }
        };

        let resolved = resolve_voice(&self.voice, &available)
            .map_err(|e| StationError::Recoverable(format!("{}, sentence abandoned", e)))?;
        let voice = resolved.voice().to_string();
        self.resolved_voice = Some(voice.clone());
        Ok(voice)
    }
}

impl Station for SynthesisStation {
    type Input = SentenceTask;
    type Output = AudioItem;

    fn name(&self) -> &'static str {
        "synthesis"
    }

    fn process(
        &mut self,
        task: SentenceTask,
        control: &RunControl,
    ) -> Result<Option<AudioItem>, StationError> {
        let voice = self.voice_for_run()?;

        tracing::debug!(index = task.index, text = %task.text, voice = %voice, "Synthesizing");

        let audio = self
            .backend
            .synthesize(&task.text, &voice, self.speed, &self.language)
            .map_err(|e| {
                StationError::Recoverable(format!("sentence {}: {}", task.index, e))
            })?;

        if control.should_discard() {
            tracing::debug!(index = task.index, "Cancelled during synthesis, discarding");
            return Ok(None);
        }

        Ok(Some(AudioItem {
            samples: audio.samples.into_f32(),
            sample_rate: audio.sample_rate,
            index: task.index,
        }))
    }
}
