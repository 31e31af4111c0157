//! Kokoro v1.0 backend on top of sherpa-onnx (`sherpa-rs`).
//!
//! Expects the extracted `kokoro-multi-lang-v1_0` bundle:
//! - `model.onnx`
//! - `voices.bin`
//! - `tokens.txt`
//! - `espeak-ng-data/`

use crate::error::{Result, SpeakError};
use crate::tts::backend::{Samples, SynthesizedAudio, TtsBackend};
use sherpa_rs::tts::{KokoroTts, KokoroTtsConfig};
use std::path::Path;
use std::sync::Mutex;

// Speaker ids are positions in the packed `voices.bin` style matrix.
// Only the English voices are exposed.
const KOKORO_VOICES: [&str; 28] = [
    "af_alloy",
    "af_aoede",
    "af_bella",
    "af_heart",
    "af_jessica",
    "af_kore",
    "af_nicole",
    "af_nova",
    "af_river",
    "af_sarah",
    "af_sky",
    "am_adam",
    "am_echo",
    "am_eric",
    "am_fenrir",
    "am_liam",
    "am_michael",
    "am_onyx",
    "am_puck",
    "am_santa",
    "bf_alice",
    "bf_emma",
    "bf_isabella",
    "bf_lily",
    "bm_daniel",
    "bm_fable",
    "bm_george",
    "bm_lewis",
];

fn speaker_id(voice: &str) -> Option<i32> {
    KOKORO_VOICES
        .iter()
        .position(|v| *v == voice)
        .and_then(|i| i32::try_from(i).ok())
}

/// Sherpa-ONNX Kokoro backend.
///
/// `KokoroTts::create` takes `&mut self`, so the engine sits behind a mutex.
/// The synthesis station is the only caller during a run.
pub struct KokoroBackend {
    engine: Mutex<KokoroTts>,
}

impl KokoroBackend {
    /// Load the model bundle from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model = model_dir.join("model.onnx");
        let voices = model_dir.join("voices.bin");
        let tokens = model_dir.join("tokens.txt");
        let data_dir = model_dir.join("espeak-ng-data");

        for path in [&model, &voices, &tokens, &data_dir] {
            if !path.exists() {
                return Err(SpeakError::BackendInit {
                    message: format!("missing model file {}", path.display()),
                });
            }
        }

        tracing::info!(dir = %model_dir.display(), "Loading Kokoro TTS model");

        let config = KokoroTtsConfig {
            model: path_string(&model)?,
            voices: path_string(&voices)?,
            tokens: path_string(&tokens)?,
            data_dir: path_string(&data_dir)?,
            length_scale: 1.0,
            ..Default::default()
        };

        Ok(Self {
            engine: Mutex::new(KokoroTts::new(config)),
        })
    }
}

impl TtsBackend for KokoroBackend {
    fn name(&self) -> &str {
        "kokoro"
    }

    fn list_voices(&self) -> Result<Vec<String>> {
        Ok(KOKORO_VOICES.iter().map(|v| v.to_string()).collect())
    }

    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        language: &str,
    ) -> Result<SynthesizedAudio> {
        let sid = speaker_id(voice).ok_or_else(|| SpeakError::VoiceNotFound {
            voice: voice.to_string(),
        })?;

        tracing::debug!(
            text_len = text.len(),
            voice,
            sid,
            speed,
            language,
            "Synthesizing sentence"
        );

        let mut engine = self.engine.lock().map_err(|e| SpeakError::Synthesis {
            message: format!("TTS engine lock poisoned: {e}"),
        })?;
        let audio = engine
            .create(text, sid, speed)
            .map_err(|e| SpeakError::Synthesis {
                message: e.to_string(),
            })?;

        Ok(SynthesizedAudio {
            samples: Samples::F32(audio.samples),
            sample_rate: audio.sample_rate,
        })
    }
}

fn path_string(path: &Path) -> Result<String> {
    path.to_str()
        .map(ToString::to_string)
        .ok_or_else(|| SpeakError::BackendInit {
            message: format!("invalid path: {}", path.display()),
        })
}
