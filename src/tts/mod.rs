//! Text-to-speech backends.

pub mod backend;
#[cfg(feature = "kokoro")]
pub mod kokoro;
pub mod voice;

pub use backend::{MockBackend, Samples, SynthesisGate, SynthesizedAudio, TtsBackend};
#[cfg(feature = "kokoro")]
pub use kokoro::KokoroBackend;
pub use voice::{ResolvedVoice, resolve_voice};
