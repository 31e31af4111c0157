//! Voice resolution against the voices a backend actually offers.

use crate::defaults::DEFAULT_VOICE;
use crate::error::{Result, SpeakError};

/// Outcome of resolving a requested voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedVoice {
    /// The requested voice is available.
    Requested(String),
    /// The requested voice is missing; the default voice is used instead.
    Default { requested: String, voice: String },
    /// Neither the requested nor the default voice exist; the first listed is used.
    FirstAvailable { requested: String, voice: String },
}

impl ResolvedVoice {
    /// The voice id to pass to the backend.
    pub fn voice(&self) -> &str {
        match self {
            ResolvedVoice::Requested(voice)
            | ResolvedVoice::Default { voice, .. }
            | ResolvedVoice::FirstAvailable { voice, .. } => voice,
        }
    }

    pub fn is_fallback(&self) -> bool {
        !matches!(self, ResolvedVoice::Requested(_))
    }
}

/// Pick the voice to synthesize with.
///
/// Order: the requested voice, then [`DEFAULT_VOICE`], then the first voice in
/// the list. An empty list yields [`SpeakError::VoiceNotFound`].
pub fn resolve_voice(requested: &str, available: &[String]) -> Result<ResolvedVoice> {
    if available.iter().any(|v| v == requested) {
        return Ok(ResolvedVoice::Requested(requested.to_string()));
    }

    let resolved = if available.iter().any(|v| v == DEFAULT_VOICE) {
        ResolvedVoice::Default {
            requested: requested.to_string(),
            voice: DEFAULT_VOICE.to_string(),
        }
    } else if let Some(first) = available.first() {
        ResolvedVoice::FirstAvailable {
            requested: requested.to_string(),
            voice: first.clone(),
        }
    } else {
        return Err(SpeakError::VoiceNotFound {
            voice: requested.to_string(),
        });
    };

    tracing::warn!(
        requested,
        voice = resolved.voice(),
        "Requested voice not available, falling back"
    );
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voices(list: &[&str]) -> Vec<String> {
        list.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_requested_voice_is_used_when_listed() {
        let resolved = resolve_voice("bf_sky", &voices(&["af_heart", "bf_sky"])).unwrap();
        assert_eq!(resolved, ResolvedVoice::Requested("bf_sky".to_string()));
        assert!(!resolved.is_fallback());
    }

    #[test]
    fn test_unknown_voice_falls_back_to_default() {
        let resolved = resolve_voice("xx_unknown", &voices(&["af_heart", "bf_sky"])).unwrap();
        assert_eq!(resolved.voice(), "af_heart");
        assert!(matches!(resolved, ResolvedVoice::Default { .. }));
        assert!(resolved.is_fallback());
    }

    #[test]
    fn test_falls_back_to_first_voice_without_default() {
        let resolved = resolve_voice("xx_unknown", &voices(&["bm_lewis", "bf_sky"])).unwrap();
        assert_eq!(
            resolved,
            ResolvedVoice::FirstAvailable {
                requested: "xx_unknown".to_string(),
                voice: "bm_lewis".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_voice_list_is_an_error() {
        let err = resolve_voice("af_heart", &[]).unwrap_err();
        assert!(matches!(err, SpeakError::VoiceNotFound { voice } if voice == "af_heart"));
    }
}
