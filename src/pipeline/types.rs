//! Data types passed between pipeline stations and out to the front-end.

use crossbeam_channel::Sender;
use serde::Serialize;

/// One sentence waiting for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceTask {
    pub text: String,
    /// Zero-based position in the run, used only for highlighting.
    pub index: usize,
}

/// Synthesized audio for one sentence, owned by whoever holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioItem {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub index: usize,
}

impl AudioItem {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Parameters of one read-aloud run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakRequest {
    pub text: String,
    pub voice: String,
    pub speed: f32,
    pub language: String,
}

impl SpeakRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: crate::defaults::DEFAULT_VOICE.to_string(),
            speed: crate::defaults::DEFAULT_SPEED,
            language: crate::defaults::DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Free-form status line.
    Status { text: String },
    /// The sentence with this index is now audible.
    Highlight { index: usize },
    /// No sentence is audible any more.
    ClearHighlight,
    /// The run is over. Sent exactly once per run.
    Finished,
}

/// Cross-thread hand-off of [`PipelineEvent`]s.
///
/// Sending is best effort: a dropped receiver is logged and otherwise ignored.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    tx: Option<Sender<PipelineEvent>>,
}

impl EventEmitter {
    pub fn new(tx: Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// An emitter that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Returns false when the event could not be delivered.
    pub fn emit(&self, event: PipelineEvent) -> bool {
        let Some(tx) = &self.tx else {
            return true;
        };
        match tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(event = ?e.0, "Event receiver gone, notification dropped");
                false
            }
        }
    }

    pub fn status(&self, text: impl Into<String>) -> bool {
        self.emit(PipelineEvent::Status { text: text.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_string(&PipelineEvent::Highlight { index: 2 }).unwrap();
        assert_eq!(json, r#"{"event":"highlight","index":2}"#);

        let json = serde_json::to_string(&PipelineEvent::ClearHighlight).unwrap();
        assert_eq!(json, r#"{"event":"clear_highlight"}"#);
    }

    #[test]
    fn test_emitter_delivers_in_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let emitter = EventEmitter::new(tx);
        assert!(emitter.status("Ready"));
        assert!(emitter.emit(PipelineEvent::Finished));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                PipelineEvent::Status {
                    text: "Ready".to_string()
                },
                PipelineEvent::Finished
            ]
        );
    }

    #[test]
    fn test_emitter_survives_dropped_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let emitter = EventEmitter::new(tx);
        assert!(!emitter.emit(PipelineEvent::Highlight { index: 0 }));
        assert!(EventEmitter::disabled().emit(PipelineEvent::Finished));
    }

    #[test]
    fn test_audio_item_duration() {
        let item = AudioItem {
            samples: vec![0.0; 12_000],
            sample_rate: 24_000,
            index: 0,
        };
        assert_eq!(item.duration_secs(), 0.5);
    }

    #[test]
    fn test_speak_request_builder() {
        let request = SpeakRequest::new("Hi.")
            .with_voice("bf_sky")
            .with_speed(1.5)
            .with_language("en-gb");
        assert_eq!(request.text, "Hi.");
        assert_eq!(request.voice, "bf_sky");
        assert_eq!(request.speed, 1.5);
        assert_eq!(request.language, "en-gb");
    }
}
