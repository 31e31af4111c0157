use crate::error::{Result, SpeakError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Sample buffer in whatever format the backend produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    F32(Vec<f32>),
    I16(Vec<i16>),
    F64(Vec<f64>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::F32(s) => s.len(),
            Samples::I16(s) => s.len(),
            Samples::F64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize to 32-bit float, full scale at 1.0.
    pub fn into_f32(self) -> Vec<f32> {
        match self {
            Samples::F32(s) => s,
            Samples::I16(s) => s
                .into_iter()
                .map(|v| f32::from(v) / f32::from(i16::MAX))
                .collect(),
            Samples::F64(s) => s.into_iter().map(|v| v as f32).collect(),
        }
    }
}

/// Output of one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub samples: Samples,
    pub sample_rate: u32,
}

/// Trait for text-to-speech synthesis.
///
/// Implementations are shared between the CLI (voice listing) and the
/// synthesis station thread, hence `Send + Sync` and `&self` methods.
/// A backend handle is always initialized: construction is the
/// "load the model" step and fails with [`SpeakError::BackendInit`].
pub trait TtsBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Voices the loaded model offers, in model order.
    fn list_voices(&self) -> Result<Vec<String>>;

    /// Synthesize one sentence.
    ///
    /// Not preemptible: cancellation is only observed before and after the call.
    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        language: &str,
    ) -> Result<SynthesizedAudio>;
}

impl<T: TtsBackend + ?Sized> TtsBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn list_voices(&self) -> Result<Vec<String>> {
        (**self).list_voices()
    }

    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        language: &str,
    ) -> Result<SynthesizedAudio> {
        (**self).synthesize(text, voice, speed, language)
    }
}

/// A gate that holds synthesis calls until opened.
///
/// Lets tests pause the synthesis stage to observe backpressure.
#[derive(Debug, Default)]
pub struct SynthesisGate {
    open: Mutex<bool>,
    cvar: Condvar,
}

impl SynthesisGate {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        if let Ok(mut open) = self.open.lock() {
            *open = true;
            self.cvar.notify_all();
        }
    }

    fn wait(&self) {
        let Ok(mut open) = self.open.lock() else {
            return;
        };
        while !*open {
            open = match self.cvar.wait(open) {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
    }
}

/// One recorded synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisCall {
    pub text: String,
    pub voice: String,
    pub speed: f32,
    pub language: String,
}

/// Mock backend for testing.
///
/// Produces a constant buffer per sentence whose length grows with the call
/// number, and records every call it receives.
#[derive(Debug, Clone)]
pub struct MockBackend {
    voices: Vec<String>,
    sample_rate: u32,
    samples_per_sentence: usize,
    fail_on_calls: HashSet<usize>,
    fail_voice_listing: bool,
    empty_output: bool,
    delay: Option<Duration>,
    gate: Option<Arc<SynthesisGate>>,
    calls: Arc<Mutex<Vec<SynthesisCall>>>,
    call_count: Arc<AtomicUsize>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a mock offering `af_heart` and `bf_sky` at 24 kHz.
    pub fn new() -> Self {
        Self {
            voices: vec!["af_heart".to_string(), "bf_sky".to_string()],
            sample_rate: 24_000,
            samples_per_sentence: 240,
            fail_on_calls: HashSet::new(),
            fail_voice_listing: false,
            empty_output: false,
            delay: None,
            gate: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the voice list.
    pub fn with_voices(mut self, voices: &[&str]) -> Self {
        self.voices = voices.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Fail the n-th synthesis call (zero-based).
    pub fn with_failure_on_call(mut self, call: usize) -> Self {
        self.fail_on_calls.insert(call);
        self
    }

    /// Make `list_voices` return an error.
    pub fn with_voice_listing_failure(mut self) -> Self {
        self.fail_voice_listing = true;
        self
    }

    /// Return zero samples for every call.
    pub fn with_empty_output(mut self) -> Self {
        self.empty_output = true;
        self
    }

    /// Sleep this long inside every synthesis call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Block every synthesis call until the gate opens.
    pub fn with_gate(mut self, gate: Arc<SynthesisGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<SynthesisCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl TtsBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn list_voices(&self) -> Result<Vec<String>> {
        if self.fail_voice_listing {
            return Err(SpeakError::BackendInit {
                message: "mock voice listing failure".to_string(),
            });
        }
        Ok(self.voices.clone())
    }

    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        language: &str,
    ) -> Result<SynthesizedAudio> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let call = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(SynthesisCall {
                text: text.to_string(),
                voice: voice.to_string(),
                speed,
                language: language.to_string(),
            });
        }

        if self.fail_on_calls.contains(&call) {
            return Err(SpeakError::Synthesis {
                message: format!("mock failure on call {}", call),
            });
        }

        let len = if self.empty_output {
            0
        } else {
            self.samples_per_sentence + call
        };
        Ok(SynthesizedAudio {
            samples: Samples::I16(vec![i16::MAX / 2; len]),
            sample_rate: self.sample_rate,
        })
    }
}
