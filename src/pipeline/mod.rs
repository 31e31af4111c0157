//! Speech pipeline.
//!
//! Text is split into sentences and fed through two stations, each running
//! in its own thread and connected by bounded [`WorkQueue`]s for
//! backpressure: synthesis (text to audio) and playback (audio to the sink).

pub mod control;
pub mod error;
pub mod orchestrator;
pub mod playback_station;
pub mod queue;
pub mod station;
pub mod synthesis_station;
pub mod types;

pub use control::{RunControl, RunState};
pub use error::{CollectingReporter, ErrorReporter, LogReporter, StationError};
pub use orchestrator::{
    PipelineConfig, PipelineController, PipelineState, RunHandle, RunOutcome, RunSummary,
};
pub use playback_station::{DeviceLock, PlaybackStation};
pub use queue::{PutError, Received, WorkQueue};
pub use station::{Station, StationRunner};
pub use synthesis_station::SynthesisStation;
pub use types::{AudioItem, EventEmitter, PipelineEvent, SentenceTask, SpeakRequest};
