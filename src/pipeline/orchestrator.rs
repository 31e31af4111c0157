//! Pipeline controller: one read-aloud run at a time.
//!
//! Each run owns a task queue, an audio queue, a [`RunControl`] and two
//! station threads (synthesis, playback). A third thread per run submits the
//! sentences, waits for the stations to drain and then performs the cleanup
//! that always ends a run: stop routine, clear highlight, run log entry,
//! `Ready` status and exactly one `Finished` event.

use crate::audio::sink::AudioSink;
use crate::config::QueueConfig;
use crate::defaults;
use crate::error::{Result, SpeakError};
use crate::pipeline::control::{RunControl, RunState};
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::playback_station::{DeviceLock, PlaybackStation};
use crate::pipeline::queue::{PutError, WorkQueue};
use crate::pipeline::station::{JoinOutcome, StationLinks, StationRunner, panic_message};
use crate::pipeline::synthesis_station::SynthesisStation;
use crate::pipeline::types::{AudioItem, EventEmitter, PipelineEvent, SentenceTask, SpeakRequest};
use crate::run_log::RunLog;
use crate::text::{Segments, segment};
use crate::tts::backend::TtsBackend;
use crossbeam_channel::Sender;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Status text while a run is speaking.
pub const STATUS_SPEAKING: &str = "Synthesizing and playing...";

/// Configuration for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Sentence task queue capacity
    pub task_queue: usize,
    /// Audio item queue capacity
    pub audio_queue: usize,
    /// How long a blocked queue operation waits before re-checking run control
    pub poll_interval: Duration,
    /// Per-worker join timeout for the stop routine
    pub join_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            task_queue: defaults::TASK_QUEUE_CAPACITY,
            audio_queue: defaults::AUDIO_QUEUE_CAPACITY,
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            join_timeout: Duration::from_millis(defaults::JOIN_TIMEOUT_MS),
        }
    }
}

impl From<&QueueConfig> for PipelineConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            task_queue: config.task_queue,
            audio_queue: config.audio_queue,
            poll_interval: config.poll_interval(),
            join_timeout: config.join_timeout(),
        }
    }
}

/// Lifecycle of a run as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Starting,
    Active,
    Draining,
    Stopped,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Skipped,
    Stopped,
    /// The run body returned an error or panicked; cleanup still ran.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Segments the run was asked to speak.
    pub sentences: usize,
    pub outcome: RunOutcome,
}

enum Workers {
    NotStarted,
    Running(Vec<StationRunner>),
    Stopped,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared state of one run.
struct Run {
    control: Arc<RunControl>,
    tasks: Arc<WorkQueue<SentenceTask>>,
    audio: Arc<WorkQueue<AudioItem>>,
    workers: Mutex<Workers>,
    state: Mutex<PipelineState>,
    finished: Mutex<bool>,
    finished_cv: Condvar,
    join_timeout: Duration,
}

impl Run {
    fn new(config: &PipelineConfig) -> Self {
        Self {
            control: Arc::new(RunControl::new()),
            tasks: Arc::new(WorkQueue::bounded(config.task_queue)),
            audio: Arc::new(WorkQueue::bounded(config.audio_queue)),
            workers: Mutex::new(Workers::NotStarted),
            state: Mutex::new(PipelineState::Starting),
            finished: Mutex::new(false),
            finished_cv: Condvar::new(),
            join_timeout: config.join_timeout,
        }
    }

    fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    fn set_state(&self, state: PipelineState) {
        let mut current = lock(&self.state);
        // Stopped is terminal.
        if *current != PipelineState::Stopped {
            *current = state;
        }
    }

    /// Spawn the station threads unless the run was already stopped.
    fn spawn_workers(
        &self,
        build: impl FnOnce(&mut Vec<StationRunner>) -> Result<()>,
    ) -> Result<()> {
        let mut workers = lock(&self.workers);
        if !matches!(*workers, Workers::NotStarted) || self.control.is_stopped() {
            return Ok(());
        }
        let mut runners = Vec::new();
        let result = build(&mut runners);
        *workers = Workers::Running(runners);
        result
    }

    fn workers_finished(&self) -> bool {
        match &*lock(&self.workers) {
            Workers::Running(runners) => runners.iter().all(StationRunner::is_finished),
            Workers::NotStarted | Workers::Stopped => true,
        }
    }

    /// The unconditional stop routine. Idempotent.
    ///
    /// Sets stop, discards both queues and joins each station with the
    /// join timeout. Stations that overrun are detached.
    fn stop(&self) {
        self.control.request_stop();

        let mut workers = lock(&self.workers);
        let runners = match std::mem::replace(&mut *workers, Workers::Stopped) {
            Workers::Stopped => return,
            Workers::NotStarted => Vec::new(),
            Workers::Running(runners) => runners,
        };

        let discarded = self.tasks.drain() + self.audio.drain();
        if discarded > 0 {
            tracing::debug!(discarded, "Discarded queued items");
        }

        for runner in runners {
            let name = runner.name();
            match runner.join_until(Instant::now() + self.join_timeout) {
                JoinOutcome::Joined => {}
                JoinOutcome::TimedOut => {
                    tracing::warn!(station = name, timeout = ?self.join_timeout, "Join timed out");
                }
                JoinOutcome::Panicked(msg) => {
                    tracing::error!(station = name, "Station panicked: {msg}");
                }
            }
        }

        // Anything a station managed to enqueue while shutting down.
        self.tasks.drain();
        self.audio.drain();
        self.set_state(PipelineState::Stopped);
    }

    fn outcome(&self) -> RunOutcome {
        match self.control.state() {
            RunState::Running => RunOutcome::Completed,
            RunState::SkipRequested => RunOutcome::Skipped,
            RunState::StopRequested => RunOutcome::Stopped,
        }
    }

    fn mark_finished(&self) {
        *lock(&self.finished) = true;
        self.finished_cv.notify_all();
    }

    fn is_finished(&self) -> bool {
        *lock(&self.finished)
    }

    fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut finished = lock(&self.finished);
        while !*finished {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            finished = match self.finished_cv.wait_timeout(finished, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

/// Everything the run thread needs, cloned out of the controller.
#[derive(Clone)]
struct RunContext {
    config: PipelineConfig,
    backend: Arc<dyn TtsBackend>,
    sink: Arc<dyn AudioSink>,
    error_reporter: Arc<dyn ErrorReporter>,
    events: EventEmitter,
    run_log: Option<Arc<RunLog>>,
    device: Arc<DeviceLock>,
}

impl RunContext {
    /// Thread body: the run itself, then cleanup no matter how it ended.
    fn drive(self, run: Arc<Run>, request: SpeakRequest, segments: Vec<String>) -> RunSummary {
        let sentences = segments.len();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.execute(&run, &request, segments)
        }));
        let outcome = match result {
            Ok(Ok(())) => run.outcome(),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Speech run failed");
                RunOutcome::Failed(e.to_string())
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                tracing::error!("Speech run panicked: {msg}");
                RunOutcome::Failed(msg)
            }
        };

        run.stop();
        self.events.emit(PipelineEvent::ClearHighlight);
        if let Some(run_log) = &self.run_log
            && let Err(e) = run_log.record(sentences)
        {
            tracing::warn!(error = %e, path = %run_log.path().display(), "Failed to write run log");
        }
        self.events.status(defaults::STATUS_READY);
        self.events.emit(PipelineEvent::Finished);
        run.mark_finished();

        tracing::info!(sentences, outcome = ?outcome, "Speech run finished");
        RunSummary {
            sentences,
            outcome,
        }
    }

    fn execute(&self, run: &Run, request: &SpeakRequest, segments: Vec<String>) -> Result<()> {
        let poll = self.config.poll_interval;
        self.events.status(STATUS_SPEAKING);

        run.spawn_workers(|runners| {
            let playback = PlaybackStation::new(Arc::clone(&self.sink), self.events.clone())
                .with_device_lock(Arc::clone(&self.device), poll);
            runners.push(StationRunner::spawn(
                playback,
                StationLinks {
                    input: Arc::clone(&run.audio),
                    output: None,
                    control: Arc::clone(&run.control),
                    error_reporter: Arc::clone(&self.error_reporter),
                    poll_interval: poll,
                },
            )?);

            let synthesis = SynthesisStation::new(
                Arc::clone(&self.backend),
                &request.voice,
                request.speed,
                &request.language,
            );
            runners.push(StationRunner::spawn(
                synthesis,
                StationLinks {
                    input: Arc::clone(&run.tasks),
                    output: Some(Arc::clone(&run.audio)),
                    control: Arc::clone(&run.control),
                    error_reporter: Arc::clone(&self.error_reporter),
                    poll_interval: poll,
                },
            )?);
            Ok(())
        })?;
        run.set_state(PipelineState::Active);

        for (index, text) in segments.into_iter().enumerate() {
            match run
                .tasks
                .put(SentenceTask { text, index }, poll, || run.control.should_discard())
            {
                Ok(()) => {}
                Err(PutError::Aborted(_)) | Err(PutError::Closed(_)) => {
                    tracing::debug!(index, "Submission cancelled");
                    break;
                }
            }
        }
        run.tasks.close();
        run.set_state(PipelineState::Draining);

        run.tasks.join(poll, || run.control.is_stopped());
        while !run.control.is_stopped() && !run.workers_finished() {
            thread::sleep(poll);
        }
        Ok(())
    }
}

/// Handle to one started run.
pub struct RunHandle {
    run: Arc<Run>,
    thread: Option<JoinHandle<RunSummary>>,
    segments: Segments,
}

impl RunHandle {
    /// The segments being spoken; index `i` is highlighted as line `i`.
    pub fn segments(&self) -> &Segments {
        &self.segments
    }

    pub fn state(&self) -> PipelineState {
        self.run.state()
    }

    pub fn is_finished(&self) -> bool {
        self.run.is_finished()
    }

    pub fn request_stop(&self) {
        self.run.stop();
    }

    pub fn request_skip(&self) {
        self.run.control.request_skip();
    }

    /// Block until the run has emitted `Finished`.
    pub fn wait(mut self) -> RunSummary {
        let sentences = self.segments.len();
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(summary)) => summary,
            Some(Err(payload)) => RunSummary {
                sentences,
                outcome: RunOutcome::Failed(panic_message(payload.as_ref())),
            },
            None => RunSummary {
                sentences,
                outcome: self.run.outcome(),
            },
        }
    }
}

/// Speech pipeline: text → SentenceSplitter → Synthesis → Playback.
pub struct PipelineController {
    context: RunContext,
    current: Mutex<Option<Arc<Run>>>,
}

impl PipelineController {
    /// Creates a controller with the default error reporter and no event receiver.
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn TtsBackend>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            context: RunContext {
                config,
                backend,
                sink,
                error_reporter: Arc::new(LogReporter),
                events: EventEmitter::disabled(),
                run_log: None,
                device: Arc::new(DeviceLock::new()),
            },
            current: Mutex::new(None),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.context.error_reporter = reporter;
        self
    }

    /// Deliver [`PipelineEvent`]s to this channel.
    pub fn with_event_sender(mut self, tx: Sender<PipelineEvent>) -> Self {
        self.context.events = EventEmitter::new(tx);
        self
    }

    /// Record the sentence count of every run.
    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.context.run_log = Some(Arc::new(run_log));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.context.config
    }

    /// State of the current (or last) run, `Idle` before the first one.
    pub fn state(&self) -> PipelineState {
        lock(&self.current)
            .as_ref()
            .map_or(PipelineState::Idle, |run| run.state())
    }

    /// Start a run in the background.
    ///
    /// Fails with [`SpeakError::PipelineBusy`] while another run is active,
    /// unless that run was skipped or stopped: then this waits for it to wind
    /// down first (stopping it if it does not within the join timeout).
    pub fn start(&self, request: SpeakRequest) -> Result<RunHandle> {
        let previous = lock(&self.current).clone();
        if let Some(prev) = previous
            && !prev.is_finished()
        {
            if !prev.control.should_discard() {
                return Err(SpeakError::PipelineBusy);
            }
            let grace = self.context.config.join_timeout * 2;
            if !prev.wait_finished(grace) {
                tracing::warn!("Previous run did not wind down after skip, stopping it");
                prev.stop();
                if !prev.wait_finished(grace) {
                    return Err(SpeakError::PipelineBusy);
                }
            }
        }

        let segments = segment(&request.text);
        let run = Arc::new(Run::new(&self.context.config));

        let mut current = lock(&self.current);
        if let Some(other) = current.as_ref()
            && !other.is_finished()
        {
            return Err(SpeakError::PipelineBusy);
        }
        *current = Some(Arc::clone(&run));
        drop(current);

        tracing::info!(
            sentences = segments.len(),
            backend = self.context.backend.name(),
            sink = self.context.sink.name(),
            voice = %request.voice,
            speed = request.speed,
            "Starting speech run"
        );

        let context = self.context.clone();
        let thread_run = Arc::clone(&run);
        let thread_segments = segments.as_slice().to_vec();
        let spawned = thread::Builder::new()
            .name("speakline-run".to_string())
            .spawn(move || context.drive(thread_run, request, thread_segments));

        match spawned {
            Ok(thread) => Ok(RunHandle {
                run,
                thread: Some(thread),
                segments,
            }),
            Err(e) => {
                run.stop();
                run.mark_finished();
                Err(SpeakError::Io(e))
            }
        }
    }

    /// Stop whatever is running, then start `request`.
    ///
    /// This is the "press Speak again" behaviour of an interactive front end.
    pub fn restart(&self, request: SpeakRequest) -> Result<RunHandle> {
        self.request_stop();
        self.start(request)
    }

    /// Start a run and block until it has finished.
    pub fn speak(&self, request: SpeakRequest) -> Result<RunSummary> {
        Ok(self.start(request)?.wait())
    }

    /// Stop the current run. Valid in any state; repeated calls are no-ops.
    pub fn request_stop(&self) {
        let current = lock(&self.current).clone();
        if let Some(run) = current {
            run.stop();
        }
    }

    /// Discard everything queued or in flight; a new [`start`](Self::start) is accepted.
    pub fn request_skip(&self) {
        let current = lock(&self.current).clone();
        if let Some(run) = current {
            run.control.request_skip();
        }
    }
}
