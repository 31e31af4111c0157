//! Core station abstraction and runner for the speech pipeline.

use crate::error::{Result, SpeakError};
use crate::pipeline::control::RunControl;
use crate::pipeline::error::{ErrorReporter, StationError};
use crate::pipeline::queue::{PutError, Received, WorkQueue};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A processing station in the speech pipeline.
///
/// Each station receives input, processes it, and produces output.
/// Stations run in their own threads and are connected by [`WorkQueue`]s.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item.
    ///
    /// Returns:
    /// - `Ok(Some(output))` - Successfully processed and produced output
    /// - `Ok(None)` - Successfully processed but no output (e.g., played)
    /// - `Err(StationError)` - Processing failed
    ///
    /// Long blocking calls should consult `control` before and after.
    fn process(
        &mut self,
        input: Self::Input,
        control: &RunControl,
    ) -> std::result::Result<Option<Self::Output>, StationError>;

    /// Returns the name of this station for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Called when the station is shutting down.
    fn shutdown(&mut self) {}
}

/// Queues and control a runner is wired to.
pub struct StationLinks<I, O> {
    pub input: Arc<WorkQueue<I>>,
    /// `None` for the last station.
    pub output: Option<Arc<WorkQueue<O>>>,
    pub control: Arc<RunControl>,
    pub error_reporter: Arc<dyn ErrorReporter>,
    pub poll_interval: Duration,
}

/// How a [`StationRunner::join_until`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Panicked(String),
    /// Still running at the deadline; the thread was detached.
    TimedOut,
}

/// Runs a station in a dedicated thread.
pub struct StationRunner {
    /// Handle to the spawned thread.
    handle: Option<JoinHandle<()>>,
    /// Name of the station (cached for error reporting).
    station_name: &'static str,
}

impl StationRunner {
    /// Spawns a new station in a dedicated, named thread.
    pub fn spawn<S: Station>(mut station: S, links: StationLinks<S::Input, S::Output>) -> Result<Self> {
        let station_name = station.name();

        let handle = thread::Builder::new()
            .name(format!("speakline-{}", station_name))
            .spawn(move || {
                Self::run_station(&mut station, links);
            })
            .map_err(SpeakError::Io)?;

        Ok(Self {
            handle: Some(handle),
            station_name,
        })
    }

    /// Main processing loop for the station.
    ///
    /// Exits when stop is requested, when the input queue is closed and
    /// drained, or on a fatal error. A panic inside `process` is reported as
    /// a recoverable error for that item. Closes the output queue on exit so the
    /// next station can finish in turn.
    fn run_station<S: Station>(station: &mut S, links: StationLinks<S::Input, S::Output>) {
        let StationLinks {
            input,
            output,
            control,
            error_reporter,
            poll_interval,
        } = links;
        let station_name = station.name();

        loop {
            if control.is_stopped() {
                tracing::debug!(station = station_name, "Stop observed");
                break;
            }

            let item = match input.get(poll_interval) {
                Received::Item(item) => item,
                Received::Empty => continue,
                Received::Closed => break,
            };

            if control.should_discard() {
                tracing::debug!(station = station_name, "Discarding item");
                input.task_done();
                continue;
            }

            let mut fatal = false;
            let result = panic::catch_unwind(AssertUnwindSafe(|| station.process(item, &control)))
                .unwrap_or_else(|payload| {
                    Err(StationError::Recoverable(format!(
                        "panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
            match result {
                Ok(Some(out)) => {
                    if control.is_stopped() {
                        input.task_done();
                        break;
                    }
                    if let Some(output) = &output {
                        if control.should_discard() {
                            tracing::debug!(station = station_name, "Discarding output");
                        } else {
                            match output.put(out, poll_interval, || control.should_discard()) {
                                Ok(()) => {}
                                Err(PutError::Aborted(_)) => {
                                    tracing::debug!(station = station_name, "Output dropped by cancellation");
                                }
                                Err(PutError::Closed(_)) => {
                                    tracing::debug!(station = station_name, "Output queue closed");
                                    fatal = true;
                                }
                            }
                        }
                    }
                }
                Ok(None) => {}
                Err(StationError::Recoverable(msg)) => {
                    // Report but continue processing
                    error_reporter.report(station_name, &StationError::Recoverable(msg));
                }
                Err(StationError::Fatal(msg)) => {
                    error_reporter.report(station_name, &StationError::Fatal(msg));
                    fatal = true;
                }
            }
            input.task_done();
            if fatal {
                // Nobody consumes the input any more; release the producer.
                input.close();
                input.drain();
                break;
            }
        }

        // Cleanup on shutdown
        station.shutdown();
        if let Some(output) = &output {
            output.close();
        }
        tracing::debug!(station = station_name, "Station finished");
    }

    /// Returns the name of the station.
    pub fn name(&self) -> &'static str {
        self.station_name
    }

    /// True once the station thread has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait for the thread until `deadline`, joining it to surface panics.
    ///
    /// A thread still running at the deadline is detached, never killed.
    pub fn join_until(mut self, deadline: Instant) -> JoinOutcome {
        let Some(handle) = self.handle.take() else {
            return JoinOutcome::Joined;
        };
        let poll_interval = Duration::from_millis(5);

        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    station = self.station_name,
                    "Station did not stop in time, detaching"
                );
                return JoinOutcome::TimedOut;
            }
            thread::sleep(poll_interval);
        }

        match handle.join() {
            Ok(()) => JoinOutcome::Joined,
            Err(panic_info) => {
                let msg = panic_message(panic_info.as_ref());
                tracing::error!(station = self.station_name, "Station thread panicked: {msg}");
                JoinOutcome::Panicked(msg)
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::CollectingReporter;
    use std::sync::atomic::{AtomicBool, Ordering};

    const POLL: Duration = Duration::from_millis(5);

    // Mock station that doubles integers
    struct DoublerStation {
        shutdown_called: Arc<AtomicBool>,
    }

    impl Station for DoublerStation {
        type Input = i32;
        type Output = i32;

        fn process(
            &mut self,
            input: i32,
            _control: &RunControl,
        ) -> std::result::Result<Option<i32>, StationError> {
            Ok(Some(input * 2))
        }

        fn name(&self) -> &'static str {
            "doubler"
        }

        fn shutdown(&mut self) {
            self.shutdown_called.store(true, Ordering::SeqCst);
        }
    }

    // Mock station that fails on certain inputs
    struct FailingStation {
        fail_on: i32,
        fatal: bool,
    }

    impl Station for FailingStation {
        type Input = i32;
        type Output = i32;

        fn process(
            &mut self,
            input: i32,
            _control: &RunControl,
        ) -> std::result::Result<Option<i32>, StationError> {
            if input != self.fail_on {
                return Ok(Some(input));
            }
            let msg = format!("Failed on {}", input);
            if self.fatal {
                Err(StationError::Fatal(msg))
            } else {
                Err(StationError::Recoverable(msg))
            }
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct Wiring {
        input: Arc<WorkQueue<i32>>,
        output: Arc<WorkQueue<i32>>,
        control: Arc<RunControl>,
        reporter: CollectingReporter,
    }

    impl Wiring {
        fn new() -> Self {
            Self {
                input: Arc::new(WorkQueue::bounded(8)),
                output: Arc::new(WorkQueue::bounded(8)),
                control: Arc::new(RunControl::new()),
                reporter: CollectingReporter::new(),
            }
        }

        fn links(&self) -> StationLinks<i32, i32> {
            StationLinks {
                input: Arc::clone(&self.input),
                output: Some(Arc::clone(&self.output)),
                control: Arc::clone(&self.control),
                error_reporter: Arc::new(self.reporter.clone()),
                poll_interval: POLL,
            }
        }

        fn feed(&self, items: &[i32]) {
            for &i in items {
                self.input.put(i, POLL, || false).unwrap();
            }
            self.input.close();
        }

        fn collect(&self) -> Vec<i32> {
            let mut outputs = Vec::new();
            loop {
                match self.output.get(POLL) {
                    Received::Item(v) => {
                        outputs.push(v);
                        self.output.task_done();
                    }
                    Received::Empty => continue,
                    Received::Closed => break,
                }
            }
            outputs
        }
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(2)
    }

    #[test]
    fn test_station_runner_basic_processing() {
        let wiring = Wiring::new();
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let station = DoublerStation {
            shutdown_called: shutdown_flag.clone(),
        };

        let runner = StationRunner::spawn(station, wiring.links()).unwrap();
        assert_eq!(runner.name(), "doubler");

        wiring.feed(&[1, 2, 3]);
        assert_eq!(wiring.collect(), vec![2, 4, 6]);
        assert!(wiring.input.join(POLL, || false), "all inputs acknowledged");

        assert_eq!(runner.join_until(deadline()), JoinOutcome::Joined);
        assert!(shutdown_flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_station_runner_recoverable_error_skips_item() {
        let wiring = Wiring::new();
        let station = FailingStation {
            fail_on: 2,
            fatal: false,
        };
        let runner = StationRunner::spawn(station, wiring.links()).unwrap();

        wiring.feed(&[1, 2, 3]);
        assert_eq!(wiring.collect(), vec![1, 3]);

        let reported = wiring.reporter.reports();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].0, "failing");
        assert!(reported[0].1.contains("Failed on 2"));

        assert_eq!(runner.join_until(deadline()), JoinOutcome::Joined);
    }

    #[test]
    fn test_station_runner_fatal_error_stops_station() {
        let wiring = Wiring::new();
        let station = FailingStation {
            fail_on: 2,
            fatal: true,
        };
        let runner = StationRunner::spawn(station, wiring.links()).unwrap();

        wiring.feed(&[1, 2, 3]);
        assert_eq!(wiring.collect(), vec![1], "output closes after the fatal error");
        assert_eq!(runner.join_until(deadline()), JoinOutcome::Joined);
    }

    #[test]
    fn test_station_runner_discards_after_skip() {
        let wiring = Wiring::new();
        let station = DoublerStation {
            shutdown_called: Arc::new(AtomicBool::new(false)),
        };
        wiring.control.request_skip();
        let runner = StationRunner::spawn(station, wiring.links()).unwrap();

        wiring.feed(&[1, 2, 3]);
        assert!(wiring.collect().is_empty());
        assert!(wiring.input.join(POLL, || false), "discarded items are acknowledged");
        assert_eq!(runner.join_until(deadline()), JoinOutcome::Joined);
    }

    #[test]
    fn test_station_runner_exits_on_stop_without_close() {
        let wiring = Wiring::new();
        let station = DoublerStation {
            shutdown_called: Arc::new(AtomicBool::new(false)),
        };
        let runner = StationRunner::spawn(station, wiring.links()).unwrap();

        wiring.control.request_stop();
        assert_eq!(runner.join_until(deadline()), JoinOutcome::Joined);
        assert!(wiring.output.is_closed());
    }

    #[test]
    fn test_station_runner_survives_panicking_item() {
        struct Panicky;
        impl Station for Panicky {
            type Input = i32;
            type Output = i32;
            fn process(
                &mut self,
                input: i32,
                _control: &RunControl,
            ) -> std::result::Result<Option<i32>, StationError> {
                if input == 2 {
                    panic!("bad input");
                }
                Ok(Some(input))
            }
            fn name(&self) -> &'static str {
                "panicky"
            }
        }

        let wiring = Wiring::new();
        let runner = StationRunner::spawn(Panicky, wiring.links()).unwrap();
        wiring.feed(&[1, 2, 3]);
        assert_eq!(wiring.collect(), vec![1, 3]);
        assert!(wiring.reporter.reports()[0].1.contains("bad input"));
        assert_eq!(runner.join_until(deadline()), JoinOutcome::Joined);
    }

    #[test]
    fn test_join_until_times_out_on_blocked_station() {
        struct Sleeper;
        impl Station for Sleeper {
            type Input = i32;
            type Output = i32;
            fn process(
                &mut self,
                input: i32,
                _control: &RunControl,
            ) -> std::result::Result<Option<i32>, StationError> {
                thread::sleep(Duration::from_millis(300));
                Ok(Some(input))
            }
            fn name(&self) -> &'static str {
                "sleeper"
            }
        }

        let wiring = Wiring::new();
        let runner = StationRunner::spawn(Sleeper, wiring.links()).unwrap();
        wiring.feed(&[1]);
        thread::sleep(Duration::from_millis(20));

        let outcome = runner.join_until(Instant::now() + Duration::from_millis(20));
        assert_eq!(outcome, JoinOutcome::TimedOut);
    }

    #[test]
    fn test_panic_message_extracts_text() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
