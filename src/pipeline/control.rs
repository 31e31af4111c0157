//! Per-run cancellation state shared by the controller and both stations.

use std::sync::atomic::{AtomicU8, Ordering};

/// Cancellation state of one run.
///
/// Transitions only move forward: `Running -> SkipRequested -> StopRequested`
/// or `Running -> StopRequested`. Stop is terminal and subsumes skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RunState {
    Running = 0,
    SkipRequested = 1,
    StopRequested = 2,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RunState::Running,
            1 => RunState::SkipRequested,
            _ => RunState::StopRequested,
        }
    }
}

/// Lock-free holder for [`RunState`].
#[derive(Debug, Default)]
pub struct RunControl {
    state: AtomicU8,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Discard queued and in-flight work but let the run wind down by itself.
    /// No effect once stop was requested.
    pub fn request_skip(&self) {
        self.state
            .fetch_max(RunState::SkipRequested as u8, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.state
            .fetch_max(RunState::StopRequested as u8, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == RunState::StopRequested
    }

    /// True once skip or stop was requested.
    pub fn should_discard(&self) -> bool {
        self.state() != RunState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_running() {
        let control = RunControl::new();
        assert_eq!(control.state(), RunState::Running);
        assert!(!control.should_discard());
        assert!(!control.is_stopped());
    }

    #[test]
    fn test_skip_discards_without_stopping() {
        let control = RunControl::new();
        control.request_skip();
        assert_eq!(control.state(), RunState::SkipRequested);
        assert!(control.should_discard());
        assert!(!control.is_stopped());
    }

    #[test]
    fn test_stop_subsumes_skip_and_is_terminal() {
        let control = RunControl::new();
        control.request_stop();
        control.request_skip();
        assert_eq!(
            control.state(),
            RunState::StopRequested,
            "skip must not downgrade a stop"
        );
        assert!(control.should_discard());

        control.request_stop();
        assert!(control.is_stopped());
    }

    #[test]
    fn test_skip_then_stop() {
        let control = RunControl::new();
        control.request_skip();
        control.request_stop();
        assert!(control.is_stopped());
    }
}
