use std::fmt;
use std::time::{Duration, Instant};

use crate::error::FlushError;
use crate::types::{Entry, FlushReport, LogIndex, TermIndex};

/// Lifecycle of the flush daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Waiting for a flush trigger.
    Idle,
    /// Exchanging the active and ready buffers.
    Swapping,
    /// Committing the runs of the ready buffer.
    Committing,
    /// Loop stopped by `stop_daemon`; callers flush inline.
    Halted,
    /// A commit failed fatally; no further work is accepted.
    Failed,
    /// Shut down.
    Stopped,
}

impl DaemonState {
    /// True while the background thread owns flushing.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            DaemonState::Idle | DaemonState::Swapping | DaemonState::Committing
        )
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DaemonState::Idle => "idle",
            DaemonState::Swapping => "swapping",
            DaemonState::Committing => "committing",
            DaemonState::Halted => "halted",
            DaemonState::Failed => "failed",
            DaemonState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Everything guarded by the buffer mutex.
pub(super) struct BufferState {
    pub(super) active: Vec<Entry>,
    pub(super) daemon: DaemonState,
    /// Flush requests issued by `drain`/`flush_current_buffer`.
    pub(super) requested_cycles: u64,
    /// Highest request known to be fully committed.
    pub(super) completed_cycles: u64,
    /// Set by `shutdown`; `add` is refused from then on.
    pub(super) closed: bool,
    pub(super) fatal: Option<(TermIndex, String)>,
    pub(super) last_accepted: Option<LogIndex>,
    pub(super) oldest_pending: Option<Instant>,
    /// Work committed since construction.
    pub(super) totals: FlushReport,
}

impl BufferState {
    pub(super) fn new(daemon: DaemonState, last_accepted: Option<LogIndex>) -> Self {
        Self {
            active: Vec::new(),
            daemon,
            requested_cycles: 0,
            completed_cycles: 0,
            closed: false,
            fatal: None,
            last_accepted,
            oldest_pending: None,
            totals: FlushReport::default(),
        }
    }

    pub(super) fn fatal_error(&self) -> Option<FlushError> {
        self.fatal
            .clone()
            .map(|(at, reason)| FlushError::CommitFailure { at, reason })
    }

    pub(super) fn wants_flush(&self, threshold: usize, max_delay: Duration) -> bool {
        if self.requested_cycles > self.completed_cycles {
            return true;
        }
        if self.active.is_empty() {
            return false;
        }
        self.active.len() >= threshold
            || self
                .oldest_pending
                .is_some_and(|since| since.elapsed() >= max_delay)
    }

    /// How long the daemon may sleep before the oldest entry becomes overdue.
    pub(super) fn next_deadline(&self, max_delay: Duration) -> Option<Duration> {
        self.oldest_pending
            .map(|since| max_delay.saturating_sub(since.elapsed()))
    }

    pub(super) fn absorb(&mut self, report: &FlushReport) {
        self.totals.runs += report.runs;
        self.totals.entries += report.entries;
        if report.last_committed.is_some() {
            self.totals.last_committed = report.last_committed;
        }
    }

    /// Work committed between `before` and now.
    pub(super) fn report_since(&self, before: &FlushReport) -> FlushReport {
        let runs = self.totals.runs - before.runs;
        FlushReport {
            runs,
            entries: self.totals.entries - before.entries,
            last_committed: if runs > 0 {
                self.totals.last_committed
            } else {
                None
            },
        }
    }
}
