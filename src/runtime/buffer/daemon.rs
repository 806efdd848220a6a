use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::{DoubleBufferConfig, FatalErrorPolicy};
use crate::error::{FlushError, FlushResult};
use crate::metadata::MetadataStore;
use crate::metrics::FlushMetrics;
use crate::runtime::committer::StoreCommitter;
use crate::runtime::splitter::split_runs;
use crate::runtime::watermark::WatermarkNotifier;
use crate::types::{Entry, FlushReport, TermIndex};

use super::state::{BufferState, DaemonState};

/// Who is running a flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Driver {
    Daemon,
    Caller,
}

/// Owned by whoever holds the cycle mutex.
pub(super) struct CycleState {
    pub(super) ready: Vec<Entry>,
    pub(super) notifier: WatermarkNotifier,
}

struct CycleOutcome {
    report: FlushReport,
    aborted: bool,
    failure: Option<(TermIndex, FlushError)>,
}

/// State shared between the producers, the daemon thread and inline flushers.
pub(super) struct Shared<S: MetadataStore> {
    pub(super) state: Mutex<BufferState>,
    pub(super) flush_wanted: Condvar,
    pub(super) not_full: Condvar,
    pub(super) cycle_done: Condvar,
    pub(super) cycle: Mutex<CycleState>,
    pub(super) committer: StoreCommitter<S>,
    pub(super) metrics: FlushMetrics,
    pub(super) max_unflushed: usize,
    pub(super) flush_threshold: usize,
    pub(super) max_flush_delay: Duration,
    pub(super) fatal_policy: FatalErrorPolicy,
    /// Abrupt shutdown requested; cycles stop between runs.
    pub(super) abort: AtomicBool,
    pub(super) abandoned: AtomicUsize,
}

impl<S: MetadataStore> Shared<S> {
    pub(super) fn new(
        store: Arc<S>,
        config: &DoubleBufferConfig,
        metrics: FlushMetrics,
        initial: BufferState,
        notifier: WatermarkNotifier,
    ) -> Self {
        Self {
            state: Mutex::new(initial),
            flush_wanted: Condvar::new(),
            not_full: Condvar::new(),
            cycle_done: Condvar::new(),
            cycle: Mutex::new(CycleState {
                ready: Vec::new(),
                notifier,
            }),
            committer: StoreCommitter::new(
                store,
                metrics.clone(),
                config.max_commit_retries,
                config.commit_retry_backoff,
            ),
            metrics,
            max_unflushed: config.max_unflushed_transaction_count,
            flush_threshold: config.flush_threshold,
            max_flush_delay: config.max_flush_delay,
            fatal_policy: config.fatal_error_policy,
            abort: AtomicBool::new(false),
            abandoned: AtomicUsize::new(0),
        }
    }

    /// Body of the `doublebuffer-flush` thread.
    pub(super) fn run_daemon(self: Arc<Self>) {
        tracing::debug!("Flush daemon started");
        loop {
            {
                let mut state = self.state.lock();
                loop {
                    if !state.daemon.is_running() {
                        tracing::debug!(state = %state.daemon, "Flush daemon exiting");
                        return;
                    }
                    if state.closed {
                        if self.abort.load(Ordering::Acquire) || state.active.is_empty() {
                            tracing::debug!("Flush daemon exiting for shutdown");
                            return;
                        }
                        break;
                    }
                    if state.wants_flush(self.flush_threshold, self.max_flush_delay) {
                        break;
                    }
                    match state.next_deadline(self.max_flush_delay) {
                        Some(timeout) => {
                            self.flush_wanted.wait_for(&mut state, timeout);
                        }
                        None => self.flush_wanted.wait(&mut state),
                    }
                }
            }

            if self.run_cycle(Driver::Daemon).is_err() {
                // The failure is latched and logged by the cycle.
                return;
            }
        }
    }

    /// Swaps the buffers, commits every run of the drained buffer and
    /// reports the watermark after each run.
    pub(super) fn run_cycle(&self, driver: Driver) -> FlushResult<FlushReport> {
        let mut cycle = self.cycle.lock();

        let served = {
            let mut state = self.state.lock();
            if let Some(err) = state.fatal_error() {
                return Err(err);
            }
            if driver == Driver::Daemon {
                if !state.daemon.is_running() {
                    return Ok(FlushReport::default());
                }
                state.daemon = DaemonState::Swapping;
            }

            std::mem::swap(&mut state.active, &mut cycle.ready);
            state.oldest_pending = None;
            let served = state.requested_cycles;
            self.metrics.update_pending(0);

            if driver == Driver::Daemon && state.daemon == DaemonState::Swapping {
                state.daemon = DaemonState::Committing;
            }
            self.not_full.notify_all();
            served
        };

        if !cycle.ready.is_empty() {
            tracing::debug!(
                entries = cycle.ready.len(),
                ?driver,
                "Swapped buffers; committing ready buffer"
            );
        }

        let outcome = self.commit_ready(&mut cycle);
        cycle.ready.clear();

        let mut state = self.state.lock();
        state.absorb(&outcome.report);
        match outcome.failure {
            None => {
                if !outcome.aborted {
                    state.completed_cycles = state.completed_cycles.max(served);
                }
                if driver == Driver::Daemon && state.daemon == DaemonState::Committing {
                    state.daemon = DaemonState::Idle;
                }
                self.cycle_done.notify_all();
                Ok(outcome.report)
            }
            Some((at, err)) => Err(self.latch_failure(&mut state, at, err)),
        }
    }

    fn commit_ready(&self, cycle: &mut CycleState) -> CycleOutcome {
        let CycleState { ready, notifier } = cycle;
        let runs = split_runs(ready);
        let mut report = FlushReport::default();
        let mut aborted = false;

        for (position, run) in runs.iter().enumerate() {
            if self.abort.load(Ordering::Acquire) {
                let abandoned: usize = runs[position..].iter().map(|run| run.len()).sum();
                self.abandoned.fetch_add(abandoned, Ordering::AcqRel);
                tracing::warn!(
                    abandoned,
                    remaining_runs = runs.len() - position,
                    "Abrupt shutdown; leaving remaining runs uncommitted"
                );
                aborted = true;
                break;
            }

            match self.committer.commit_run(run) {
                Ok(outcome) => {
                    report.runs += 1;
                    report.entries += outcome.entries;
                    report.last_committed = Some(outcome.committed);
                    notifier.notify(outcome.committed);
                }
                Err(err) => {
                    let at = run.last_term_index().unwrap_or_default();
                    return CycleOutcome {
                        report,
                        aborted,
                        failure: Some((at, err)),
                    };
                }
            }
        }

        CycleOutcome {
            report,
            aborted,
            failure: None,
        }
    }

    fn latch_failure(
        &self,
        state: &mut BufferState,
        at: TermIndex,
        err: FlushError,
    ) -> FlushError {
        let reason = err.to_string();
        tracing::error!(%at, %reason, "Commit failure; double buffer is no longer serving");

        self.metrics.record_failure();
        if state.fatal.is_none() {
            state.fatal = Some((at, reason.clone()));
        }
        state.daemon = DaemonState::Failed;

        self.flush_wanted.notify_all();
        self.not_full.notify_all();
        self.cycle_done.notify_all();

        if self.fatal_policy == FatalErrorPolicy::Terminate {
            tracing::error!(%at, "Terminating process after fatal commit failure");
            std::process::exit(1);
        }

        state
            .fatal_error()
            .unwrap_or(FlushError::CommitFailure { at, reason })
    }
}
