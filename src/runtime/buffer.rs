//! The double buffer.
//!
//! Producers append to the active buffer while the `doublebuffer-flush`
//! thread commits the ready one. A flush cycle swaps the two under the buffer
//! mutex, so producers never wait on the store unless the active buffer is
//! full.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::{DoubleBufferConfig, ShutdownPolicy};
use crate::error::{FlushError, FlushResult};
use crate::metadata::{Checkpoint, MetadataStore};
use crate::metrics::FlushMetrics;
use crate::runtime::watermark::WatermarkNotifier;
use crate::types::{Entry, FlushReport, TermIndex};

mod daemon;
mod state;

pub use state::DaemonState;

use daemon::{Driver, Shared};
use state::BufferState;

const DAEMON_THREAD_NAME: &str = "doublebuffer-flush";

/// Buffers applied log entries and flushes them to a [`MetadataStore`] in
/// batches.
pub struct DoubleBuffer<S: MetadataStore + 'static> {
    shared: Arc<Shared<S>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown_policy: ShutdownPolicy,
}

impl<S: MetadataStore + 'static> DoubleBuffer<S> {
    /// Validates `config`, resumes from the store's transaction info and,
    /// unless disabled, starts the flush daemon.
    pub fn new(store: Arc<S>, config: DoubleBufferConfig) -> FlushResult<Self> {
        config.validate()?;

        let metrics = FlushMetrics::new();
        let persisted = store.last_committed()?;
        if let Some(committed) = persisted {
            metrics.update_last_committed(committed);
        }

        let mut notifier = WatermarkNotifier::new(
            config.ratis_enabled,
            config.snapshot_callback.clone(),
            config.index_to_term.clone(),
            metrics.clone(),
        );
        notifier.resume_from(persisted);

        let daemon_state = if config.start_daemon {
            DaemonState::Idle
        } else {
            DaemonState::Halted
        };
        let initial = BufferState::new(daemon_state, persisted.map(|ti| ti.index));
        let shared = Arc::new(Shared::new(store, &config, metrics, initial, notifier));

        let worker = if config.start_daemon {
            Some(Self::spawn_daemon(&shared)?)
        } else {
            None
        };

        tracing::info!(
            max_unflushed = config.max_unflushed_transaction_count,
            flush_threshold = config.flush_threshold,
            max_flush_delay_ms = config.max_flush_delay.as_millis() as u64,
            ratis_enabled = config.ratis_enabled,
            daemon = %daemon_state,
            resumed_from = ?persisted,
            "Double buffer ready"
        );

        Ok(Self {
            shared,
            worker: Mutex::new(worker),
            shutdown_policy: config.shutdown_policy,
        })
    }

    fn spawn_daemon(shared: &Arc<Shared<S>>) -> FlushResult<JoinHandle<()>> {
        let daemon = Arc::clone(shared);
        let handle = std::thread::Builder::new()
            .name(DAEMON_THREAD_NAME.to_string())
            .spawn(move || daemon.run_daemon())?;
        Ok(handle)
    }

    /// Appends `entry` to the active buffer.
    ///
    /// Blocks while the active buffer holds `max_unflushed_transaction_count`
    /// entries. Log indices must be strictly increasing.
    pub fn add(&self, entry: Entry) -> FlushResult<()> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        loop {
            if let Some(err) = state.fatal_error() {
                return Err(err);
            }
            if state.closed || state.daemon == DaemonState::Stopped {
                return Err(FlushError::BufferClosed);
            }
            if state.active.len() < shared.max_unflushed {
                break;
            }
            if state.daemon.is_running() {
                shared.flush_wanted.notify_one();
            }
            shared.not_full.wait(&mut state);
        }

        if let Some(last) = state.last_accepted {
            if entry.log_index <= last {
                return Err(FlushError::IndexNotIncreasing {
                    index: entry.log_index,
                    last,
                });
            }
        }

        state.last_accepted = Some(entry.log_index);
        state.active.push(entry);
        if state.oldest_pending.is_none() {
            state.oldest_pending = Some(Instant::now());
        }

        let pending = state.active.len();
        shared.metrics.update_pending(pending);
        // The first pending entry arms the delay timer.
        if state.daemon.is_running() && (pending == 1 || pending >= shared.flush_threshold) {
            shared.flush_wanted.notify_one();
        }
        Ok(())
    }

    /// Blocks until every entry added before the call has been committed.
    pub fn drain(&self) -> FlushResult<()> {
        self.request_flush().map(|_| ())
    }

    /// Forces a full swap, split and commit cycle.
    ///
    /// Runs on the calling thread while the daemon is halted; otherwise the
    /// daemon performs the cycle and the report covers the work it committed
    /// in the meantime.
    pub fn flush_current_buffer(&self) -> FlushResult<FlushReport> {
        self.request_flush()
    }

    fn request_flush(&self) -> FlushResult<FlushReport> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if let Some(err) = state.fatal_error() {
            return Err(err);
        }

        let daemon = state.daemon;
        match daemon {
            DaemonState::Stopped => return self.stopped_report(&state, &state.totals),
            DaemonState::Halted => {
                drop(state);
                return shared.run_cycle(Driver::Caller);
            }
            DaemonState::Idle if state.active.is_empty() => {
                return Ok(FlushReport::default());
            }
            _ => {}
        }

        let before = state.totals;
        state.requested_cycles += 1;
        let ticket = state.requested_cycles;
        shared.flush_wanted.notify_one();

        loop {
            if state.completed_cycles >= ticket {
                return Ok(state.report_since(&before));
            }
            if let Some(err) = state.fatal_error() {
                return Err(err);
            }
            let daemon = state.daemon;
            match daemon {
                DaemonState::Halted => {
                    // Halted while we waited; finish on this thread.
                    drop(state);
                    shared.run_cycle(Driver::Caller)?;
                    return Ok(shared.state.lock().report_since(&before));
                }
                DaemonState::Stopped => return self.stopped_report(&state, &before),
                _ => shared.cycle_done.wait(&mut state),
            }
        }
    }

    fn stopped_report(&self, state: &BufferState, before: &FlushReport) -> FlushResult<FlushReport> {
        if state.active.is_empty() && !self.shared.abort.load(Ordering::Acquire) {
            Ok(state.report_since(before))
        } else {
            Err(FlushError::BufferClosed)
        }
    }

    /// Halts the daemon without draining.
    ///
    /// The buffer keeps accepting entries; flushing is then up to callers of
    /// [`DoubleBuffer::flush_current_buffer`] and [`DoubleBuffer::drain`].
    pub fn stop_daemon(&self) -> FlushResult<()> {
        {
            let mut state = self.shared.state.lock();
            match state.daemon {
                DaemonState::Stopped => return Err(FlushError::BufferClosed),
                DaemonState::Halted => return Ok(()),
                DaemonState::Failed => {}
                _ => state.daemon = DaemonState::Halted,
            }
            self.shared.flush_wanted.notify_all();
            // Drain waiters re-check the state and finish the cycle themselves.
            self.shared.cycle_done.notify_all();
        }

        self.join_worker();
        self.ensure_healthy()?;
        tracing::info!(
            pending = self.pending_count(),
            "Flush daemon halted; flushing is now caller driven"
        );
        Ok(())
    }

    /// Stops the buffer according to the configured [`ShutdownPolicy`].
    ///
    /// Further `add` calls fail with [`FlushError::BufferClosed`]. A run that
    /// is being committed always completes.
    pub fn shutdown(&self) -> FlushResult<()> {
        let shared = &self.shared;
        {
            let mut state = shared.state.lock();
            if state.daemon == DaemonState::Stopped {
                return Ok(());
            }
            state.closed = true;
            if self.shutdown_policy == ShutdownPolicy::Abrupt {
                shared.abort.store(true, Ordering::Release);
            }
            shared.flush_wanted.notify_all();
            shared.not_full.notify_all();
        }

        self.join_worker();

        let mut state = shared.state.lock();
        if let Some(err) = state.fatal_error() {
            return Err(err);
        }

        match self.shutdown_policy {
            ShutdownPolicy::Graceful => {
                while !state.active.is_empty() {
                    drop(state);
                    shared.run_cycle(Driver::Caller)?;
                    state = shared.state.lock();
                }
                tracing::info!(
                    runs = state.totals.runs,
                    entries = state.totals.entries,
                    last_committed = ?state.totals.last_committed,
                    "Double buffer shut down after draining"
                );
            }
            ShutdownPolicy::Abrupt => {
                let abandoned =
                    shared.abandoned.load(Ordering::Acquire) + state.active.len();
                tracing::warn!(
                    abandoned,
                    last_committed = ?state.totals.last_committed,
                    "Double buffer shut down abruptly; pending entries left unflushed"
                );
            }
        }

        state.daemon = DaemonState::Stopped;
        shared.not_full.notify_all();
        shared.cycle_done.notify_all();
        Ok(())
    }

    /// Creates a store checkpoint, optionally draining first so it covers
    /// every entry added before the call.
    pub fn checkpoint(&self, label: &str, flush_first: bool) -> FlushResult<Checkpoint> {
        if flush_first {
            self.drain()?;
        } else {
            self.ensure_healthy()?;
        }

        // Holding the cycle lock keeps commits out while the copy is taken.
        let _cycle = self.shared.cycle.lock();
        let checkpoint = self.shared.committer.store().create_checkpoint(label)?;
        self.shared
            .metrics
            .record_checkpoint(checkpoint.creation_time());

        tracing::info!(
            label,
            flush_first,
            created_through = ?checkpoint.created_through(),
            location = ?checkpoint.location(),
            "Checkpoint created on request"
        );
        Ok(checkpoint)
    }

    fn join_worker(&self) {
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Flush daemon panicked");
            }
        }
    }

    pub fn metrics(&self) -> &FlushMetrics {
        &self.shared.metrics
    }

    pub fn store(&self) -> &Arc<S> {
        self.shared.committer.store()
    }

    pub fn daemon_state(&self) -> DaemonState {
        self.shared.state.lock().daemon
    }

    /// Entries in the active buffer.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().active.len()
    }

    /// Highest position committed to the store.
    pub fn last_committed(&self) -> Option<TermIndex> {
        self.shared.metrics.last_committed()
    }

    pub fn fatal_error(&self) -> Option<FlushError> {
        self.shared.state.lock().fatal_error()
    }

    pub fn ensure_healthy(&self) -> FlushResult<()> {
        match self.fatal_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<S: MetadataStore + 'static> Drop for DoubleBuffer<S> {
    fn drop(&mut self) {
        let state = self.daemon_state();
        if matches!(state, DaemonState::Stopped | DaemonState::Failed) {
            self.join_worker();
            return;
        }
        if let Err(err) = self.shutdown() {
            tracing::warn!(?err, "Double buffer shutdown on drop failed");
        }
    }
}
