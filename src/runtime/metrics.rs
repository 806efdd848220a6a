//! Metrics and observability for the flush pipeline.
//!
//! Each [`crate::DoubleBuffer`] owns its own [`FlushMetrics`]; handles are cheap
//! clones of the same counters. Counters are written only by the thread running
//! a flush cycle and can be read concurrently without blocking it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::types::TermIndex;

pub mod health;
pub mod snapshot;

pub use health::{HealthState, HealthStatus};
pub use snapshot::MetricsSnapshot;

/// Flush metrics collected at runtime.
#[derive(Debug, Clone)]
pub struct FlushMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    flush_iterations: AtomicU64,
    flushed_transactions: AtomicU64,
    max_transactions_in_one_iteration: AtomicU64,
    total_flush_time_us: AtomicU64,
    pending_transactions: AtomicUsize,
    commit_retries: AtomicU64,
    failed_commits: AtomicU64,
    checkpoints_created: AtomicU64,
    last_checkpoint_time_us: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_suppressed: AtomicU64,
    last_committed: RwLock<Option<TermIndex>>,
    recent_flushes: RwLock<RecentFlushes>,
}

#[derive(Debug, Default)]
struct RecentFlushes {
    last_100_flush_times_us: VecDeque<u64>,
    last_flush_timestamp: Option<Instant>,
}

impl FlushMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                flush_iterations: AtomicU64::new(0),
                flushed_transactions: AtomicU64::new(0),
                max_transactions_in_one_iteration: AtomicU64::new(0),
                total_flush_time_us: AtomicU64::new(0),
                pending_transactions: AtomicUsize::new(0),
                commit_retries: AtomicU64::new(0),
                failed_commits: AtomicU64::new(0),
                checkpoints_created: AtomicU64::new(0),
                last_checkpoint_time_us: AtomicU64::new(0),
                notifications_sent: AtomicU64::new(0),
                notifications_suppressed: AtomicU64::new(0),
                last_committed: RwLock::new(None),
                recent_flushes: RwLock::new(RecentFlushes::default()),
            }),
        }
    }

    /// Records one committed run (one flush iteration).
    pub fn record_flush(&self, transactions: usize, committed: TermIndex, duration: Duration) {
        let transactions = transactions as u64;
        self.inner.flush_iterations.fetch_add(1, Ordering::Relaxed);
        self.inner
            .flushed_transactions
            .fetch_add(transactions, Ordering::Relaxed);
        self.inner
            .max_transactions_in_one_iteration
            .fetch_max(transactions, Ordering::Relaxed);

        let duration_us = duration.as_micros() as u64;
        self.inner
            .total_flush_time_us
            .fetch_add(duration_us, Ordering::Relaxed);

        self.update_last_committed(committed);

        let mut recent = self.inner.recent_flushes.write();
        recent.last_flush_timestamp = Some(Instant::now());
        if recent.last_100_flush_times_us.len() >= 100 {
            recent.last_100_flush_times_us.pop_front();
        }
        recent.last_100_flush_times_us.push_back(duration_us);
    }

    /// Raises the highest committed position; never moves it backwards.
    pub fn update_last_committed(&self, committed: TermIndex) {
        let mut last = self.inner.last_committed.write();
        if last.map_or(true, |current| committed > current) {
            *last = Some(committed);
        }
    }

    pub fn update_pending(&self, pending: usize) {
        self.inner
            .pending_transactions
            .store(pending, Ordering::Relaxed);
    }

    pub fn record_commit_retry(&self) {
        self.inner.commit_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.inner.failed_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint(&self, creation_time: Duration) {
        self.inner
            .checkpoints_created
            .fetch_add(1, Ordering::Relaxed);
        self.inner
            .last_checkpoint_time_us
            .store(creation_time.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_notification(&self) {
        self.inner
            .notifications_sent
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed_notification(&self) {
        self.inner
            .notifications_suppressed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush_iterations(&self) -> u64 {
        self.inner.flush_iterations.load(Ordering::Relaxed)
    }

    pub fn flushed_transactions(&self) -> u64 {
        self.inner.flushed_transactions.load(Ordering::Relaxed)
    }

    pub fn last_committed(&self) -> Option<TermIndex> {
        *self.inner.last_committed.read()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let flush_iterations = self.inner.flush_iterations.load(Ordering::Relaxed);
        let flushed_transactions = self.inner.flushed_transactions.load(Ordering::Relaxed);
        let max_transactions_in_one_iteration = self
            .inner
            .max_transactions_in_one_iteration
            .load(Ordering::Relaxed);
        let total_flush_time_us = self.inner.total_flush_time_us.load(Ordering::Relaxed);

        let (avg_transactions_in_one_iteration, avg_flush_time_us) = if flush_iterations > 0 {
            (
                flushed_transactions as f64 / flush_iterations as f64,
                total_flush_time_us / flush_iterations,
            )
        } else {
            (0.0, 0)
        };

        let recent = self.inner.recent_flushes.read();
        let flush_p50 = snapshot::calculate_percentile(&recent.last_100_flush_times_us, 50);
        let flush_p95 = snapshot::calculate_percentile(&recent.last_100_flush_times_us, 95);
        let flush_p99 = snapshot::calculate_percentile(&recent.last_100_flush_times_us, 99);
        let last_flush_secs = recent.last_flush_timestamp.map(|t| t.elapsed().as_secs());
        drop(recent);

        MetricsSnapshot {
            flush_iterations,
            flushed_transactions,
            max_transactions_in_one_iteration,
            avg_transactions_in_one_iteration,
            avg_flush_time_us,
            flush_p50_us: flush_p50,
            flush_p95_us: flush_p95,
            flush_p99_us: flush_p99,
            last_committed: self.last_committed(),
            pending_transactions: self.inner.pending_transactions.load(Ordering::Relaxed),
            commit_retries: self.inner.commit_retries.load(Ordering::Relaxed),
            failed_commits: self.inner.failed_commits.load(Ordering::Relaxed),
            checkpoints_created: self.inner.checkpoints_created.load(Ordering::Relaxed),
            last_checkpoint_time_us: self.inner.last_checkpoint_time_us.load(Ordering::Relaxed),
            notifications_sent: self.inner.notifications_sent.load(Ordering::Relaxed),
            notifications_suppressed: self
                .inner
                .notifications_suppressed
                .load(Ordering::Relaxed),
            last_flush_secs,
        }
    }

    pub fn health(&self) -> HealthStatus {
        let snapshot = self.snapshot();
        health::derive_health(&snapshot)
    }
}

impl Default for FlushMetrics {
    fn default() -> Self {
        Self::new()
    }
}
