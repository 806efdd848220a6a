use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FlushError, FlushResult};
use crate::types::{LogIndex, Term};

/// Callback through which the consensus layer learns the durable watermark.
pub type SnapshotCallback = Arc<dyn Fn(LogIndex) + Send + Sync>;

/// Resolves the term a log index was agreed under.
pub type IndexToTerm = Arc<dyn Fn(LogIndex) -> Term + Send + Sync>;

/// What `shutdown` does with entries that have not been flushed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShutdownPolicy {
    /// Drain every pending entry exactly once before stopping.
    #[default]
    Graceful,
    /// Stop after the run in flight; pending entries stay unflushed.
    Abrupt,
}

/// Reaction to a commit failure that could not be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FatalErrorPolicy {
    /// Latch the error and refuse further work.
    #[default]
    Degrade,
    /// Latch the error, then exit the process with status 1.
    Terminate,
}

/// Configuration for a [`crate::DoubleBuffer`].
#[derive(Clone)]
pub struct DoubleBufferConfig {
    /// Entries the active buffer may hold before `add` blocks.
    pub max_unflushed_transaction_count: usize,
    /// Active buffer size that wakes the flush daemon.
    pub flush_threshold: usize,
    /// Longest time a pending entry waits below the threshold.
    pub max_flush_delay: Duration,
    /// Whether watermark notifications are sent to the consensus layer.
    pub ratis_enabled: bool,
    /// Watermark callback; required when `ratis_enabled` is set.
    pub snapshot_callback: Option<SnapshotCallback>,
    /// Term resolver; required when `ratis_enabled` is set.
    pub index_to_term: Option<IndexToTerm>,
    pub shutdown_policy: ShutdownPolicy,
    pub fatal_error_policy: FatalErrorPolicy,
    /// Extra attempts for transient commit failures.
    pub max_commit_retries: usize,
    pub commit_retry_backoff: Duration,
    /// Start the background daemon on construction.
    pub start_daemon: bool,
}

impl DoubleBufferConfig {
    pub const DEFAULT_MAX_UNFLUSHED_TRANSACTIONS: usize = 10_000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_unflushed_transaction_count(mut self, count: usize) -> Self {
        self.max_unflushed_transaction_count = count;
        self
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn with_max_flush_delay(mut self, delay: Duration) -> Self {
        self.max_flush_delay = delay;
        self
    }

    /// Enables watermark notification with the given hooks.
    pub fn with_ratis(
        mut self,
        snapshot_callback: impl Fn(LogIndex) + Send + Sync + 'static,
        index_to_term: impl Fn(LogIndex) -> Term + Send + Sync + 'static,
    ) -> Self {
        self.ratis_enabled = true;
        self.snapshot_callback = Some(Arc::new(snapshot_callback));
        self.index_to_term = Some(Arc::new(index_to_term));
        self
    }

    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    pub fn with_fatal_error_policy(mut self, policy: FatalErrorPolicy) -> Self {
        self.fatal_error_policy = policy;
        self
    }

    pub fn with_commit_retries(mut self, retries: usize, backoff: Duration) -> Self {
        self.max_commit_retries = retries;
        self.commit_retry_backoff = backoff;
        self
    }

    /// Builds the buffer with its daemon halted, as after `stop_daemon`.
    pub fn without_daemon(mut self) -> Self {
        self.start_daemon = false;
        self
    }

    pub fn validate(&self) -> FlushResult<()> {
        if self.max_unflushed_transaction_count < 1 {
            return Err(FlushError::InvalidConfiguration {
                field: "max_unflushed_transaction_count",
                min: 1,
                value: self.max_unflushed_transaction_count,
            });
        }
        if self.flush_threshold < 1 {
            return Err(FlushError::InvalidConfiguration {
                field: "flush_threshold",
                min: 1,
                value: self.flush_threshold,
            });
        }
        // A full buffer must always be enough to wake the daemon.
        if self.flush_threshold > self.max_unflushed_transaction_count {
            return Err(FlushError::InvalidConfiguration {
                field: "max_unflushed_transaction_count",
                min: self.flush_threshold,
                value: self.max_unflushed_transaction_count,
            });
        }
        if self.ratis_enabled {
            if self.snapshot_callback.is_none() {
                return Err(FlushError::MissingHook {
                    reason: "ratis_enabled requires a snapshot callback",
                });
            }
            if self.index_to_term.is_none() {
                return Err(FlushError::MissingHook {
                    reason: "ratis_enabled requires an index-to-term resolver",
                });
            }
        }
        Ok(())
    }
}

impl Default for DoubleBufferConfig {
    fn default() -> Self {
        Self {
            max_unflushed_transaction_count: Self::DEFAULT_MAX_UNFLUSHED_TRANSACTIONS,
            flush_threshold: 1,
            max_flush_delay: Duration::from_millis(100),
            ratis_enabled: false,
            snapshot_callback: None,
            index_to_term: None,
            shutdown_policy: ShutdownPolicy::default(),
            fatal_error_policy: FatalErrorPolicy::default(),
            max_commit_retries: 3,
            commit_retry_backoff: Duration::from_millis(50),
            start_daemon: true,
        }
    }
}

impl fmt::Debug for DoubleBufferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleBufferConfig")
            .field(
                "max_unflushed_transaction_count",
                &self.max_unflushed_transaction_count,
            )
            .field("flush_threshold", &self.flush_threshold)
            .field("max_flush_delay", &self.max_flush_delay)
            .field("ratis_enabled", &self.ratis_enabled)
            .field("snapshot_callback", &self.snapshot_callback.is_some())
            .field("index_to_term", &self.index_to_term.is_some())
            .field("shutdown_policy", &self.shutdown_policy)
            .field("fatal_error_policy", &self.fatal_error_policy)
            .field("max_commit_retries", &self.max_commit_retries)
            .field("commit_retry_backoff", &self.commit_retry_backoff)
            .field("start_daemon", &self.start_daemon)
            .finish()
    }
}
