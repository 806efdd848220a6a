use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{FlushError, FlushResult};
use crate::metadata::{Checkpoint, MetadataStore};
use crate::metrics::FlushMetrics;
use crate::types::TermIndex;

use super::splitter::{Run, RunKind};

/// Result of committing one run.
#[derive(Debug)]
pub struct CommitOutcome {
    pub committed: TermIndex,
    pub entries: usize,
    pub checkpoint: Option<Checkpoint>,
}

/// Applies runs to the metadata store, one write batch per run.
pub struct StoreCommitter<S: MetadataStore> {
    store: Arc<S>,
    metrics: FlushMetrics,
    max_retries: usize,
    retry_backoff: Duration,
}

impl<S: MetadataStore> StoreCommitter<S> {
    pub fn new(
        store: Arc<S>,
        metrics: FlushMetrics,
        max_retries: usize,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            metrics,
            max_retries,
            retry_backoff,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Commits `run` atomically and, for snapshot runs, takes the checkpoint
    /// before returning so the next run cannot leak into it.
    pub fn commit_run(&self, run: &Run<'_>) -> FlushResult<CommitOutcome> {
        let started_at = Instant::now();
        let committed = run.last_term_index().ok_or(FlushError::EmptyRun)?;

        self.with_retries("commit batch", committed, || {
            let mut batch = self.store.begin_batch();
            for entry in run.entries() {
                entry.response.apply_to(&mut batch)?;
            }
            batch.set_transaction_info(committed);
            self.store.commit_batch(batch)
        })?;

        let checkpoint = match run.kind() {
            RunKind::Plain => None,
            RunKind::SnapshotCreate => {
                let snapshot = run.entries()[0]
                    .response
                    .snapshot()
                    .ok_or(FlushError::EmptyRun)?;
                let label = snapshot.checkpoint_label();
                let checkpoint = self.with_retries("create checkpoint", committed, || {
                    self.store.create_checkpoint(&label)
                })?;
                self.metrics.record_checkpoint(checkpoint.creation_time());
                tracing::debug!(
                    trace_id = run.entries()[0].response.trace_id(),
                    snapshot = %snapshot.name,
                    location = ?checkpoint.location(),
                    "Snapshot checkpoint materialized"
                );
                Some(checkpoint)
            }
        };

        self.metrics
            .record_flush(run.len(), committed, started_at.elapsed());

        Ok(CommitOutcome {
            committed,
            entries: run.len(),
            checkpoint,
        })
    }

    fn with_retries<T>(
        &self,
        action: &'static str,
        at: TermIndex,
        mut op: impl FnMut() -> FlushResult<T>,
    ) -> FlushResult<T> {
        let mut attempt = 0usize;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    self.metrics.record_commit_retry();
                    tracing::warn!(
                        action,
                        %at,
                        attempt,
                        max_retries = self.max_retries,
                        ?err,
                        "Transient store failure; retrying"
                    );
                    std::thread::sleep(self.retry_backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
