//! Reports the durable log index back to the consensus layer.

use crate::config::{IndexToTerm, SnapshotCallback};
use crate::metrics::FlushMetrics;
use crate::types::{LogIndex, TermIndex};

/// Outcome of a notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Sent(LogIndex),
    /// The term resolver no longer agrees with the committed entry's term.
    TermChanged { index: LogIndex, current_term: u64 },
    /// The index does not advance past the last reported watermark.
    Stale { index: LogIndex, last: LogIndex },
    Disabled,
}

/// Invokes the snapshot callback after each committed run.
///
/// Notifications are bounded by term and strictly increasing in index.
pub struct WatermarkNotifier {
    hooks: Option<(SnapshotCallback, IndexToTerm)>,
    last_notified: Option<LogIndex>,
    metrics: FlushMetrics,
}

impl WatermarkNotifier {
    pub fn new(
        ratis_enabled: bool,
        snapshot_callback: Option<SnapshotCallback>,
        index_to_term: Option<IndexToTerm>,
        metrics: FlushMetrics,
    ) -> Self {
        let hooks = match (ratis_enabled, snapshot_callback, index_to_term) {
            (true, Some(callback), Some(resolver)) => Some((callback, resolver)),
            _ => None,
        };
        Self {
            hooks,
            last_notified: None,
            metrics,
        }
    }

    /// Seeds the watermark with the position already persisted by the store.
    pub fn resume_from(&mut self, committed: Option<TermIndex>) {
        self.last_notified = committed.map(|ti| ti.index);
    }

    pub fn last_notified(&self) -> Option<LogIndex> {
        self.last_notified
    }

    pub fn notify(&mut self, committed: TermIndex) -> Notification {
        let Some((callback, resolver)) = &self.hooks else {
            return Notification::Disabled;
        };

        if let Some(last) = self.last_notified {
            if committed.index <= last {
                tracing::debug!(
                    index = committed.index,
                    last,
                    "Skipping watermark notification that does not advance"
                );
                self.metrics.record_suppressed_notification();
                return Notification::Stale {
                    index: committed.index,
                    last,
                };
            }
        }

        let current_term = resolver(committed.index);
        if current_term != committed.term {
            tracing::warn!(
                index = committed.index,
                entry_term = committed.term,
                current_term,
                "Term changed since entry was buffered; watermark not reported"
            );
            self.metrics.record_suppressed_notification();
            return Notification::TermChanged {
                index: committed.index,
                current_term,
            };
        }

        callback(committed.index);
        self.last_notified = Some(committed.index);
        self.metrics.record_notification();
        Notification::Sent(committed.index)
    }
}
