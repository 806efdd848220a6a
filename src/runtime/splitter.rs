//! Partitions a drained buffer into commit runs.
//!
//! Snapshot-creating entries always end up alone in their run so that the
//! checkpoint taken after their commit reflects exactly the writes before them.

use crate::types::{Entry, TermIndex};

/// Kind of a commit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// One or more plain entries.
    Plain,
    /// Exactly one snapshot-creating entry.
    SnapshotCreate,
}

/// A maximal contiguous slice of a drained buffer committed in one batch.
#[derive(Debug, Clone, Copy)]
pub struct Run<'a> {
    kind: RunKind,
    entries: &'a [Entry],
}

impl<'a> Run<'a> {
    pub fn kind(&self) -> RunKind {
        self.kind
    }

    pub fn entries(&self) -> &'a [Entry] {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry with the highest log index in this run.
    pub fn last_term_index(&self) -> Option<TermIndex> {
        self.entries
            .iter()
            .max_by_key(|entry| entry.log_index)
            .map(Entry::term_index)
    }
}

/// Splits `entries` into runs, preserving order.
pub fn split_runs(entries: &[Entry]) -> Vec<Run<'_>> {
    let mut runs = Vec::new();
    let mut plain_start = 0;

    for (position, entry) in entries.iter().enumerate() {
        if !entry.is_snapshot_create() {
            continue;
        }

        if plain_start < position {
            runs.push(Run {
                kind: RunKind::Plain,
                entries: &entries[plain_start..position],
            });
        }
        runs.push(Run {
            kind: RunKind::SnapshotCreate,
            entries: &entries[position..=position],
        });
        plain_start = position + 1;
    }

    if plain_start < entries.len() {
        runs.push(Run {
            kind: RunKind::Plain,
            entries: &entries[plain_start..],
        });
    }

    runs
}
