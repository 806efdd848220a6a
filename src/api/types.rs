use std::fmt;

use serde::{Deserialize, Serialize};

pub use super::response::{
    ApplyFn, OperationResponse, ResponseKind, SnapshotInfo, StagedWrite, APPLY_TABLE,
};

/// Position of an entry in the replicated log.
///
/// Indices handed to the buffer must be monotonically increasing.
pub type LogIndex = u64;

/// Leadership term an entry was agreed under.
pub type Term = u64;

/// A `(term, index)` pair identifying one agreed log entry.
///
/// Ordering compares the index first; the term only breaks ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermIndex {
    pub term: Term,
    pub index: LogIndex,
}

impl TermIndex {
    pub const fn new(term: Term, index: LogIndex) -> Self {
        Self { term, index }
    }
}

impl PartialOrd for TermIndex {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TermIndex {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index
            .cmp(&other.index)
            .then_with(|| self.term.cmp(&other.term))
    }
}

impl fmt::Display for TermIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(t:{}, i:{})", self.term, self.index)
    }
}

/// Logical keyspaces of the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    Volumes,
    Buckets,
    Keys,
    Snapshots,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::Volumes, Table::Buckets, Table::Keys, Table::Snapshots];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Volumes => "volumes",
            Table::Buckets => "buckets",
            Table::Keys => "keys",
            Table::Snapshots => "snapshots",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One accepted write waiting to be flushed.
#[derive(Debug, Clone)]
pub struct Entry {
    pub log_index: LogIndex,
    pub term: Term,
    pub response: OperationResponse,
}

impl Entry {
    pub fn new(log_index: LogIndex, term: Term, response: OperationResponse) -> Self {
        Self {
            log_index,
            term,
            response,
        }
    }

    #[inline]
    pub fn term_index(&self) -> TermIndex {
        TermIndex::new(self.term, self.log_index)
    }

    #[inline]
    pub fn is_snapshot_create(&self) -> bool {
        self.response.kind() == ResponseKind::SnapshotCreate
    }
}

/// Outcome of one forced flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of runs committed, i.e. flush iterations performed.
    pub runs: usize,
    /// Number of entries committed across all runs.
    pub entries: usize,
    /// Highest entry committed by this cycle, if any.
    pub last_committed: Option<TermIndex>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.runs == 0
    }
}
