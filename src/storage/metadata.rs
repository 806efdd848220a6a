use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::FlushResult;
use crate::types::{Table, TermIndex};

pub mod lmdb;

pub use lmdb::LmdbMetadataStore;

/// One staged mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put {
        table: Table,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        table: Table,
        key: Vec<u8>,
    },
}

/// Ordered set of writes committed atomically by a [`MetadataStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
    transaction_info: Option<TermIndex>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { table, key, value });
    }

    pub fn delete(&mut self, table: Table, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { table, key });
    }

    /// Records the last log entry covered by this batch.
    pub fn set_transaction_info(&mut self, term_index: TermIndex) {
        self.transaction_info = Some(term_index);
    }

    pub fn transaction_info(&self) -> Option<TermIndex> {
        self.transaction_info
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.transaction_info.is_none()
    }
}

/// A point-in-time copy of the store on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    location: PathBuf,
    created_through: Option<TermIndex>,
    creation_time: Duration,
}

impl Checkpoint {
    pub fn new(
        location: PathBuf,
        created_through: Option<TermIndex>,
        creation_time: Duration,
    ) -> Self {
        Self {
            location,
            created_through,
            creation_time,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Transaction info of the store at the moment the checkpoint was taken.
    pub fn created_through(&self) -> Option<TermIndex> {
        self.created_through
    }

    pub fn creation_time(&self) -> Duration {
        self.creation_time
    }

    /// Removes the checkpoint directory.
    pub fn cleanup(self) -> FlushResult<()> {
        match std::fs::remove_dir_all(&self.location) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Persistent store written by the flush pipeline.
///
/// Implementations must commit a [`WriteBatch`] atomically: either every
/// staged op and its transaction info become visible, or none do.
pub trait MetadataStore: Send + Sync {
    fn begin_batch(&self) -> WriteBatch {
        WriteBatch::new()
    }

    fn commit_batch(&self, batch: WriteBatch) -> FlushResult<()>;

    /// Materializes a checkpoint reflecting every batch committed so far.
    fn create_checkpoint(&self, label: &str) -> FlushResult<Checkpoint>;

    /// Transaction info recorded by the last committed batch.
    fn last_committed(&self) -> FlushResult<Option<TermIndex>>;

    fn get(&self, table: Table, key: &[u8]) -> FlushResult<Option<Vec<u8>>>;
}
