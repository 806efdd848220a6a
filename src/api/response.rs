//! Operation responses produced by the state machine and replayed into the store.
//!
//! Each response kind maps to one apply function through [`APPLY_TABLE`]; adding
//! a new kind means adding a variant, a discriminator and a table slot.

use serde::{Deserialize, Serialize};

use crate::error::{FlushError, FlushResult};
use crate::metadata::WriteBatch;

use super::types::Table;

/// Discriminator of an [`OperationResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseKind {
    Plain = 0,
    SnapshotCreate = 1,
}

impl ResponseKind {
    pub const COUNT: usize = 2;

    /// Apply logic registered for this kind.
    #[inline]
    pub fn apply_fn(self) -> ApplyFn {
        APPLY_TABLE[self as usize]
    }
}

/// Stages the writes of a response into a pending batch.
pub type ApplyFn = fn(&OperationResponse, &mut WriteBatch) -> FlushResult<()>;

/// Apply functions indexed by `ResponseKind as usize`.
pub static APPLY_TABLE: [ApplyFn; ResponseKind::COUNT] = [apply_plain, apply_snapshot_create];

/// A single write carried by a plain response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagedWrite {
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

impl StagedWrite {
    pub fn put(table: Table, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        StagedWrite::Put {
            table,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(table: Table, key: impl Into<Vec<u8>>) -> Self {
        StagedWrite::Delete {
            table,
            key: key.into(),
        }
    }

    pub fn table(&self) -> Table {
        match self {
            StagedWrite::Put { table, .. } | StagedWrite::Delete { table, .. } => *table,
        }
    }
}

/// Metadata required to materialize a store checkpoint for a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub snapshot_id: u64,
    pub volume: String,
    pub bucket: String,
    pub name: String,
}

impl SnapshotInfo {
    pub fn new(
        snapshot_id: u64,
        volume: impl Into<String>,
        bucket: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            snapshot_id,
            volume: volume.into(),
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    /// Key of the snapshot record in [`Table::Snapshots`].
    pub fn table_key(&self) -> Vec<u8> {
        format!("/{}/{}/{}", self.volume, self.bucket, self.name).into_bytes()
    }

    /// Directory name of the checkpoint backing this snapshot.
    ///
    /// Characters outside `[A-Za-z0-9._-]` in the snapshot name become `_`, so
    /// the label is always one path component.
    pub fn checkpoint_label(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("snapshot-{:016x}-{}", self.snapshot_id, name)
    }
}

/// Result of applying one client request, queued for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResponse {
    /// Ordinary metadata mutation; may share a batch with other plain responses.
    Plain {
        trace_id: String,
        writes: Vec<StagedWrite>,
    },
    /// Snapshot creation; always committed alone and followed by a checkpoint.
    SnapshotCreate {
        trace_id: String,
        snapshot: SnapshotInfo,
    },
}

impl OperationResponse {
    pub fn plain(trace_id: impl Into<String>, writes: Vec<StagedWrite>) -> Self {
        OperationResponse::Plain {
            trace_id: trace_id.into(),
            writes,
        }
    }

    pub fn snapshot_create(trace_id: impl Into<String>, snapshot: SnapshotInfo) -> Self {
        OperationResponse::SnapshotCreate {
            trace_id: trace_id.into(),
            snapshot,
        }
    }

    #[inline]
    pub fn kind(&self) -> ResponseKind {
        match self {
            OperationResponse::Plain { .. } => ResponseKind::Plain,
            OperationResponse::SnapshotCreate { .. } => ResponseKind::SnapshotCreate,
        }
    }

    pub fn trace_id(&self) -> &str {
        match self {
            OperationResponse::Plain { trace_id, .. }
            | OperationResponse::SnapshotCreate { trace_id, .. } => trace_id,
        }
    }

    pub fn snapshot(&self) -> Option<&SnapshotInfo> {
        match self {
            OperationResponse::SnapshotCreate { snapshot, .. } => Some(snapshot),
            OperationResponse::Plain { .. } => None,
        }
    }

    /// Stages this response's writes into `batch`.
    pub fn apply_to(&self, batch: &mut WriteBatch) -> FlushResult<()> {
        (self.kind().apply_fn())(self, batch)
    }
}

fn apply_plain(response: &OperationResponse, batch: &mut WriteBatch) -> FlushResult<()> {
    let OperationResponse::Plain { writes, .. } = response else {
        return Err(FlushError::UnexpectedResponseKind {
            expected: ResponseKind::Plain,
            found: response.kind(),
        });
    };

    for write in writes {
        match write {
            StagedWrite::Put { table, key, value } => {
                batch.put(*table, key.clone(), value.clone())
            }
            StagedWrite::Delete { table, key } => batch.delete(*table, key.clone()),
        }
    }
    Ok(())
}

fn apply_snapshot_create(response: &OperationResponse, batch: &mut WriteBatch) -> FlushResult<()> {
    let OperationResponse::SnapshotCreate { snapshot, .. } = response else {
        return Err(FlushError::UnexpectedResponseKind {
            expected: ResponseKind::SnapshotCreate,
            found: response.kind(),
        });
    };

    let record = bincode::serialize(snapshot)?;
    batch.put(Table::Snapshots, snapshot.table_key(), record);
    Ok(())
}
