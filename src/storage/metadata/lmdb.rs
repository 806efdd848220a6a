use std::path::{Path, PathBuf};
use std::sync::Arc;

use heed::Env;

use crate::error::FlushResult;
use crate::storage::metadata::{BatchOp, Checkpoint, MetadataStore, WriteBatch};
use crate::types::{Table, TermIndex};

mod checkpoint;
mod env;

use env::{EnvHandles, StateDb, TableDb};

/// LMDB-backed metadata store.
///
/// Every [`WriteBatch`] is committed in a single LMDB write transaction, so
/// staged ops and the transaction info become visible together.
pub struct LmdbMetadataStore {
    env: Arc<Env>,
    path: PathBuf,
    checkpoints_dir: PathBuf,
    state_db: StateDb,
    table_dbs: [TableDb; 4],
}

impl LmdbMetadataStore {
    const TRANSACTION_INFO_KEY: &'static str = "#TRANSACTIONINFO";
    const DEFAULT_MAP_SIZE: usize = env::DEFAULT_MAP_SIZE;

    /// Opens (or creates) a store with the default 1GB map size.
    pub fn new(path: impl AsRef<Path>) -> FlushResult<Self> {
        Self::new_with_map_size(path, Self::DEFAULT_MAP_SIZE)
    }

    /// Opens (or creates) a store with a custom map size.
    ///
    /// Checkpoints are written under `<path>/checkpoints` unless overridden with
    /// [`LmdbMetadataStore::with_checkpoints_dir`].
    pub fn new_with_map_size(path: impl AsRef<Path>, map_size: usize) -> FlushResult<Self> {
        let handles = env::open_rw(path.as_ref(), map_size)?;
        Ok(Self::from_handles(handles))
    }

    pub fn with_checkpoints_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.checkpoints_dir = dir.as_ref().to_path_buf();
        self
    }

    fn from_handles(handles: EnvHandles) -> Self {
        let checkpoints_dir = handles.path.join("checkpoints");
        Self {
            env: Arc::new(handles.env),
            path: handles.path,
            checkpoints_dir,
            state_db: handles.state_db,
            table_dbs: handles.table_dbs,
        }
    }

    pub fn env(&self) -> Arc<Env> {
        Arc::clone(&self.env)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checkpoints_dir(&self) -> &Path {
        &self.checkpoints_dir
    }

    pub fn effective_map_size(&self) -> usize {
        self.env.info().map_size
    }

    /// Number of records in `table`.
    pub fn table_len(&self, table: Table) -> FlushResult<u64> {
        let txn = self.env.read_txn()?;
        Ok(self.table_db(table).len(&txn)?)
    }

    fn table_db(&self, table: Table) -> &TableDb {
        match table {
            Table::Volumes => &self.table_dbs[0],
            Table::Buckets => &self.table_dbs[1],
            Table::Keys => &self.table_dbs[2],
            Table::Snapshots => &self.table_dbs[3],
        }
    }
}

impl Clone for LmdbMetadataStore {
    fn clone(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
            path: self.path.clone(),
            checkpoints_dir: self.checkpoints_dir.clone(),
            state_db: self.state_db,
            table_dbs: self.table_dbs,
        }
    }
}

impl MetadataStore for LmdbMetadataStore {
    fn commit_batch(&self, batch: WriteBatch) -> FlushResult<()> {
        let mut txn = self.env.write_txn()?;
        for op in batch.ops() {
            match op {
                BatchOp::Put { table, key, value } => {
                    self.table_db(*table).put(&mut txn, key, value)?;
                }
                BatchOp::Delete { table, key } => {
                    self.table_db(*table).delete(&mut txn, key)?;
                }
            }
        }
        if let Some(info) = batch.transaction_info() {
            self.state_db
                .put(&mut txn, Self::TRANSACTION_INFO_KEY, &info)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn create_checkpoint(&self, label: &str) -> FlushResult<Checkpoint> {
        let created_through = self.last_committed()?;
        checkpoint::create(
            self.env.as_ref(),
            &self.checkpoints_dir,
            label,
            created_through,
        )
    }

    fn last_committed(&self) -> FlushResult<Option<TermIndex>> {
        let txn = self.env.read_txn()?;
        Ok(self.state_db.get(&txn, Self::TRANSACTION_INFO_KEY)?)
    }

    fn get(&self, table: Table, key: &[u8]) -> FlushResult<Option<Vec<u8>>> {
        let txn = self.env.read_txn()?;
        Ok(self.table_db(table).get(&txn, key)?.map(<[u8]>::to_vec))
    }
}
