#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use doublebuffer::error::{FlushError, FlushResult};
use doublebuffer::metadata::{BatchOp, Checkpoint, MetadataStore, WriteBatch};
use doublebuffer::types::{Entry, OperationResponse, SnapshotInfo, StagedWrite, Table, TermIndex};
use parking_lot::{Condvar, Mutex};
use tempfile::{tempdir_in, TempDir};

static INIT_TRACING: Once = Once::new();
static INIT_TESTDATA_ROOT: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn workspace_tmp() -> PathBuf {
    let path = env::current_dir()
        .unwrap()
        .join("target/testdata/doublebuffer");
    INIT_TESTDATA_ROOT.call_once(|| {
        if env::var_os("DOUBLEBUFFER_KEEP_TESTDATA").is_none() {
            let _ = std::fs::remove_dir_all(&path);
        }
    });
    path
}

pub fn tempdir() -> TempDir {
    let workspace_tmp = workspace_tmp();
    std::fs::create_dir_all(&workspace_tmp).unwrap();
    tempdir_in(&workspace_tmp).unwrap()
}

/// Key written by [`plain_entry`]; decodes back with [`index_of_key`].
pub fn key_for(index: u64) -> Vec<u8> {
    index.to_be_bytes().to_vec()
}

pub fn index_of_key(key: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(key);
    u64::from_be_bytes(bytes)
}

pub fn plain_entry(index: u64, term: u64) -> Entry {
    Entry::new(
        index,
        term,
        OperationResponse::plain(
            format!("key-create-{index}"),
            vec![StagedWrite::put(
                Table::Keys,
                key_for(index),
                format!("value-{index}"),
            )],
        ),
    )
}

pub fn snapshot_entry(index: u64, term: u64) -> Entry {
    Entry::new(
        index,
        term,
        OperationResponse::snapshot_create(
            format!("snapshot-create-{index}"),
            SnapshotInfo::new(index, "vol", "bucket", format!("snap{index}")),
        ),
    )
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        if start.elapsed() > timeout {
            panic!("condition not reached within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(5));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub transaction_info: Option<TermIndex>,
    pub keys: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub label: String,
    pub created_through: Option<TermIndex>,
    pub key_count: usize,
}

/// In-memory store recording every committed batch and checkpoint.
#[derive(Default)]
pub struct MemoryMetadataStore {
    tables: Mutex<HashMap<(Table, Vec<u8>), Vec<u8>>>,
    transaction_info: Mutex<Option<TermIndex>>,
    commits: Mutex<Vec<CommitRecord>>,
    checkpoints: Mutex<Vec<CheckpointRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> Vec<CommitRecord> {
        self.commits.lock().clone()
    }

    pub fn checkpoints(&self) -> Vec<CheckpointRecord> {
        self.checkpoints.lock().clone()
    }

    /// Keys of `Table::Keys` in the order they were committed.
    pub fn committed_key_indices(&self) -> Vec<u64> {
        self.commits
            .lock()
            .iter()
            .flat_map(|commit| commit.keys.iter())
            .filter(|key| key.len() == 8)
            .map(|key| index_of_key(key))
            .collect()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn commit_batch(&self, batch: WriteBatch) -> FlushResult<()> {
        let mut tables = self.tables.lock();
        let mut keys = Vec::new();
        for op in batch.ops() {
            match op {
                BatchOp::Put { table, key, value } => {
                    if *table == Table::Keys {
                        keys.push(key.clone());
                    }
                    tables.insert((*table, key.clone()), value.clone());
                }
                BatchOp::Delete { table, key } => {
                    tables.remove(&(*table, key.clone()));
                }
            }
        }
        if let Some(info) = batch.transaction_info() {
            *self.transaction_info.lock() = Some(info);
        }
        self.commits.lock().push(CommitRecord {
            transaction_info: batch.transaction_info(),
            keys,
        });
        Ok(())
    }

    fn create_checkpoint(&self, label: &str) -> FlushResult<Checkpoint> {
        let created_through = *self.transaction_info.lock();
        let key_count = self.tables.lock().len();
        self.checkpoints.lock().push(CheckpointRecord {
            label: label.to_string(),
            created_through,
            key_count,
        });
        Ok(Checkpoint::new(
            PathBuf::from(label),
            created_through,
            Duration::ZERO,
        ))
    }

    fn last_committed(&self) -> FlushResult<Option<TermIndex>> {
        Ok(*self.transaction_info.lock())
    }

    fn get(&self, table: Table, key: &[u8]) -> FlushResult<Option<Vec<u8>>> {
        Ok(self
            .tables
            .lock()
            .get(&(table, key.to_vec()))
            .cloned())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum InjectedFailure {
    /// Every commit at or past the index fails permanently.
    Fatal,
    /// The first `n` attempts at the index fail with `Interrupted`.
    Transient(usize),
}

/// Fails commits whose transaction info reaches `fail_at`.
pub struct FailingMetadataStore {
    inner: MemoryMetadataStore,
    fail_at: u64,
    failure: InjectedFailure,
    attempts: AtomicUsize,
}

impl FailingMetadataStore {
    pub fn new(fail_at: u64, failure: InjectedFailure) -> Self {
        Self {
            inner: MemoryMetadataStore::new(),
            fail_at,
            failure,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryMetadataStore {
        &self.inner
    }

    /// Commit attempts that reached the failure point.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MetadataStore for FailingMetadataStore {
    fn commit_batch(&self, batch: WriteBatch) -> FlushResult<()> {
        let reached = batch
            .transaction_info()
            .is_some_and(|info| info.index >= self.fail_at);
        if reached {
            match self.failure {
                InjectedFailure::Fatal => {
                    self.attempts.fetch_add(1, Ordering::SeqCst);
                    return Err(FlushError::Io(Error::other("injected disk failure")));
                }
                InjectedFailure::Transient(limit) => {
                    if self.attempts.fetch_add(1, Ordering::SeqCst) < limit {
                        return Err(FlushError::Io(Error::from(ErrorKind::Interrupted)));
                    }
                }
            }
        }
        self.inner.commit_batch(batch)
    }

    fn create_checkpoint(&self, label: &str) -> FlushResult<Checkpoint> {
        self.inner.create_checkpoint(label)
    }

    fn last_committed(&self) -> FlushResult<Option<TermIndex>> {
        self.inner.last_committed()
    }

    fn get(&self, table: Table, key: &[u8]) -> FlushResult<Option<Vec<u8>>> {
        self.inner.get(table, key)
    }
}

/// Holds every commit until [`GatedMetadataStore::open`] is called.
#[derive(Default)]
pub struct GatedMetadataStore {
    inner: MemoryMetadataStore,
    open: Mutex<bool>,
    opened: Condvar,
    entered: AtomicUsize,
}

impl GatedMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryMetadataStore {
        &self.inner
    }

    /// Commits that have reached the gate so far.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

impl MetadataStore for GatedMetadataStore {
    fn commit_batch(&self, batch: WriteBatch) -> FlushResult<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
        drop(open);
        self.inner.commit_batch(batch)
    }

    fn create_checkpoint(&self, label: &str) -> FlushResult<Checkpoint> {
        self.inner.create_checkpoint(label)
    }

    fn last_committed(&self) -> FlushResult<Option<TermIndex>> {
        self.inner.last_committed()
    }

    fn get(&self, table: Table, key: &[u8]) -> FlushResult<Option<Vec<u8>>> {
        self.inner.get(table, key)
    }
}
