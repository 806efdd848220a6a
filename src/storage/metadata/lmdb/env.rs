use std::path::{Path, PathBuf};

use heed::types::{Bytes, SerdeBincode, Str};
use heed::{Database, Env, EnvOpenOptions, Error as HeedError, RoTxn};

use crate::error::FlushResult;
use crate::types::{Table, TermIndex};

pub(super) const DEFAULT_MAP_SIZE: usize = 1 << 30;

pub(super) type TableDb = Database<Bytes, Bytes>;
pub(super) type StateDb = Database<Str, SerdeBincode<TermIndex>>;

pub(super) struct EnvHandles {
    pub(super) env: Env,
    pub(super) path: PathBuf,
    pub(super) state_db: StateDb,
    pub(super) table_dbs: [TableDb; 4],
}

pub(super) fn open_rw(path: &Path, map_size: usize) -> FlushResult<EnvHandles> {
    std::fs::create_dir_all(path)?;

    let mut options = EnvOpenOptions::new();
    options.map_size(map_size);
    options.max_dbs(8);

    let env = unsafe {
        match options.open(path) {
            Ok(env) => env,
            Err(HeedError::BadOpenOptions { env, .. }) => env,
            Err(err) => {
                tracing::error!(
                    path = ?path,
                    map_size,
                    ?err,
                    "Failed to open LMDB environment (read/write)"
                );
                return Err(err.into());
            }
        }
    };

    let existing = match env.read_txn() {
        Ok(txn) => open_existing(&env, txn)?,
        Err(err) => {
            tracing::warn!(
                path = ?path,
                ?err,
                "Failed to open read txn when probing metadata databases; will attempt creation"
            );
            None
        }
    };

    let (state_db, table_dbs) = match existing {
        Some(dbs) => dbs,
        None => {
            let mut txn = match env.write_txn() {
                Ok(txn) => txn,
                Err(err) => {
                    tracing::error!(
                        path = ?path,
                        ?err,
                        "Failed to start write txn for metadata init"
                    );
                    return Err(err.into());
                }
            };
            let state_db = env.create_database::<Str, SerdeBincode<TermIndex>>(
                &mut txn,
                Some("transaction_info"),
            )?;
            let volumes =
                env.create_database::<Bytes, Bytes>(&mut txn, Some(Table::Volumes.name()))?;
            let buckets =
                env.create_database::<Bytes, Bytes>(&mut txn, Some(Table::Buckets.name()))?;
            let keys = env.create_database::<Bytes, Bytes>(&mut txn, Some(Table::Keys.name()))?;
            let snapshots =
                env.create_database::<Bytes, Bytes>(&mut txn, Some(Table::Snapshots.name()))?;
            txn.commit()?;
            (state_db, [volumes, buckets, keys, snapshots])
        }
    };

    Ok(EnvHandles {
        env,
        path: path.to_path_buf(),
        state_db,
        table_dbs,
    })
}

fn open_existing(env: &Env, txn: RoTxn) -> FlushResult<Option<(StateDb, [TableDb; 4])>> {
    let state_db =
        env.open_database::<Str, SerdeBincode<TermIndex>>(&txn, Some("transaction_info"))?;
    let volumes = env.open_database::<Bytes, Bytes>(&txn, Some(Table::Volumes.name()))?;
    let buckets = env.open_database::<Bytes, Bytes>(&txn, Some(Table::Buckets.name()))?;
    let keys = env.open_database::<Bytes, Bytes>(&txn, Some(Table::Keys.name()))?;
    let snapshots = env.open_database::<Bytes, Bytes>(&txn, Some(Table::Snapshots.name()))?;

    match (state_db, volumes, buckets, keys, snapshots) {
        (Some(state_db), Some(volumes), Some(buckets), Some(keys), Some(snapshots)) => {
            txn.commit()?;
            Ok(Some((state_db, [volumes, buckets, keys, snapshots])))
        }
        _ => Ok(None),
    }
}
