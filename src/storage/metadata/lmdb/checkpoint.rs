use std::fs;
use std::path::{Component, Path};
use std::time::Instant;

use heed::{CompactionOption, Env};

use crate::error::{FlushError, FlushResult};
use crate::storage::fs::sync_directory;
use crate::storage::metadata::Checkpoint;
use crate::types::TermIndex;

const DATA_FILE_NAME: &str = "data.mdb";

/// Copies the environment into `<checkpoints_dir>/<label>/data.mdb`.
///
/// The copy runs inside its own read transaction, so it reflects exactly the
/// write transactions committed before the call. A failed copy leaves no
/// directory behind.
pub(super) fn create(
    env: &Env,
    checkpoints_dir: &Path,
    label: &str,
    created_through: Option<TermIndex>,
) -> FlushResult<Checkpoint> {
    validate_label(label)?;

    let started_at = Instant::now();
    let location = checkpoints_dir.join(label);

    if location.exists() {
        return Err(FlushError::CheckpointExists { path: location });
    }

    fs::create_dir_all(&location)?;

    let copy_result = env
        .copy_to_file(location.join(DATA_FILE_NAME), CompactionOption::Enabled)
        .map_err(FlushError::from)
        .and_then(|file| file.sync_all().map_err(FlushError::from))
        .and_then(|()| sync_directory(&location))
        .and_then(|()| sync_directory(checkpoints_dir));

    if let Err(err) = copy_result {
        if let Err(cleanup_err) = fs::remove_dir_all(&location) {
            tracing::warn!(
                path = ?location,
                ?cleanup_err,
                "Failed to remove partial checkpoint"
            );
        }
        return Err(err);
    }

    let creation_time = started_at.elapsed();
    tracing::info!(
        path = ?location,
        created_through = ?created_through,
        elapsed_ms = creation_time.as_millis() as u64,
        "Checkpoint created"
    );

    Ok(Checkpoint::new(location, created_through, creation_time))
}

/// A label must name exactly one directory directly under the checkpoints
/// directory.
fn validate_label(label: &str) -> FlushResult<()> {
    let mut components = Path::new(label).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(name)) if name == label)
        && components.next().is_none();
    if single_normal && !label.contains(['/', '\\']) {
        Ok(())
    } else {
        Err(FlushError::InvalidCheckpointLabel {
            label: label.to_string(),
        })
    }
}
