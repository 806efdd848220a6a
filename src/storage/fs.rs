//! Filesystem helpers shared by storage components.

use std::path::Path;

use crate::error::FlushResult;

/// Syncs directory entries so newly created files survive a crash.
pub fn sync_directory(path: &Path) -> FlushResult<()> {
    // `File::open` on a directory works on Linux and macOS as long as it exists.
    let dir = std::fs::File::open(path)?;
    dir.sync_all()?;
    Ok(())
}
