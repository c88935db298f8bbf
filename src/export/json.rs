//! JSON import/export of user snapshots.
//! A snapshot file holds the digest, every review and the due list of one user.

use crate::error::{CoreError, CoreResult};
use crate::service::UserSnapshot;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Writes the snapshot as pretty JSON, replacing any existing file.
pub fn export_snapshot_to_path<P: AsRef<Path>>(snapshot: &UserSnapshot, path: P) -> CoreResult<()> {
    let path = path.as_ref();
    let json_string = serde_json::to_string_pretty(snapshot)
        .map_err(|e| CoreError::InvalidValue(format!("cannot encode snapshot: {e}")))?;
    let mut file = File::create(path).map_err(|e| storage_error(path, e))?;
    file.write_all(json_string.as_bytes())
        .map_err(|e| storage_error(path, e))?;

    tracing::info!(
        user_id = %snapshot.digest.user_id,
        reviews = snapshot.reviews.len(),
        path = %path.display(),
        "snapshot exported"
    );
    Ok(())
}

pub fn import_snapshot<P: AsRef<Path>>(path: P) -> CoreResult<UserSnapshot> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| storage_error(path, e))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| storage_error(path, e))?;

    let snapshot: UserSnapshot = serde_json::from_str(&contents).map_err(|e| {
        CoreError::InvalidValue(format!("invalid snapshot {}: {e}", path.display()))
    })?;
    Ok(snapshot)
}

fn storage_error(path: &Path, err: std::io::Error) -> CoreError {
    tracing::warn!(path = %path.display(), error = %err, "snapshot file unavailable");
    CoreError::StorageUnavailable(Box::new(err))
}
