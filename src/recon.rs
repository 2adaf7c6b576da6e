//! Recon cache.
//!
//! Monitoring tools read `<recon_cache_path>/object.recon`, a flat JSON object
//! shared by several daemons. The sweeper owns one key,
//! [`SWEEP_ELAPSED_KEY`], and merges it in without disturbing the others.
//! Writes go to a temp file that is renamed into place, so readers never see
//! a half-written file.

use crate::error::{Result, SweepError};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name inside the recon cache directory.
pub const RECON_FILE_NAME: &str = "object.recon";

/// Key holding the elapsed seconds of the last sweep.
pub const SWEEP_ELAPSED_KEY: &str = "object_updater_sweep";

/// Path of the recon file inside `dir`.
pub fn recon_file(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(RECON_FILE_NAME)
}

/// Merge `entries` into the recon file in `dir`.
///
/// A missing or unreadable existing file is replaced rather than treated as
/// an error.
pub async fn dump_recon_cache(dir: impl AsRef<Path>, entries: Map<String, Value>) -> Result<()> {
    let path = recon_file(&dir);

    let mut cache = match tokio::fs::read(&path).await {
        Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        Err(_) => Map::new(),
    };
    cache.extend(entries);

    let body = serde_json::to_vec(&Value::Object(cache))
        .map_err(|e| SweepError::Internal(format!("Failed to encode recon cache: {}", e)))?;

    tokio::fs::create_dir_all(dir.as_ref())
        .await
        .map_err(|e| recon_io_error(&path, e))?;

    let tmp = path.with_extension(format!("recon.tmp.{}", std::process::id()));
    tokio::fs::write(&tmp, &body)
        .await
        .map_err(|e| recon_io_error(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, &path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(recon_io_error(&path, e));
    }

    debug!(path = %path.display(), "Updated recon cache");
    Ok(())
}

/// Record the elapsed time of a completed sweep.
pub async fn dump_sweep_elapsed(dir: impl AsRef<Path>, elapsed_secs: f64) -> Result<()> {
    let mut entries = Map::new();
    entries.insert(SWEEP_ELAPSED_KEY.to_string(), Value::from(elapsed_secs));
    dump_recon_cache(dir, entries).await
}

fn recon_io_error(path: &Path, e: std::io::Error) -> SweepError {
    SweepError::Internal(format!("recon cache {}: {}", path.display(), e))
}
