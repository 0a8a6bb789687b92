//! Timestamp-based staleness.
//!
//! Only the unit's own source file is compared against its object. Headers and
//! other transitive inputs are not tracked, so editing a shared header alone
//! does not trigger a rebuild.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

/// Returns true when `artifact` must be rebuilt from `source`.
///
/// A missing artifact is stale. Otherwise the artifact is fresh only if it is
/// strictly newer than the source; equal timestamps count as stale.
pub fn is_stale(source: &Path, artifact: &Path) -> std::io::Result<bool> {
    let artifact_modified = match modified(artifact) {
        Ok(time) => time,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    let source_modified = modified(source)?;
    Ok(source_modified >= artifact_modified)
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}
