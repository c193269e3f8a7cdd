//! Durable snapshot of the in-memory session map.
//!
//! A JSON array of session records, overwritten wholesale on every save.
//! Writes are best-effort: a crash between saves loses at most the most
//! recent mutations, which is an accepted trade against write amplification.

use std::{fs, path::Path};

use crate::{error::Result, store::Session};

/// Read a snapshot file. A missing file yields an empty list; a corrupt
/// file is surfaced as an error so the caller can log it and start empty.
pub fn read(path: &Path) -> Result<Vec<Session>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Overwrite the snapshot file with the given records.
pub fn write(path: &Path, sessions: &[Session]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(sessions)?;
    fs::write(path, data)?;
    Ok(())
}
