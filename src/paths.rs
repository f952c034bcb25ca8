use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "pageflip";
const LOG_FILENAME: &str = "pageflip.log";

/// Directory holding the persisted document and its rendered pages.
/// Creates it if it doesn't exist.
pub fn resolve_store_dir() -> Result<PathBuf> {
    let store_dir = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join(APP_NAME)
        .join("store");

    fs::create_dir_all(&store_dir)
        .with_context(|| format!("Failed to create store directory: {store_dir:?}"))?;

    Ok(store_dir)
}

/// Compute the XDG-compliant log file path.
/// Uses `state_dir` on platforms that have it, falls back to `cache_dir`.
pub fn resolve_log_path() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(dirs::cache_dir)
        .context("Could not determine state or cache directory")?;

    let log_dir = base.join(APP_NAME);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {log_dir:?}"))?;

    Ok(log_dir.join(LOG_FILENAME))
}

/// Absolute form of a user-supplied document path
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("Failed to get current directory")?
        .join(path))
}
