// File system locations and checksums
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Get the app data directory for qrsbench
pub fn get_app_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    let app_dir = data_dir.join("qrsbench");
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Run ledger location when none is configured
pub fn default_db_path() -> StorageResult<PathBuf> {
    Ok(get_app_data_dir()?.join("runs.db"))
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA256 of a file on disk
pub fn file_sha256(path: &Path) -> StorageResult<String> {
    let data = fs::read(path)?;
    Ok(calculate_sha256(&data))
}
