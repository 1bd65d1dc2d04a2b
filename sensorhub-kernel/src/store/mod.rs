/**
 * ACCOUNT/DEVICE STORE - File-backed persistence for the dashboard
 *
 * ROLE :
 * Keeps users and their devices (with alert thresholds) across restarts.
 *
 * HOW IT WORKS :
 * - One JSON file per collection under the data directory
 * - Loaded into an in-memory cache at startup
 * - Every mutation runs on a copy of the cache; the copy replaces the
 *   cache only once it has been written to disk (failed updates leave
 *   nothing behind)
 */

pub mod accounts;
pub mod devices;

pub use accounts::{AccountStore, User, UserView};
pub use devices::{Device, DeviceStore, DeviceView, LimitsUpdate, ThresholdProfile};

use crate::config::StoreConf;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("Password hashing task failed: {0}")]
    HashTask(#[from] tokio::task::JoinError),
}

/// A persisted list of records
pub struct JsonCollection<T> {
    storage_path: PathBuf,
    cache: parking_lot::Mutex<Vec<T>>,
}

impl<T: Serialize + DeserializeOwned + Clone> JsonCollection<T> {
    pub fn open<P: Into<PathBuf>>(storage_path: P) -> Result<Self, StoreError> {
        let storage_path = storage_path.into();
        if !storage_path.exists() {
            fs::write(&storage_path, "[]")?;
        }

        let content = fs::read_to_string(&storage_path)?;
        let items: Vec<T> = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content)?
        };

        info!("[store] {} records loaded from {:?}", items.len(), storage_path);
        Ok(Self {
            storage_path,
            cache: parking_lot::Mutex::new(items),
        })
    }

    /// Read-only access to the cached records
    pub fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.cache.lock())
    }

    /// Applies `f` to a copy, persists it, then swaps it in
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> Result<R, StoreError>) -> Result<R, StoreError> {
        let mut cache = self.cache.lock();
        let mut draft = cache.clone();
        let out = f(&mut draft)?;

        let json = serde_json::to_string_pretty(&draft)?;
        fs::write(&self.storage_path, json)?;
        *cache = draft;
        Ok(out)
    }
}

pub fn open_stores(conf: &StoreConf) -> Result<(AccountStore, DeviceStore), StoreError> {
    let dir = Path::new(&conf.data_dir);
    fs::create_dir_all(dir)?;

    let accounts = AccountStore::open(dir.join("users.json"), conf.bcrypt_cost)?;
    let devices = DeviceStore::open(dir.join("devices.json"))?;
    Ok((accounts, devices))
}
