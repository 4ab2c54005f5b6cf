use crate::error::BridgeError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Extra attempts for read queries. Mutations are never retried.
pub const READ_RETRY_COUNT: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    ModFolders { dir: PathBuf },
    ModInfo(PathBuf),
    IniFiles(PathBuf),
    IniDocument { folder: PathBuf, file_name: String },
    PreviewImages(PathBuf),
}

impl QueryKey {
    fn anchor(&self) -> &Path {
        match self {
            QueryKey::ModFolders { dir } => dir,
            QueryKey::ModInfo(folder)
            | QueryKey::IniFiles(folder)
            | QueryKey::PreviewImages(folder)
            | QueryKey::IniDocument { folder, .. } => folder,
        }
    }
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<QueryKey, Value>,
}

impl QueryCache {
    /// Returns the cached value for `key`, or runs `fetcher` (with read retries) and caches it.
    pub fn fetch<T, F>(&mut self, key: QueryKey, mut fetcher: F) -> Result<T, BridgeError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Result<T, BridgeError>,
    {
        if let Some(value) = self.entries.get(&key) {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(cached) => return Ok(cached),
                Err(_) => {
                    self.entries.remove(&key);
                }
            }
        }

        let mut attempt = 0;
        let fetched = loop {
            match fetcher() {
                Ok(value) => break value,
                Err(err) if attempt < READ_RETRY_COUNT && is_retryable(&err) => {
                    tracing::debug!(?key, error = %err, "retrying read query");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        if let Ok(value) = serde_json::to_value(&fetched) {
            self.entries.insert(key, value);
        }
        Ok(fetched)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn invalidate(&mut self, key: &QueryKey) {
        self.entries.remove(key);
    }

    /// Drops every query whose anchor folder contains `path` or lies under it.
    pub fn invalidate_path(&mut self, path: &Path) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| {
            let anchor = key.anchor();
            !(path.starts_with(anchor) || anchor.starts_with(path))
        });
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn is_retryable(err: &BridgeError) -> bool {
    !matches!(
        err,
        BridgeError::Decode { .. } | BridgeError::UnknownCommand(_)
    )
}
