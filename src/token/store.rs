use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, warn};

use crate::errors::Error;
use crate::types::TokenPair;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Client-side key-value store holding the session's credentials.
///
/// Implementations must be safe to share across every in-flight request.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    fn remove(&self, key: &str) -> Result<(), Error>;

    /// Drops every credential the store holds. Both keys are attempted even
    /// when the first removal fails; the first error is returned.
    fn clear(&self) -> Result<(), Error> {
        let access = self.remove(ACCESS_TOKEN_KEY);
        let refresh = self.remove(REFRESH_TOKEN_KEY);
        access.and(refresh)
    }

    /// Returns the access token, treating an empty value as absent.
    fn access_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    fn set_access_token(&self, token: &str) -> Result<(), Error> {
        self.set(ACCESS_TOKEN_KEY, token)
    }

    fn save_pair(&self, pair: &TokenPair) -> Result<(), Error> {
        self.set(ACCESS_TOKEN_KEY, &pair.access)?;
        self.set(REFRESH_TOKEN_KEY, &pair.refresh)
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: &TokenPair) -> Self {
        let store = Self::new();
        {
            let mut values = store.values.write().unwrap_or_else(PoisonError::into_inner);
            values.insert(ACCESS_TOKEN_KEY.to_string(), pair.access.clone());
            values.insert(REFRESH_TOKEN_KEY.to_string(), pair.refresh.clone());
        }
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

/// JSON-object store persisted to disk after every mutation.
///
/// Writes go to a sibling temp file that is renamed over the store, and the
/// in-memory map only changes once the file is in place. `clear` is the
/// exception: credentials leave memory even when the file cannot be updated.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl FileTokenStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(Error::Io(err)),
        };
        debug!(path = %path.display(), keys = values.len(), "token_store.open");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string(values)?;
        let temp = self.temp_path();
        std::fs::write(&temp, body)?;
        if let Err(err) = std::fs::rename(&temp, &self.path) {
            let _ = std::fs::remove_file(&temp);
            return Err(Error::Io(err));
        }
        Ok(())
    }

    /// Applies `change` to a copy of the map and swaps it in once persisted.
    fn update<F>(&self, change: F) -> Result<(), Error>
    where
        F: FnOnce(&mut HashMap<String, String>) -> bool,
    {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = values.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.update(|values| values.remove(key).is_some())
    }

    fn save_pair(&self, pair: &TokenPair) -> Result<(), Error> {
        self.update(|values| {
            values.insert(ACCESS_TOKEN_KEY.to_string(), pair.access.clone());
            values.insert(REFRESH_TOKEN_KEY.to_string(), pair.refresh.clone());
            true
        })
    }

    fn clear(&self) -> Result<(), Error> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let had_access = values.remove(ACCESS_TOKEN_KEY).is_some();
        let had_refresh = values.remove(REFRESH_TOKEN_KEY).is_some();
        if !had_access && !had_refresh {
            return Ok(());
        }
        if let Err(err) = self.persist(&values) {
            warn!(
                path = %self.path.display(),
                error = %err,
                "token_store.clear could not rewrite file; removing it"
            );
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(remove_err) if remove_err.kind() == std::io::ErrorKind::NotFound => {}
                Err(_) => return Err(err),
            }
        }
        Ok(())
    }
}
