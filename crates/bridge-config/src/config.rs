// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service and storage port.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Storage port for raw config blobs, keyed by logical name.
pub trait ConfigStore {
    /// Load a raw blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Value loaded but unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Serialises config values and delegates storage to a [`ConfigStore`].
#[derive(Debug)]
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a service over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The inner store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: ConfigStore> ConfigService<S> {
    /// Load and deserialise `key`. Missing or empty blobs yield `Ok(None)`.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Load `key`, or `T::default()` when it is missing.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, ConfigError> {
        Ok(self.load(key)?.unwrap_or_default())
    }

    /// Serialise and persist `value` under `key`.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemStore(RefCell<HashMap<String, Vec<u8>>>);

    impl ConfigStore for MemStore {
        fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
            self.0.borrow().get(key).cloned().ok_or(ConfigError::NotFound)
        }

        fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
            self.0.borrow_mut().insert(key.to_string(), data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn missing_and_empty_keys_load_as_none() {
        let svc = ConfigService::new(MemStore::default());
        assert!(svc.load::<u32>("absent").unwrap().is_none());
        svc.store().save_raw("empty", &[]).unwrap();
        assert!(svc.load::<u32>("empty").unwrap().is_none());
        assert_eq!(svc.load_or_default::<u32>("absent").unwrap(), 0);
    }

    #[test]
    fn corrupt_blob_is_a_serde_error() {
        let svc = ConfigService::new(MemStore::default());
        svc.store().save_raw("bad", b"{not json").unwrap();
        assert!(matches!(svc.load::<u32>("bad"), Err(ConfigError::Serde(_))));
    }
}
