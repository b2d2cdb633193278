//! Configuration for binary storage backends

use crate::storage::{local_store::LocalFsBlobStore, mock_store::MockBlobStore, BlobStorage, StorageError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Available binary storage backends
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackend {
    #[default]
    Local,
    Mock,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "localfs" | "fs" => Ok(StorageBackend::Local),
            "mock" => Ok(StorageBackend::Mock),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

/// Configuration for binary storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    pub backend: StorageBackend,
    /// Root directory holding one subdirectory per owner
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: "./data/objects".to_string(),
        }
    }
}

/// Temp-file reaper configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Run the reaper alongside the local backend
    pub enabled: bool,
    /// Seconds between sweeps
    pub interval_secs: u64,
    /// Artifacts older than this many seconds are removed
    pub max_age_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 600,
            max_age_secs: 24 * 60 * 60,
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// A backend ready for use, plus its reaper task when one was started
pub struct OpenedStore {
    pub storage: Arc<dyn BlobStorage>,
    pub reaper: Option<JoinHandle<()>>,
}

impl StorageConfig {
    /// Apply `STORAGE_BACKEND` and `STORAGE_ROOT` on top of the current values
    pub fn apply_env(&mut self) {
        if let Ok(backend_str) = env::var("STORAGE_BACKEND") {
            match backend_str.parse::<StorageBackend>() {
                Ok(backend) => {
                    info!("Using storage backend from environment: {:?}", backend);
                    self.backend = backend;
                }
                Err(e) => {
                    warn!("Invalid storage backend in environment: {}. Keeping {:?}.", e, self.backend);
                }
            }
        }

        if let Ok(root) = env::var("STORAGE_ROOT") {
            if root.is_empty() {
                warn!("Empty STORAGE_ROOT in environment, keeping {}", self.root);
            } else {
                info!("Using storage root from environment: {}", root);
                self.root = root;
            }
        }
    }

    /// Create a storage instance based on the configuration.
    ///
    /// For the local backend with `reaper.enabled`, the temp-file reaper is
    /// spawned too, so this must then run inside a tokio runtime. Closing the
    /// store stops the reaper.
    pub fn create_store(&self, reaper: &ReaperConfig) -> Result<OpenedStore, StorageError> {
        match self.backend {
            StorageBackend::Local => {
                info!("Creating local filesystem storage backend with root: {}", self.root);
                let store = LocalFsBlobStore::open(&self.root)?;
                let handle = if reaper.enabled {
                    info!(
                        "Starting temp-file reaper: interval {}s, max age {}s",
                        reaper.interval_secs, reaper.max_age_secs
                    );
                    Some(store.spawn_reaper(reaper.interval(), reaper.max_age()))
                } else {
                    warn!("Temp-file reaper disabled; abandoned artifacts will accumulate");
                    None
                };
                Ok(OpenedStore {
                    storage: Arc::new(store),
                    reaper: handle,
                })
            }
            StorageBackend::Mock => {
                info!("Creating mock storage backend");
                Ok(OpenedStore {
                    storage: Arc::new(MockBlobStore::new()),
                    reaper: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("local".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert_eq!("LocalFS".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert_eq!("fs".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert_eq!("mock".parse::<StorageBackend>().unwrap(), StorageBackend::Mock);
        assert_eq!("MOCK".parse::<StorageBackend>().unwrap(), StorageBackend::Mock);

        assert!("invalid".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageBackend::Local);
        assert_eq!(config.root, "./data/objects");
    }

    #[test]
    #[serial]
    fn test_storage_config_from_env() {
        let mut config = StorageConfig::default();
        env::set_var("STORAGE_BACKEND", "mock");
        env::set_var("STORAGE_ROOT", "/srv/objects");
        config.apply_env();
        assert_eq!(config.backend, StorageBackend::Mock);
        assert_eq!(config.root, "/srv/objects");

        // Invalid values keep what was there
        env::set_var("STORAGE_BACKEND", "invalid");
        env::set_var("STORAGE_ROOT", "");
        config.apply_env();
        assert_eq!(config.backend, StorageBackend::Mock);
        assert_eq!(config.root, "/srv/objects");

        env::remove_var("STORAGE_BACKEND");
        env::remove_var("STORAGE_ROOT");
    }

    fn no_reaper() -> ReaperConfig {
        ReaperConfig {
            enabled: false,
            ..ReaperConfig::default()
        }
    }

    #[test]
    fn test_create_store() {
        let tmp = tempfile::tempdir().unwrap();
        let local_config = StorageConfig {
            backend: StorageBackend::Local,
            root: tmp.path().join("objects").to_string_lossy().into_owned(),
        };
        let mock_config = StorageConfig {
            backend: StorageBackend::Mock,
            ..StorageConfig::default()
        };

        // The mock backend never starts a reaper, so no runtime is needed here.
        let mock = mock_config.create_store(&ReaperConfig::default()).unwrap();
        assert!(mock.reaper.is_none());
        assert!(local_config.create_store(&no_reaper()).unwrap().reaper.is_none());
        assert!(tmp.path().join("objects").is_dir());
    }

    #[tokio::test]
    async fn test_local_store_reaper_stops_on_close() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Local,
            root: tmp.path().to_string_lossy().into_owned(),
        };
        let opened = config.create_store(&ReaperConfig::default()).unwrap();
        let handle = opened.reaper.expect("local backend starts its reaper");

        opened.storage.close();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }
}
