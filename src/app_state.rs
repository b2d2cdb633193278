//! Application State Management
//!
//! This module provides the application state that contains all services
//! and their dependencies, following the dependency injection pattern.

use log::{info, warn};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::service::storage_service::StorageService;
use crate::storage::{mock_store::MockBlobStore, BlobStorage, StorageError};

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub storage_service: Arc<StorageService>,
    pub config: AppConfig,
    reaper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AppState {
    /// Create application state from configuration.
    ///
    /// Must be called inside a tokio runtime when the local backend has its
    /// reaper enabled.
    pub fn from_config(config: AppConfig) -> Result<Self, StorageError> {
        info!("Initializing application state with configuration");
        config.validate()?;

        let opened = config.storage.create_store(&config.reaper)?;
        let storage_backend = opened.storage;
        let reaper = opened.reaper;

        let storage_service = Arc::new(StorageService::new(storage_backend, config.streaming.clone()));

        info!("Application state initialized successfully");
        Ok(Self {
            storage_service,
            config,
            reaper: Arc::new(Mutex::new(reaper)),
        })
    }

    /// Create application state for testing with the mock backend
    pub fn new_for_testing() -> Self {
        let config = AppConfig::default();
        let storage_backend: Arc<dyn BlobStorage> = Arc::new(MockBlobStore::new());
        let storage_service = Arc::new(StorageService::new(storage_backend, config.streaming.clone()));

        Self {
            storage_service,
            config,
            reaper: Arc::new(Mutex::new(None)),
        }
    }

    /// Close the store and wait for background maintenance to stop
    pub async fn shutdown(&self) {
        self.storage_service.close();

        let handle = self
            .reaper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Reaper task ended abnormally: {}", e);
            }
        }
        info!("Application state shut down");
    }
}
