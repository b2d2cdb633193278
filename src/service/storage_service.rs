//! Storage service layer that provides a clean interface to the storage abstraction

use crate::bridge::{self, with_owner_tag, DownloadStream, UploadMessage};
use crate::config::StreamingConfig;
use crate::storage::{BlobStorage, StorageError, StoragePath};
use chrono::{DateTime, Utc};
use futures::Stream;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

/// What the metadata layer needs to record a stored object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub storage_path: StoragePath,
    pub size: u64,
    pub title: String,
    pub client_path: Option<String>,
    pub metadata: HashMap<String, String>,
    pub stored_at: DateTime<Utc>,
}

/// Storage service that provides a clean interface to the storage abstraction
pub struct StorageService {
    storage: Arc<dyn BlobStorage>,
    streaming: StreamingConfig,
}

impl StorageService {
    /// Create a new storage service with injected storage backend
    pub fn new(storage: Arc<dyn BlobStorage>, streaming: StreamingConfig) -> Self {
        Self { storage, streaming }
    }

    /// Store an upload message sequence for `owner_id`
    pub async fn upload<S>(&self, owner_id: &str, messages: S) -> Result<UploadReceipt, StorageError>
    where
        S: Stream<Item = io::Result<UploadMessage>> + Unpin,
    {
        let (header, stored) = bridge::upload(
            Arc::clone(&self.storage),
            owner_id,
            messages,
            self.streaming.pipe_capacity,
        )
        .await?;

        Ok(UploadReceipt {
            storage_path: stored.path,
            size: stored.size,
            title: header.title,
            client_path: header.client_path,
            metadata: header.metadata,
            stored_at: Utc::now(),
        })
    }

    /// Open an object for streaming in configured-size blocks
    pub async fn download(&self, path: &StoragePath) -> Result<DownloadStream, StorageError> {
        bridge::download(
            Arc::clone(&self.storage),
            path.clone(),
            self.streaming.block_size,
            self.streaming.pipe_capacity,
        )
        .await
    }

    /// Remove an object; removing an absent one succeeds
    pub async fn delete(&self, path: &StoragePath) -> Result<(), StorageError> {
        let storage = Arc::clone(&self.storage);
        let path = path.clone();
        tokio::task::spawn_blocking(move || with_owner_tag(path.owner_id(), || storage.delete(&path)))
            .await
            .map_err(|e| StorageError::Internal(format!("delete task failed: {}", e)))?
    }

    /// Stop background maintenance of the underlying store
    pub fn close(&self) {
        info!("Closing storage service");
        self.storage.close();
    }
}
