//! Owner context extracted from request headers

use crate::bridge::UploadHeader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header prefix for free-form upload metadata (`X-Meta-<key>`)
pub const METADATA_HEADER_PREFIX: &str = "x-meta-";

/// Owner context containing all request-scoped information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerContext {
    /// Owner identifier; names the namespace directory under the storage root
    pub owner_id: String,
    pub title: Option<String>,
    pub client_path: Option<String>,
    /// Values of `X-Meta-*` headers, keyed without the prefix
    pub metadata: HashMap<String, String>,
}

impl OwnerContext {
    pub fn new(owner_id: String) -> Self {
        Self {
            owner_id,
            title: None,
            client_path: None,
            metadata: HashMap::new(),
        }
    }

    /// Set a metadata field
    pub fn set_metadata(&mut self, key: String, value: String) {
        self.metadata.insert(key, value);
    }

    pub fn get_metadata(&self, key: &str) -> Option<&String> {
        self.metadata.get(key)
    }

    /// Opening message of an upload, if a title was supplied
    pub fn upload_header(&self) -> Option<UploadHeader> {
        let title = self.title.clone()?;
        Some(UploadHeader {
            title,
            client_path: self.client_path.clone(),
            metadata: self.metadata.clone(),
        })
    }
}
