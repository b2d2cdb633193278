//! Storage paths of the form `<owner_id>/<object_id>.bin`

use crate::storage::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Extension of a finalized object file
pub const OBJECT_EXTENSION: &str = ".bin";

/// Suffix appended to the object file name while a save is in progress
pub const TEMP_SUFFIX: &str = ".tmp";

/// Check that an owner id can be used as a single directory name under the root.
pub fn validate_owner_id(owner_id: &str) -> Result<(), StorageError> {
    if owner_id.is_empty() {
        return Err(StorageError::InvalidInput("owner id must not be empty".into()));
    }
    if owner_id == "." || owner_id == ".." {
        return Err(StorageError::InvalidInput(format!(
            "owner id {:?} is reserved",
            owner_id
        )));
    }
    if owner_id.contains(['/', '\\', '\0']) {
        return Err(StorageError::InvalidInput(format!(
            "owner id {:?} contains a path separator",
            owner_id
        )));
    }
    Ok(())
}

/// Relative handle of a stored object, returned by a successful save
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoragePath {
    owner_id: String,
    object_id: Uuid,
}

impl StoragePath {
    pub fn new(owner_id: &str, object_id: Uuid) -> Result<Self, StorageError> {
        validate_owner_id(owner_id)?;
        Ok(Self {
            owner_id: owner_id.to_string(),
            object_id,
        })
    }

    /// A fresh path with a random object id
    pub fn generate(owner_id: &str) -> Result<Self, StorageError> {
        Self::new(owner_id, Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let invalid = || StorageError::InvalidInput(format!("malformed storage path {:?}", raw));

        let (owner_id, file_name) = raw.split_once('/').ok_or_else(invalid)?;
        validate_owner_id(owner_id).map_err(|_| invalid())?;

        let stem = file_name.strip_suffix(OBJECT_EXTENSION).ok_or_else(invalid)?;
        let object_id = Uuid::parse_str(stem).map_err(|_| invalid())?;
        // Only the canonical hyphenated form round-trips through Display.
        if object_id.hyphenated().to_string() != stem {
            return Err(invalid());
        }

        Ok(Self {
            owner_id: owner_id.to_string(),
            object_id,
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.object_id.hyphenated(), OBJECT_EXTENSION)
    }

    pub fn temp_file_name(&self) -> String {
        format!("{}{}", self.file_name(), TEMP_SUFFIX)
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.file_name())
    }
}

impl FromStr for StoragePath {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StoragePath {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StoragePath> for String {
    fn from(path: StoragePath) -> Self {
        path.to_string()
    }
}
