//! Local filesystem binary storage implementation
//!
//! Layout under the root:
//!
//! ```text
//! {root}/
//! └── {owner_id}/
//!     ├── {object_id}.bin        # finalized objects
//!     └── {object_id}.bin.tmp    # saves in progress (or crash leftovers)
//! ```
//!
//! A save streams into the `.tmp` artifact and renames it onto the final
//! name once the whole input has been written and synced. The rename is the
//! only point at which an object becomes visible, so readers never observe a
//! partial object and concurrent saves never share a file.

use crate::storage::path::validate_owner_id;
use crate::storage::reaper::TempFileReaper;
use crate::storage::{BlobStorage, IoStep, ObjectReader, StorageError, StoragePath, StoredObject};
use log::{debug, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Create `path` and any missing parents, private to the current user on unix
fn create_private_dir(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

/// Write-in-progress artifact. Removed on drop unless it was persisted.
struct TempArtifact {
    path: PathBuf,
    file: Option<File>,
    persisted: bool,
}

impl TempArtifact {
    fn create(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
            persisted: false,
        })
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(data),
            None => Err(io::Error::other("artifact already closed")),
        }
    }

    /// Sync, close and rename onto `target`
    fn persist(mut self, target: &Path) -> Result<(), StorageError> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .map_err(|e| StorageError::io(IoStep::SyncArtifact, &self.path, e))?;
        }
        fs::rename(&self.path, target)
            .map_err(|e| StorageError::io(IoStep::RenameArtifact, &self.path, e))?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        self.file.take();
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed abandoned artifact {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove abandoned artifact {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Copy the whole content stream into the artifact, returning the byte count.
///
/// Read failures are reported as [`StorageError::Stream`] so callers can tell
/// a broken upload apart from a failing disk.
fn copy_content(content: &mut dyn Read, artifact: &mut TempArtifact) -> Result<u64, StorageError> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let n = match content.read(&mut buffer) {
            Ok(0) => return Ok(written),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StorageError::Stream(e)),
        };
        artifact
            .write_all(&buffer[..n])
            .map_err(|e| StorageError::io(IoStep::WriteArtifact, &artifact.path, e))?;
        written += n as u64;
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        warn!("Failed to sync directory {}: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// Local filesystem binary storage implementation
pub struct LocalFsBlobStore {
    root: PathBuf,
    shutdown: CancellationToken,
}

impl LocalFsBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        create_private_dir(&root)
            .map_err(|e| StorageError::io(IoStep::CreateDirectory, &root, e))?;
        info!("Using storage root: {}", root.display());
        Ok(Self {
            root,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn owner_dir(&self, owner_id: &str) -> PathBuf {
        self.root.join(owner_id)
    }

    fn object_file(&self, path: &StoragePath) -> PathBuf {
        self.owner_dir(path.owner_id()).join(path.file_name())
    }

    /// Start the temp-file reaper for this root. It stops when the store is closed.
    pub fn spawn_reaper(&self, interval: Duration, max_age: Duration) -> tokio::task::JoinHandle<()> {
        TempFileReaper::new(self.root.clone(), interval, max_age)
            .start_background(self.shutdown.child_token())
    }
}

impl BlobStorage for LocalFsBlobStore {
    fn save(&self, owner_id: &str, content: &mut dyn Read) -> Result<StoredObject, StorageError> {
        validate_owner_id(owner_id)?;

        let owner_dir = self.owner_dir(owner_id);
        create_private_dir(&owner_dir)
            .map_err(|e| StorageError::io(IoStep::CreateDirectory, &owner_dir, e))?;

        let path = StoragePath::generate(owner_id)?;
        let temp_file = owner_dir.join(path.temp_file_name());
        let final_file = owner_dir.join(path.file_name());

        let mut artifact = TempArtifact::create(temp_file.clone())
            .map_err(|e| StorageError::io(IoStep::CreateArtifact, &temp_file, e))?;

        let size = match copy_content(content, &mut artifact) {
            Ok(size) => size,
            Err(e) => {
                warn!("Save of {} aborted: {}", path, e);
                return Err(e);
            }
        };

        artifact.persist(&final_file)?;
        sync_dir(&owner_dir);

        info!("Stored object {} ({} bytes)", path, size);
        Ok(StoredObject { path, size })
    }

    fn load(&self, path: &StoragePath) -> Result<ObjectReader, StorageError> {
        let file_path = self.object_file(path);
        match File::open(&file_path) {
            Ok(file) => {
                debug!("Opened object {}", path);
                Ok(Box::new(file))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                warn!("Object {} is unreadable: {}", path, e);
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::io(IoStep::OpenObject, file_path, e)),
        }
    }

    fn delete(&self, path: &StoragePath) -> Result<(), StorageError> {
        let file_path = self.object_file(path);
        match fs::remove_file(&file_path) {
            Ok(()) => {
                info!("Deleted object {}", path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Object {} already absent", path);
                Ok(())
            }
            Err(e) => Err(StorageError::io(IoStep::RemoveObject, file_path, e)),
        }
    }

    fn close(&self) {
        info!("Closing storage at {}", self.root.display());
        self.shutdown.cancel();
    }
}
