//! Background reaper for abandoned write-in-progress artifacts
//!
//! Saves that never finished (process crash, killed connection) leave
//! `.tmp` files under the storage root. This worker runs periodically,
//! walks the whole root and removes every such file older than `max_age`.
//! Finalized `.bin` objects are never touched.
//!
//! `max_age` has to exceed the slowest legitimate upload, otherwise a sweep
//! can remove the artifact of a save that is still streaming.

use crate::storage::path::TEMP_SUFFIX;
use log::{debug, error, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Outcome of one pass over the storage root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Temp artifacts examined
    pub scanned: usize,
    pub removed: usize,
    /// Entries that could not be read or removed
    pub failed: usize,
}

/// Background temp-file reaper
#[derive(Debug, Clone)]
pub struct TempFileReaper {
    root: PathBuf,
    interval: Duration,
    max_age: Duration,
}

impl TempFileReaper {
    pub fn new(root: impl Into<PathBuf>, interval: Duration, max_age: Duration) -> Self {
        Self {
            root: root.into(),
            interval,
            max_age,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Start the reaper as a background task (non-blocking).
    ///
    /// The first sweep runs immediately so leftovers from a previous run are
    /// reclaimed at startup. The task ends once `cancel` fires.
    pub fn start_background(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        info!(
            "Starting temp-file reaper on {} with {}s interval, {}s max age",
            self.root.display(),
            self.interval.as_secs(),
            self.max_age.as_secs()
        );

        tokio::spawn(async move {
            let mut interval = time::interval(self.interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Temp-file reaper on {} shutting down", self.root.display());
                        break;
                    }
                    _ = interval.tick() => {
                        let reaper = self.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || reaper.sweep()).await {
                            error!("Temp-file sweep task failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// Remove every expired temp artifact under the root
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now())
    }

    fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // One unreadable entry must not stop the rest of the sweep.
                    warn!("Failed to read entry under {}: {}", self.root.display(), e);
                    report.failed += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() || !is_temp_artifact(entry.path()) {
                continue;
            }
            report.scanned += 1;

            match self.reap_if_expired(entry.path(), now) {
                Ok(true) => report.removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to reap {}: {}", entry.path().display(), e);
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                "Temp-file sweep of {}: scanned={}, removed={}, failed={}",
                self.root.display(),
                report.scanned,
                report.removed,
                report.failed
            );
        } else {
            debug!("Temp-file sweep of {}: scanned={}", self.root.display(), report.scanned);
        }
        report
    }

    fn reap_if_expired(&self, path: &Path, now: SystemTime) -> io::Result<bool> {
        let modified = fs::metadata(path)?.modified()?;
        // Clock skew into the future counts as brand new.
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= self.max_age {
            return Ok(false);
        }

        match fs::remove_file(path) {
            Ok(()) => {
                info!("Removed stale artifact {} (age {}s)", path.display(), age.as_secs());
                Ok(true)
            }
            // Finished or aborted between the walk and the removal.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn is_temp_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(TEMP_SUFFIX))
}
