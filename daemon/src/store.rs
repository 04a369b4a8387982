/// Video asset store: the manifest of records plus the files it describes.
///
/// Mutations (`save`, `delete`, `set_primary`, `restore`) are serialized by a
/// write lock; `reconcile` and listings share a read lock. Every operation
/// reloads the manifest from disk, since files and manifest may drift apart
/// out-of-band and the store must notice rather than trust a cache.
///
/// Write ordering is chosen so a partial failure always leaves drift that
/// `reconcile` can see: on save the file lands first (a failed manifest write
/// leaves an orphan, or a file whose length disagrees with its record when the
/// name already existed), on delete the record goes first (a failed file
/// removal leaves an orphan).
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{info, warn};

use crate::blobs::BlobStore;
use crate::manifest::{self, Manifest, VideoAsset};

pub const MANIFEST_FILE_NAME: &str = "video-storage.json";
pub const VIDEO_DIR_NAME: &str = "videos";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No video named '{0}'")]
    NotFound(String),

    #[error("Failed to write {what}: {source}")]
    WriteFailed {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("The file for '{0}' is missing and there is no embedded copy to restore it from")]
    FileMissing(String),

    #[error("Invalid video name '{0}'")]
    InvalidName(String),

    #[error("Video manifest could not be read: {0}")]
    ManifestCorrupt(#[source] io::Error),

    #[error("Video '{0}' does not match its record and has no embedded copy to restore from")]
    Unrecoverable(String),

    #[error("Failed to list the video directory: {0}")]
    ListFailed(#[source] io::Error),
}

/// Per-record outcome of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum EntryStatus {
    Ok,
    /// Record without a file. `recoverable` when an embedded copy exists.
    FileMissing { recoverable: bool },
    /// File present but not the length the record says, e.g. a re-upload
    /// whose manifest write failed.
    SizeMismatch {
        expected: u64,
        actual: u64,
        recoverable: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub name: String,
    #[serde(flatten)]
    pub status: EntryStatus,
}

/// Drift between the manifest and the video directory. Reported, never repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub entries: Vec<EntryReport>,
    /// Files on disk with no manifest record.
    pub orphans: Vec<String>,
}

impl ReconciliationReport {
    pub fn has_drift(&self) -> bool {
        !self.orphans.is_empty() || self.drifted().next().is_some()
    }

    /// Entries whose file is absent or does not match the record.
    pub fn drifted(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|e| e.status != EntryStatus::Ok)
    }

    pub fn missing(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::FileMissing { .. }))
    }
}

pub struct VideoAssetStore {
    manifest_path: PathBuf,
    blobs: BlobStore,
    lock: RwLock<()>,
}

impl VideoAssetStore {
    /// Store rooted at `root`: `<root>/video-storage.json` and `<root>/videos/`.
    pub fn open(root: &Path) -> Self {
        Self {
            manifest_path: root.join(MANIFEST_FILE_NAME),
            blobs: BlobStore::new(root.join(VIDEO_DIR_NAME)),
            lock: RwLock::new(()),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn video_dir(&self) -> &Path {
        self.blobs.dir()
    }

    /// All records, without their embedded copies.
    pub fn list(&self) -> Result<Vec<VideoAsset>, StoreError> {
        let _read = self.read();
        Ok(self
            .load()?
            .videos
            .iter()
            .map(VideoAsset::without_data)
            .collect())
    }

    pub fn primary(&self) -> Result<Option<VideoAsset>, StoreError> {
        let _read = self.read();
        Ok(self.load()?.primary().map(VideoAsset::without_data))
    }

    /// Stores `bytes` as `name` and records it, embedding a recovery copy.
    pub fn save(&self, name: &str, bytes: &[u8]) -> Result<VideoAsset, StoreError> {
        validate_name(name)?;
        let _write = self.write();
        let mut manifest = self.load()?;

        self.blobs
            .write(name, bytes)
            .map_err(|source| StoreError::WriteFailed {
                what: "video file",
                source,
            })?;

        let relative_path = format!("{VIDEO_DIR_NAME}/{name}");
        let asset = manifest
            .upsert(VideoAsset::for_upload(name, relative_path, bytes))
            .clone();
        self.persist(&manifest)?;

        info!(video = name, size = asset.size_bytes, "Video saved");
        Ok(asset)
    }

    /// Removes the record and the file. Either being absent already is fine.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let _write = self.write();
        let mut manifest = self.load()?;

        if manifest.remove(name).is_some() {
            self.persist(&manifest)?;
        }

        // Names that could never be stored never reach the filesystem.
        if validate_name(name).is_ok() {
            self.blobs
                .remove(name)
                .map_err(|source| StoreError::WriteFailed {
                    what: "video file removal",
                    source,
                })?;
        }
        info!(video = name, "Video deleted");
        Ok(())
    }

    /// Makes `name` the sole primary video in a single manifest write.
    pub fn set_primary(&self, name: &str) -> Result<(), StoreError> {
        let _write = self.write();
        let mut manifest = self.load()?;
        if !manifest.set_primary(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        self.persist(&manifest)?;
        info!(video = name, "Primary video set");
        Ok(())
    }

    /// Compares the manifest against the video directory. Read-only.
    pub fn reconcile(&self) -> Result<ReconciliationReport, StoreError> {
        let _read = self.read();
        let manifest = self.load()?;
        let mut on_disk = self.blobs.list().map_err(StoreError::ListFailed)?;

        let entries = manifest
            .videos
            .iter()
            .map(|asset| {
                let recoverable = asset.embedded_data.is_some();
                let status = match on_disk.remove(&asset.name) {
                    Some(actual) if actual == asset.size_bytes => EntryStatus::Ok,
                    Some(actual) => EntryStatus::SizeMismatch {
                        expected: asset.size_bytes,
                        actual,
                        recoverable,
                    },
                    None => EntryStatus::FileMissing { recoverable },
                };
                EntryReport {
                    name: asset.name.clone(),
                    status,
                }
            })
            .collect();

        Ok(ReconciliationReport {
            entries,
            orphans: on_disk.into_keys().collect(),
        })
    }

    /// Re-materializes the file for `name` from its embedded copy.
    /// A file that already matches its record is left alone.
    pub fn restore(&self, name: &str) -> Result<VideoAsset, StoreError> {
        let _write = self.write();
        let manifest = self.load()?;
        let asset = manifest
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        let on_disk = self.blobs.size(name);
        if on_disk == Some(asset.size_bytes) {
            return Ok(asset.without_data());
        }
        let unrecoverable = || match on_disk {
            Some(_) => StoreError::Unrecoverable(name.to_string()),
            None => StoreError::FileMissing(name.to_string()),
        };

        let bytes = match asset.decode_embedded() {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                warn!(video = name, error = %e, "Embedded copy is not valid base64");
                return Err(unrecoverable());
            }
            None => return Err(unrecoverable()),
        };
        self.blobs
            .write(name, &bytes)
            .map_err(|source| StoreError::WriteFailed {
                what: "video file",
                source,
            })?;

        info!(video = name, "Video restored from embedded copy");
        Ok(asset.without_data())
    }

    fn load(&self) -> Result<Manifest, StoreError> {
        manifest::load(&self.manifest_path).map_err(StoreError::ManifestCorrupt)
    }

    fn persist(&self, manifest: &Manifest) -> Result<(), StoreError> {
        manifest::save(&self.manifest_path, manifest).map_err(|source| StoreError::WriteFailed {
            what: "video manifest",
            source,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A name must be a plain file name inside the video directory.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let path = Path::new(name);
    let bare = path.file_name().is_some_and(|f| f == path.as_os_str());
    if name.trim().is_empty() || !bare || name.starts_with('.') {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
