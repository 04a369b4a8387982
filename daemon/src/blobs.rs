/// Name-addressed video files on disk.
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// In-progress writes use this prefix and never show up in listings.
const PARTIAL_PREFIX: &str = ".partial-";

pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Writes `bytes` under `name`, replacing any previous content atomically.
    pub fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let partial = self.dir.join(format!("{PARTIAL_PREFIX}{name}"));
        std::fs::write(&partial, bytes)?;
        std::fs::rename(&partial, self.path_for(name)).inspect_err(|_| {
            let _ = std::fs::remove_file(&partial);
        })
    }

    /// Removes `name`. Returns `false` when there was nothing to remove.
    pub fn remove(&self, name: &str) -> io::Result<bool> {
        match std::fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Length of the stored file, or `None` when there is none.
    pub fn size(&self, name: &str) -> Option<u64> {
        std::fs::metadata(self.path_for(name))
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }

    /// All stored files with their lengths. A missing directory holds nothing.
    pub fn list(&self) -> io::Result<BTreeMap<String, u64>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e),
        };
        let mut files = BTreeMap::new();
        for entry in entries {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(PARTIAL_PREFIX) {
                files.insert(name, metadata.len());
            }
        }
        Ok(files)
    }
}
