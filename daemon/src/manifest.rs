/// The video manifest: `video-storage.json`.
///
/// `{ "videos": [ { "name", "size", "path", "isPrimary", "data"? } ] }`
///
/// `data` is a base64 duplicate of the file, kept as a recovery source only.
/// The manifest is always rewritten whole via temp file + rename, so a crash
/// mid-write leaves either the old or the new manifest, never a mix.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAsset {
    pub name: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(rename = "path")]
    pub relative_path: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, rename = "data", skip_serializing_if = "Option::is_none")]
    pub embedded_data: Option<String>,
}

impl VideoAsset {
    /// Builds the record for freshly stored `bytes`, embedding a copy.
    pub fn for_upload(name: &str, relative_path: String, bytes: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            size_bytes: bytes.len() as u64,
            relative_path,
            is_primary: false,
            embedded_data: Some(STANDARD.encode(bytes)),
        }
    }

    /// The record without its embedded copy, for listings and IPC replies.
    pub fn without_data(&self) -> Self {
        Self {
            embedded_data: None,
            ..self.clone()
        }
    }

    /// Decodes the embedded copy. `None` when there is nothing to recover from.
    pub fn decode_embedded(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        self.embedded_data.as_deref().map(|data| STANDARD.decode(data))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub videos: Vec<VideoAsset>,
}

impl Manifest {
    pub fn get(&self, name: &str) -> Option<&VideoAsset> {
        self.videos.iter().find(|v| v.name == name)
    }

    pub fn primary(&self) -> Option<&VideoAsset> {
        self.videos.iter().find(|v| v.is_primary)
    }

    /// Inserts `asset`, or replaces the record with the same name in place.
    /// A replaced record keeps its primary flag.
    pub fn upsert(&mut self, mut asset: VideoAsset) -> &VideoAsset {
        match self.videos.iter().position(|v| v.name == asset.name) {
            Some(index) => {
                asset.is_primary = self.videos[index].is_primary;
                self.videos[index] = asset;
                &self.videos[index]
            }
            None => {
                self.videos.push(asset);
                &self.videos[self.videos.len() - 1]
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<VideoAsset> {
        let index = self.videos.iter().position(|v| v.name == name)?;
        Some(self.videos.remove(index))
    }

    /// Makes `name` the only primary asset. Returns `false` if it is unknown,
    /// in which case nothing changes.
    pub fn set_primary(&mut self, name: &str) -> bool {
        if self.get(name).is_none() {
            return false;
        }
        for video in &mut self.videos {
            video.is_primary = video.name == name;
        }
        true
    }
}

/// Reads the manifest at `path`. A missing file is an empty manifest.
pub fn load(path: &Path) -> io::Result<Manifest> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Manifest::default()),
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Writes `manifest` to `path` atomically.
pub fn save(path: &Path, manifest: &Manifest) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_vec_pretty(manifest)?;
    let tmp = temp_path(path);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&content)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
