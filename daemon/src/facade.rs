/// The command surface the desktop shell drives.
///
/// Every command resolves to a JSON value; failures come back as
/// `{success: false, error}` so nothing unstructured crosses the boundary.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use crate::hotspot::{HotspotManager, HotspotPhase};
use crate::net;
use crate::remote::HologramClient;
use crate::status::{self, ShellStatus};
use crate::store::{StoreError, VideoAssetStore};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "kebab-case")]
pub enum Command {
    StartHotspot {
        ssid: String,
        password: String,
    },
    StopHotspot,
    GetHotspotStatus,
    GetLocalIp,
    #[serde(rename_all = "camelCase")]
    SaveVideo {
        file_path: PathBuf,
        file_name: String,
    },
    #[serde(rename_all = "camelCase")]
    DeleteVideo {
        video_path: String,
    },
    SetPrimaryVideo {
        video: String,
    },
    PlayHologramVideo {
        video: String,
    },
    StopHologramVideo,
    GetHologramStatus,
    CheckAdmin,
    CheckHotspotSupport,
    ListVideos,
    GetPrimaryVideo,
    ReconcileVideos,
    RepairVideo {
        video: String,
    },
}

impl Command {
    /// Builds a command from its wire name and optional arguments.
    pub fn parse(name: &str, args: Option<Value>) -> Result<Self> {
        let args = args.filter(|a| !a.is_null() && a.as_object().map_or(true, |o| !o.is_empty()));
        let tagged = match args {
            Some(args) => json!({ "command": name, "args": args }),
            None => json!({ "command": name }),
        };
        serde_json::from_value(tagged).map_err(|e| anyhow!("Invalid command '{name}': {e}"))
    }
}

pub struct OrchestrationFacade {
    hotspot: Arc<HotspotManager>,
    store: Arc<VideoAssetStore>,
    hologram: HologramClient,
    status_path: PathBuf,
    status: Mutex<ShellStatus>,
}

impl OrchestrationFacade {
    pub fn new(
        hotspot: Arc<HotspotManager>,
        store: Arc<VideoAssetStore>,
        hologram: HologramClient,
        status_path: PathBuf,
    ) -> Self {
        Self {
            hotspot,
            store,
            hologram,
            status_path,
            status: Mutex::new(ShellStatus::new()),
        }
    }

    /// Runs `command`. Never fails: errors become `{success: false, error}`.
    pub async fn execute(&self, command: Command) -> Value {
        match self.dispatch(command).await {
            Ok(value) => value,
            Err(e) => failure(&e),
        }
    }

    /// Writes the initial status file, including the current primary video.
    pub async fn publish_initial_status(&self) {
        self.publish_primary().await;
        self.publish_hotspot();
    }

    /// Best-effort cleanup on exit: a running hotspot is torn down.
    pub async fn shutdown(&self) {
        if self.hotspot.state().phase == HotspotPhase::Active {
            match self.hotspot.stop().await {
                Ok(outcome) if outcome.success => info!("Hotspot stopped on shutdown"),
                Ok(outcome) => warn!(error = ?outcome.error, "Hotspot stop on shutdown failed"),
                Err(e) => warn!(error = %e, "Hotspot stop on shutdown skipped"),
            }
            self.publish_hotspot();
        }
    }

    async fn dispatch(&self, command: Command) -> Result<Value> {
        match command {
            Command::StartHotspot { ssid, password } => {
                let result = self.hotspot.start(&ssid, &password).await;
                self.publish_hotspot();
                result?;
                Ok(json!({ "success": true, "message": format!("Hotspot \"{ssid}\" started") }))
            }
            Command::StopHotspot => {
                let outcome = self.hotspot.stop().await;
                self.publish_hotspot();
                Ok(serde_json::to_value(outcome?)?)
            }
            Command::GetHotspotStatus => Ok(serde_json::to_value(self.hotspot.state())?),
            Command::GetLocalIp => Ok(Value::String(net::local_ip_string())),
            Command::CheckAdmin => Ok(json!({ "admin": self.hotspot.check_privilege().await })),
            Command::CheckHotspotSupport => {
                Ok(serde_json::to_value(self.hotspot.probe_capability().await)?)
            }

            Command::SaveVideo {
                file_path,
                file_name,
            } => {
                let bytes = tokio::fs::read(&file_path)
                    .await
                    .with_context(|| format!("Failed to read {}", file_path.display()))?;
                let asset = self
                    .with_store(move |store| store.save(&file_name, &bytes))
                    .await?;
                Ok(serde_json::to_value(asset.without_data())?)
            }
            Command::DeleteVideo { video_path } => {
                let name = video_name_from_path(&video_path)?;
                self.with_store(move |store| store.delete(&name)).await?;
                self.publish_primary().await;
                Ok(json!({ "success": true }))
            }
            Command::SetPrimaryVideo { video } => {
                self.with_store(move |store| store.set_primary(&video))
                    .await?;
                self.publish_primary().await;
                Ok(json!({ "success": true }))
            }
            Command::ListVideos => {
                let videos = self.with_store(|store| store.list()).await?;
                Ok(serde_json::to_value(videos)?)
            }
            Command::GetPrimaryVideo => {
                let primary = self.with_store(|store| store.primary()).await?;
                Ok(serde_json::to_value(primary)?)
            }
            Command::ReconcileVideos => {
                let report = self.with_store(|store| store.reconcile()).await?;
                Ok(serde_json::to_value(report)?)
            }
            Command::RepairVideo { video } => {
                let asset = self.with_store(move |store| store.restore(&video)).await?;
                Ok(serde_json::to_value(asset)?)
            }

            Command::PlayHologramVideo { video } => self.hologram.play(&video).await,
            Command::StopHologramVideo => self.hologram.stop().await,
            Command::GetHologramStatus => self.hologram.status().await,
        }
    }

    /// Store operations touch the filesystem; keep them off the async workers.
    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&VideoAssetStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || op(&store))
            .await
            .context("Storage task panicked")?;
        Ok(result?)
    }

    fn publish_hotspot(&self) {
        let state = self.hotspot.state();
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.apply_hotspot(&state);
        status::write_status(&self.status_path, &status);
    }

    async fn publish_primary(&self) {
        let primary = match self.with_store(|store| store.primary()).await {
            Ok(primary) => primary.map(|v| v.name),
            Err(e) => {
                warn!(error = %e, "Could not read primary video for status");
                return;
            }
        };
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.primary_video = primary;
        status::write_status(&self.status_path, &status);
    }
}

/// The shell passes full paths for deletion; the manifest is keyed by file name.
fn video_name_from_path(video_path: &str) -> Result<String> {
    Path::new(video_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("'{video_path}' does not name a video file"))
}

fn failure(error: &anyhow::Error) -> Value {
    json!({ "success": false, "error": error.to_string() })
}
