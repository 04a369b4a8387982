use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::hotspot::{HotspotPhase, HotspotState};

/// Runtime status written by the shell sidecar to `<data dir>/HoloBridge/status.toml`.
/// The desktop shell reads this file (read-only) to display orchestrator state.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ShellStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub hotspot_phase: HotspotPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotspot_ssid: Option<String>,
    /// Human-readable reason the last hotspot start failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotspot_error: Option<String>,
    /// Name of the video flagged primary in the manifest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_video: Option<String>,
}

impl ShellStatus {
    /// Constructs the initial status on startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hotspot_phase: HotspotPhase::Inactive,
            hotspot_ssid: None,
            hotspot_error: None,
            primary_video: None,
        }
    }

    pub fn apply_hotspot(&mut self, state: &HotspotState) {
        self.hotspot_phase = state.phase;
        self.hotspot_ssid = state.ssid.clone();
        self.hotspot_error = state.last_error.clone();
    }
}

impl Default for ShellStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Failures are logged, never raised: a status write must not fail a command.
pub fn write_status(path: &Path, status: &ShellStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(dir = %parent.display(), error = %e, "Failed to create status directory");
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                warn!(error = %e, "Failed to write status file");
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize status"),
    }
}
