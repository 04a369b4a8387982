use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;
/// Windows hosted networks hand out addresses on 192.168.137.0/24.
pub const DEFAULT_HOLOGRAM_HOST: &str = "192.168.137.2";
pub const DEFAULT_HOLOGRAM_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_PLAYER_PROGRAM: &str = "vlc";

/// Root configuration structure. Deserialized from `<data dir>/HoloBridge/config.toml`.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub hotspot: HotspotConfig,
    #[serde(default)]
    pub hologram: HologramConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HotspotConfig {
    /// Upper bound on any single `netsh` invocation.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for HotspotConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

impl HotspotConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

/// Where the hologram device can be reached, and the port `serve` listens on.
#[derive(Debug, Deserialize, Clone)]
pub struct HologramConfig {
    #[serde(default = "default_hologram_host")]
    pub host: String,
    #[serde(default = "default_hologram_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for HologramConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOLOGRAM_HOST.to_string(),
            port: DEFAULT_HOLOGRAM_PORT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl HologramConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Playback settings used on the hologram device.
#[derive(Debug, Deserialize, Clone)]
pub struct PlayerConfig {
    /// Executable of the external media player (VLC-compatible flags).
    #[serde(default = "default_player_program")]
    pub program: String,
    /// Directory that play requests resolve video names against.
    /// `%VAR%` references are expanded at runtime.
    #[serde(default = "default_video_dir")]
    pub video_dir: String,
    /// Name reported by `/api/status`. Empty means "use the host name".
    #[serde(default)]
    pub device_name: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PLAYER_PROGRAM.to_string(),
            video_dir: default_video_dir(),
            device_name: String::new(),
        }
    }
}

impl PlayerConfig {
    pub fn video_dir(&self) -> PathBuf {
        PathBuf::from(paths::expand_env(&self.video_dir))
    }

    /// Returns the configured device name, falling back to the OS host name.
    pub fn effective_device_name(&self) -> String {
        if !self.device_name.trim().is_empty() {
            return self.device_name.clone();
        }
        sysinfo::System::host_name().unwrap_or_else(|| "hologram".to_string())
    }
}

/// Location of the video manifest and uploaded files.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

impl StorageConfig {
    pub fn dir(&self) -> PathBuf {
        PathBuf::from(paths::expand_env(&self.dir))
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_hologram_host() -> String {
    DEFAULT_HOLOGRAM_HOST.to_string()
}

fn default_hologram_port() -> u16 {
    DEFAULT_HOLOGRAM_PORT
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_player_program() -> String {
    DEFAULT_PLAYER_PROGRAM.to_string()
}

fn default_video_dir() -> String {
    paths::app_data_dir()
        .join("videos")
        .to_string_lossy()
        .into_owned()
}

fn default_storage_dir() -> String {
    paths::app_data_dir().to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn default_values() {
        let c = Config::default();
        assert_eq!(c.hotspot.command_timeout_secs, DEFAULT_COMMAND_TIMEOUT_SECS);
        assert_eq!(c.hologram.host, DEFAULT_HOLOGRAM_HOST);
        assert_eq!(c.hologram.port, 8080);
        assert_eq!(c.player.program, DEFAULT_PLAYER_PROGRAM);
        assert!(c.player.device_name.is_empty());
        assert!(c.storage.dir().ends_with("HoloBridge"));
    }

    #[test]
    fn base_url_combines_host_and_port() {
        let h = HologramConfig {
            host: "10.0.0.7".to_string(),
            port: 9000,
            request_timeout_secs: 1,
        };
        assert_eq!(h.base_url(), "http://10.0.0.7:9000");
    }

    #[test]
    fn zero_timeouts_are_raised_to_one_second() {
        let h = HotspotConfig { command_timeout_secs: 0 };
        assert_eq!(h.command_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn effective_device_name_prefers_configured_value() {
        let p = PlayerConfig {
            device_name: "Lobby Fan".to_string(),
            ..PlayerConfig::default()
        };
        assert_eq!(p.effective_device_name(), "Lobby Fan");
    }

    #[test]
    fn effective_device_name_falls_back_when_blank() {
        let p = PlayerConfig {
            device_name: "   ".to_string(),
            ..PlayerConfig::default()
        };
        assert!(!p.effective_device_name().trim().is_empty());
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config.hologram.port, DEFAULT_HOLOGRAM_PORT);
    }

    #[test]
    fn load_or_default_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[hotspot]
command_timeout_secs = 20

[hologram]
host = "192.168.137.50"
port = 8181

[player]
program = "/usr/bin/cvlc"
video_dir = "/srv/videos"
device_name = "Fan 1"

[storage]
dir = "/srv/holobridge"
"#,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.hotspot.command_timeout_secs, 20);
        assert_eq!(config.hologram.host, "192.168.137.50");
        assert_eq!(config.hologram.port, 8181);
        assert_eq!(config.player.program, "/usr/bin/cvlc");
        assert_eq!(config.player.video_dir(), PathBuf::from("/srv/videos"));
        assert_eq!(config.player.device_name, "Fan 1");
        assert_eq!(config.storage.dir(), PathBuf::from("/srv/holobridge"));
    }

    #[test]
    fn load_or_default_partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[hologram]\nport = 9090\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.hologram.port, 9090);
        assert_eq!(config.hologram.host, DEFAULT_HOLOGRAM_HOST);
        assert_eq!(config.hologram.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.player.program, DEFAULT_PLAYER_PROGRAM);
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }
}
