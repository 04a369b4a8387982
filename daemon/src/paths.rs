/// Canonical file paths for HoloBridge data files.
///
/// Everything lives under `<data dir>/HoloBridge/`:
///   - config.toml         Written by the desktop shell, read by the daemon.
///   - status.toml         Written by the daemon, read by the desktop shell.
///   - video-storage.json  The video manifest (see `manifest`).
///   - videos/             Uploaded video files.
///   - logs/               Daemon log files.
use std::path::PathBuf;

const APP_DIR_NAME: &str = "HoloBridge";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";
pub const LOG_DIR_NAME: &str = "logs";
pub const LOG_FILE_NAME: &str = "holobridge.log";

/// Returns the HoloBridge application data directory.
///
/// Falls back to the working directory when the platform reports no data dir
/// (e.g. a stripped-down service account).
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Returns the full path to the config file.
pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

/// Returns the full path to the status file.
pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}

pub fn log_dir() -> PathBuf {
    app_data_dir().join(LOG_DIR_NAME)
}

/// Expands `%VAR%`-style environment references embedded in configured paths.
/// Unknown variables are left intact.
pub fn expand_env(s: &str) -> String {
    let mut result = s.to_string();
    for var in &["USERPROFILE", "APPDATA", "LOCALAPPDATA", "HOME", "TEMP", "TMP"] {
        if let Ok(val) = std::env::var(var) {
            result = result.replace(&format!("%{var}%"), &val);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_holobridge() {
        let dir = app_data_dir();
        assert_eq!(dir.file_name().unwrap(), "HoloBridge");
    }

    #[test]
    fn config_file_path_has_correct_name() {
        let path = config_file_path();
        assert_eq!(path.file_name().unwrap(), CONFIG_FILE_NAME);
    }

    #[test]
    fn status_file_path_has_correct_name() {
        let path = status_file_path();
        assert_eq!(path.file_name().unwrap(), STATUS_FILE_NAME);
    }

    #[test]
    fn config_status_and_logs_share_same_parent_dir() {
        let config = config_file_path();
        let status = status_file_path();
        assert_eq!(config.parent(), status.parent());
        assert_eq!(log_dir().parent(), config.parent());
    }

    #[test]
    fn expand_env_replaces_known_variable() {
        std::env::set_var("LOCALAPPDATA", "/var/lib/local");
        assert_eq!(expand_env("%LOCALAPPDATA%/holo"), "/var/lib/local/holo");
    }

    #[test]
    fn expand_env_leaves_unknown_vars_intact() {
        let result = expand_env(r"%UNKNOWN_VAR%\path");
        assert_eq!(result, r"%UNKNOWN_VAR%\path");
    }
}
