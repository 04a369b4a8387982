mod blobs;
mod command;
mod config;
mod facade;
mod hologram;
mod hotspot;
mod ipc;
mod logging;
mod manifest;
mod net;
mod paths;
mod remote;
mod status;
mod store;
mod supervisor;
mod watcher;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info, warn};

use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::Config;
use crate::facade::OrchestrationFacade;
use crate::hologram::HologramControlService;
use crate::hotspot::HotspotManager;
use crate::remote::HologramClient;
use crate::store::VideoAssetStore;
use crate::supervisor::ProcessSupervisor;

#[derive(Debug, Parser)]
#[command(name = "holobridge", version, about = "Hotspot, video storage and hologram playback orchestration")]
struct Cli {
    /// Config file to use instead of `<data dir>/HoloBridge/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Serve the desktop shell over stdin/stdout (default).
    Shell,
    /// Run the hologram device's HTTP control plane.
    Serve {
        /// Listen port; defaults to `hologram.port` from the config.
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = paths::app_data_dir();
    if let Err(e) = std::fs::create_dir_all(&app_dir) {
        eprintln!("Failed to create app data directory {}: {e}", app_dir.display());
        std::process::exit(1);
    }

    // ── Logging ───────────────────────────────────────────────────────────────
    let _log_guard = match logging::init_logging(&paths::log_dir(), paths::LOG_FILE_NAME) {
        Ok(guard) => guard,
        Err(e) => {
            let guard = logging::init_stderr_logging();
            warn!(error = %e, "File logging unavailable");
            guard
        }
    };

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(paths::config_file_path);
    let config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        warn!(error = %format!("{e:#}"), "Config unreadable, using defaults");
        Config::default()
    });

    info!(version = env!("CARGO_PKG_VERSION"), "holobridge started");

    let result = match cli.mode.unwrap_or(Mode::Shell) {
        Mode::Shell => run_shell(config).await,
        Mode::Serve { port } => run_serve(config, port).await,
    };
    if let Err(e) = result {
        error!(error = %format!("{e:#}"), "Exiting after fatal error");
        std::process::exit(1);
    }
    info!("holobridge stopped");
}

async fn run_shell(config: Config) -> Result<()> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
    let hotspot = Arc::new(HotspotManager::new(
        runner,
        config.hotspot.command_timeout(),
    ));
    let store = Arc::new(VideoAssetStore::open(&config.storage.dir()));
    info!(manifest = %store.manifest_path().display(), "Video storage opened");
    let client = HologramClient::new(&config.hologram)?;
    info!(device = client.base_url(), "Hologram device configured");

    let facade = Arc::new(OrchestrationFacade::new(
        hotspot,
        Arc::clone(&store),
        client,
        paths::status_file_path(),
    ));
    facade.publish_initial_status().await;

    let watcher = tokio::spawn(watcher::watch_videos(store));

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        result = ipc::run(Arc::clone(&facade), stdin, stdout) => {
            if let Err(e) = result {
                warn!(error = %e, "IPC loop ended with an error");
            }
            info!("Input closed");
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    watcher.abort();
    facade.shutdown().await;
    Ok(())
}

async fn run_serve(config: Config, port: Option<u16>) -> Result<()> {
    let video_dir = config.player.video_dir();
    std::fs::create_dir_all(&video_dir)
        .with_context(|| format!("Failed to create video directory {}", video_dir.display()))?;

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
    let supervisor = Arc::new(ProcessSupervisor::new(
        runner,
        config.player.program.clone(),
        video_dir,
    ));
    let device = config.player.effective_device_name();
    info!(device = %device, dir = %supervisor.video_dir().display(), "Hologram device ready");
    let service = Arc::new(HologramControlService::new(Arc::clone(&supervisor), device));

    let port = port.unwrap_or(config.hologram.port);
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
        }
    };
    let result = hologram::serve(service, port, shutdown).await;

    supervisor.stop().await;
    result
}
