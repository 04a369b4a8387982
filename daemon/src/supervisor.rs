/// Supervision of the single external playback process.
///
/// At most one player runs at a time. Every `start` replaces whatever is
/// playing; the old process is always terminated before the new one is
/// launched. Each launched process gets a watcher task that reacts to the
/// process exiting on its own by clearing the live slot, tagged with a
/// generation number so a late exit can never clear a newer process.
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{CommandError, CommandRunner, CommandSpec, ProcessHandle};

/// How long a terminated player's watcher may take to acknowledge.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// What should be playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackTarget {
    pub video_name: String,
    pub looped: bool,
}

/// Read-only view of the live process for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub target: PlaybackTarget,
    pub pid: Option<u32>,
    pub started_at: DateTime<Local>,
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Video file not found: {name}")]
    VideoFileNotFound { name: String },

    #[error("Failed to launch the player: {0}")]
    ProcessSpawnFailed(#[source] CommandError),
}

struct SupervisedProcess {
    generation: u64,
    target: PlaybackTarget,
    pid: Option<u32>,
    started_at: DateTime<Local>,
    /// Firing (or dropping) this makes the watcher kill the process.
    stop_tx: oneshot::Sender<()>,
    watcher: JoinHandle<()>,
}

type LiveSlot = Arc<Mutex<Option<SupervisedProcess>>>;

pub struct ProcessSupervisor {
    runner: Arc<dyn CommandRunner>,
    program: String,
    video_dir: PathBuf,
    live: LiveSlot,
    /// Serializes start/stop so "read current, terminate, spawn, install" is
    /// one critical section. `live` itself is only ever locked briefly.
    ops: tokio::sync::Mutex<()>,
    next_generation: AtomicU64,
}

impl ProcessSupervisor {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>, video_dir: PathBuf) -> Self {
        Self {
            runner,
            program: program.into(),
            video_dir,
            live: Arc::new(Mutex::new(None)),
            ops: tokio::sync::Mutex::new(()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn video_dir(&self) -> &Path {
        &self.video_dir
    }

    /// Replaces whatever is playing with `target`.
    pub async fn start(&self, target: PlaybackTarget) -> Result<(), PlaybackError> {
        let _op = self.ops.lock().await;

        if let Some(previous) = self.take_live() {
            terminate(previous).await;
        }

        let path = self
            .resolve(&target.video_name)
            .ok_or_else(|| PlaybackError::VideoFileNotFound {
                name: target.video_name.clone(),
            })?;

        let spec = self.player_command(&target, &path);
        let handle = self.runner.spawn(&spec).map_err(|e| {
            warn!(error = %e, "Player launch failed");
            PlaybackError::ProcessSpawnFailed(e)
        })?;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let pid = handle.id();
        let (stop_tx, stop_rx) = oneshot::channel();
        {
            // Install under the lock so a watcher that sees an instant exit
            // finds this record rather than racing ahead of it.
            let mut live = lock(&self.live);
            let watcher = tokio::spawn(watch_process(
                handle,
                stop_rx,
                generation,
                Arc::clone(&self.live),
                target.video_name.clone(),
            ));
            *live = Some(SupervisedProcess {
                generation,
                target: target.clone(),
                pid,
                started_at: Local::now(),
                stop_tx,
                watcher,
            });
        }

        info!(video = %target.video_name, looped = target.looped, ?pid, "Playback started");
        Ok(())
    }

    /// Terminates the live process, if any. Stopping nothing is not an error.
    pub async fn stop(&self) {
        let _op = self.ops.lock().await;
        match self.take_live() {
            Some(process) => terminate(process).await,
            None => debug!("Stop requested with nothing playing"),
        }
    }

    pub fn current_target(&self) -> Option<PlaybackTarget> {
        lock(&self.live).as_ref().map(|p| p.target.clone())
    }

    pub fn snapshot(&self) -> Option<PlaybackSnapshot> {
        lock(&self.live).as_ref().map(|p| PlaybackSnapshot {
            target: p.target.clone(),
            pid: p.pid,
            started_at: p.started_at,
        })
    }

    /// Maps a video name onto a file in the video directory. Anything that is
    /// not a bare file name can never name a library file.
    pub fn resolve(&self, video_name: &str) -> Option<PathBuf> {
        let candidate = Path::new(video_name);
        if video_name.is_empty() || candidate.file_name()? != candidate.as_os_str() {
            return None;
        }
        let path = self.video_dir.join(candidate);
        path.is_file().then_some(path)
    }

    /// Fullscreen, muted, always on top; loops or exits after one pass.
    pub fn player_command(&self, target: &PlaybackTarget, path: &Path) -> CommandSpec {
        let mut args = vec![
            "--fullscreen".to_string(),
            "--no-audio".to_string(),
            "--video-on-top".to_string(),
            "--no-video-title-show".to_string(),
        ];
        args.push(if target.looped { "--loop" } else { "--play-and-exit" }.to_string());
        args.push(path.to_string_lossy().into_owned());
        CommandSpec::new(self.program.clone(), args)
    }

    fn take_live(&self) -> Option<SupervisedProcess> {
        lock(&self.live).take()
    }
}

fn lock(slot: &Mutex<Option<SupervisedProcess>>) -> MutexGuard<'_, Option<SupervisedProcess>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Signals the watcher to kill the process and waits for it to finish.
/// Failures are logged only: they must not block the next playback.
async fn terminate(process: SupervisedProcess) {
    let video = process.target.video_name;
    let _ = process.stop_tx.send(());
    match tokio::time::timeout(TERMINATE_GRACE, process.watcher).await {
        Ok(Ok(())) => info!(%video, "Playback stopped"),
        Ok(Err(e)) => warn!(%video, error = %e, "Player watcher failed"),
        Err(_) => warn!(%video, "Player did not stop within {}s", TERMINATE_GRACE.as_secs()),
    }
}

async fn watch_process(
    mut handle: Box<dyn ProcessHandle>,
    mut stop_rx: oneshot::Receiver<()>,
    generation: u64,
    live: LiveSlot,
    video: String,
) {
    let exited = tokio::select! {
        result = handle.wait() => Some(result),
        _ = &mut stop_rx => None,
    };

    match exited {
        None => {
            if let Err(e) = handle.kill().await {
                warn!(%video, error = %e, "Failed to kill player");
            }
        }
        Some(result) => {
            match result {
                Ok(report) if report.success() => info!(%video, "Player exited"),
                Ok(report) => warn!(%video, code = ?report.code, "Player exited abnormally"),
                Err(e) => warn!(%video, error = %e, "Lost track of player process"),
            }
            let mut live = lock(&live);
            if live.as_ref().is_some_and(|p| p.generation == generation) {
                *live = None;
            }
        }
    }
}
