use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::store::{ReconciliationReport, VideoAssetStore};

/// Bursts of events (a copy in progress, a folder wipe) settle into one check.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Watches the video directory and reports drift from the manifest.
///
/// Runs a check at startup and after files are created or removed. Drift is
/// only logged; repair stays an explicit operation.
pub async fn watch_videos(store: Arc<VideoAssetStore>) {
    check(&store).await;

    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(64);
    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            warn!(error = %e, "Failed to create video directory watcher");
            return;
        }
    };

    let video_dir = store.video_dir().to_path_buf();
    if let Err(e) = std::fs::create_dir_all(&video_dir) {
        warn!(dir = %video_dir.display(), error = %e, "Failed to create video directory");
        return;
    }
    if let Err(e) = watcher.watch(&video_dir, RecursiveMode::NonRecursive) {
        warn!(dir = %video_dir.display(), error = %e, "Failed to watch video directory");
        return;
    }
    debug!(dir = %video_dir.display(), "Watching video directory");

    while let Some(event) = watch_rx.recv().await {
        if !is_membership_change(&event.kind) {
            continue;
        }
        tokio::time::sleep(SETTLE_DELAY).await;
        while watch_rx.try_recv().is_ok() {}
        check(&store).await;
    }
}

fn is_membership_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(notify::event::ModifyKind::Name(_))
    )
}

async fn check(store: &Arc<VideoAssetStore>) {
    let store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || store.reconcile()).await {
        Ok(Ok(report)) => log_report(&report),
        Ok(Err(e)) => warn!(error = %e, "Video reconciliation failed"),
        Err(e) => warn!(error = %e, "Video reconciliation task panicked"),
    }
}

fn log_report(report: &ReconciliationReport) {
    if !report.has_drift() {
        debug!(videos = report.entries.len(), "Video storage consistent");
        return;
    }
    for entry in report.drifted() {
        warn!(video = %entry.name, status = ?entry.status, "Manifest entry does not match its file");
    }
    for orphan in &report.orphans {
        warn!(file = %orphan, "Video file has no manifest entry");
    }
    info!(
        missing = report.missing().count(),
        mismatched = report.drifted().count() - report.missing().count(),
        orphans = report.orphans.len(),
        "Video storage drift detected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind, RenameMode};

    #[test]
    fn membership_changes_are_create_remove_and_rename() {
        assert!(is_membership_change(&EventKind::Create(CreateKind::File)));
        assert!(is_membership_change(&EventKind::Remove(RemoveKind::File)));
        assert!(is_membership_change(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_membership_change(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(!is_membership_change(&EventKind::Access(notify::event::AccessKind::Any)));
    }

    #[tokio::test]
    async fn watcher_survives_drift_and_stops_with_its_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(VideoAssetStore::open(dir.path()));
        store.save("a.mp4", b"abc").unwrap();
        std::fs::remove_file(store.video_dir().join("a.mp4")).unwrap();

        let task = tokio::spawn(watch_videos(Arc::clone(&store)));
        std::fs::write(store.video_dir().join("stray.mp4"), b"x").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!task.is_finished());
        task.abort();

        // Drift is reported, never repaired.
        let report = store.reconcile().unwrap();
        assert_eq!(report.orphans, vec!["stray.mp4".to_string()]);
        assert_eq!(report.missing().count(), 1);
    }
}
