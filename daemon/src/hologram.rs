/// HTTP control plane of the hologram device.
///
/// Routes (JSON in, JSON out, every response carries an explicit status):
///   GET  /api/status  → `{status: "online", device, currentVideo}`
///   POST /api/play    → `{success: true, video}` | 400 | 404 `{error}`
///   POST /api/stop    → `{success: true}` (idempotent)
use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::supervisor::{PlaybackError, PlaybackTarget, ProcessSupervisor};

pub const VIDEO_NOT_FOUND: &str = "Video file not found";

#[derive(Debug, Default, Deserialize)]
pub struct PlayRequest {
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default, rename = "loop")]
    pub looped: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub status: &'static str,
    pub device: String,
    pub current_video: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

/// Why a play request was not honoured, mapped onto an HTTP status.
#[derive(Debug)]
pub enum PlayRejection {
    MissingVideo,
    NotFound,
    Failed(String),
}

impl PlayRejection {
    fn status_code(&self) -> StatusCode {
        match self {
            PlayRejection::MissingVideo => StatusCode::BAD_REQUEST,
            PlayRejection::NotFound => StatusCode::NOT_FOUND,
            PlayRejection::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            PlayRejection::MissingVideo => "Video name is required".to_string(),
            PlayRejection::NotFound => VIDEO_NOT_FOUND.to_string(),
            PlayRejection::Failed(reason) => reason.clone(),
        }
    }
}

pub struct HologramControlService {
    supervisor: Arc<ProcessSupervisor>,
    device: String,
}

impl HologramControlService {
    pub fn new(supervisor: Arc<ProcessSupervisor>, device: impl Into<String>) -> Self {
        Self {
            supervisor,
            device: device.into(),
        }
    }

    /// Reports what is playing without touching the process.
    pub fn status(&self) -> DeviceStatus {
        let snapshot = self.supervisor.snapshot();
        DeviceStatus {
            status: "online",
            device: self.device.clone(),
            current_video: snapshot.as_ref().map(|s| s.target.video_name.clone()),
            started_at: snapshot.map(|s| s.started_at.to_rfc3339()),
        }
    }

    pub async fn play(&self, request: PlayRequest) -> Result<String, PlayRejection> {
        let video = request
            .video
            .filter(|v| !v.trim().is_empty())
            .ok_or(PlayRejection::MissingVideo)?;
        let target = PlaybackTarget {
            video_name: video.clone(),
            looped: request.looped.unwrap_or(false),
        };
        if let Some(previous) = self.supervisor.current_target() {
            info!(previous = %previous.video_name, next = %video, "Replacing playback");
        }
        match self.supervisor.start(target).await {
            Ok(()) => Ok(video),
            Err(PlaybackError::VideoFileNotFound { name }) => {
                warn!(video = %name, "Play request for unknown video");
                Err(PlayRejection::NotFound)
            }
            Err(e) => Err(PlayRejection::Failed(e.to_string())),
        }
    }

    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }
}

pub fn router(service: Arc<HologramControlService>) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/play", post(play_handler))
        .route("/api/stop", post(stop_handler))
        .with_state(service)
}

/// Binds `0.0.0.0:<port>` and serves until `shutdown` resolves.
pub async fn serve(
    service: Arc<HologramControlService>,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!(port, "Hologram control plane listening");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn status_handler(State(service): State<Arc<HologramControlService>>) -> Json<DeviceStatus> {
    Json(service.status())
}

async fn play_handler(
    State(service): State<Arc<HologramControlService>>,
    body: Result<Json<PlayRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    match service.play(request).await {
        Ok(video) => (StatusCode::OK, Json(json!({ "success": true, "video": video }))).into_response(),
        Err(rejection) => error_response(rejection.status_code(), &rejection.message()),
    }
}

async fn stop_handler(State(service): State<Arc<HologramControlService>>) -> Response {
    service.stop().await;
    (StatusCode::OK, Json(json!({ "success": true }))).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
