//! Endpoints of HTTP server.
//!
use std::{convert::Infallible, path::Path, path::PathBuf, sync::Arc};

use axum::{
    body::StreamBody,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{get, post},
    Extension, Json, Router,
};
use bytes::Bytes;
use common::protocol::UiState;
use futures::{future::ready, Stream, StreamExt};
use tokio_stream::wrappers::WatchStream;

use crate::{
    acquirer::FrameSlot,
    page::{INDEX_HTML, SERVICE_WORKER_JS},
    session::{Detector, StartOutcome},
};

/// Files served next to the page.
#[derive(Clone, Debug, Default)]
pub struct PageAssets {
    pub sound_file: Option<PathBuf>,
}

/// Build the HTTP router.
pub fn router(detector: Arc<Detector>, assets: Arc<PageAssets>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/start", post(start))
        .route("/events", get(events))
        .route("/state", get(state))
        .route("/video", get(video_stream))
        .route("/audio/feedback", get(feedback_sound))
        .route("/service-worker.js", get(service_worker))
        .route("/healthcheck", get(healthcheck))
        .layer(Extension(detector))
        .layer(Extension(assets))
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn service_worker() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        SERVICE_WORKER_JS,
    )
}

/// Start action of the page button.
pub async fn start(Extension(detector): Extension<Arc<Detector>>) -> (StatusCode, Json<StartOutcome>) {
    log::info!("Start requested");
    (StatusCode::ACCEPTED, Json(detector.start().await))
}

/// Snapshot of the UI state.
pub async fn state(Extension(detector): Extension<Arc<Detector>>) -> Json<UiState> {
    Json(detector.ui().snapshot())
}

/// Stream every UI state change as server-sent event.
pub async fn events(
    Extension(detector): Extension<Arc<Detector>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    log::debug!("UI event stream requested");
    let stream = WatchStream::new(detector.ui().subscribe())
        .map(|state| Event::default().json_data(state).map_err(axum::Error::new));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Preview of the display surface as multipart JPEG stream.
pub async fn video_stream(Extension(detector): Extension<Arc<Detector>>) -> Response {
    let frames = match detector.frames().await {
        Some(frames) => frames,
        None => return (StatusCode::SERVICE_UNAVAILABLE, "no camera stream").into_response(),
    };
    log::info!("Video stream requested");

    let stream = WatchStream::new(frames)
        .take_while(|slot| ready(*slot != FrameSlot::Ended))
        .filter_map(|slot| {
            ready(match slot {
                FrameSlot::Frame(data) => Some(Ok::<_, Infallible>(as_jpeg_stream_item(&data))),
                _ => None,
            })
        });

    // Set body and headers for multipart streaming
    let body = StreamBody::new(stream);
    let headers = [(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame",
    )];

    (headers, body).into_response()
}

/// Feedback sound, missing sounds make the page fall back to a beep.
pub async fn feedback_sound(Extension(assets): Extension<Arc<PageAssets>>) -> Response {
    let path = match &assets.sound_file {
        Some(path) => path,
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    match tokio::fs::read(path).await {
        Ok(data) => ([(header::CONTENT_TYPE, sound_content_type(path))], data).into_response(),
        Err(err) => {
            log::warn!("Could not read sound file {}: {}", path.display(), err);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn sound_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

pub fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            data,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}
