/// API route handlers.
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::Stream;
use serde::Deserialize;
use tracing::info;

use tubeproxy_downloader::progress::{track_progress, ProgressTracker};
use tubeproxy_downloader::transfer::bounded_chunks;
use tubeproxy_downloader::StreamBody;
use tubeproxy_shared::errors::ResolveError;
use tubeproxy_shared::models::{
    DownloadRequest, FormatListing, ResolvedVideo, StreamDescriptor, StreamTag, VideoInfo,
};

use crate::errors::{ApiError, PlainError};
use crate::AppState;

// ====== REQUEST TYPES ======

#[derive(Deserialize)]
pub struct VideoInfoBody {
    #[serde(default)]
    pub url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ====== METADATA ======

/// Validate the body and resolve its URL.
async fn resolve_body(
    state: &AppState,
    body: Result<Json<VideoInfoBody>, JsonRejection>,
) -> Result<(String, ResolvedVideo), ApiError> {
    let url = body
        .ok()
        .and_then(|Json(b)| non_empty(b.url))
        .ok_or_else(|| ApiError::InvalidInput("URL must not be empty".to_string()))?;

    let video = state
        .resolver
        .resolve(&url)
        .await
        .map_err(ApiError::resolution)?;
    Ok((url, video))
}

/// POST /api/get_video_info
pub async fn get_video_info(
    State(state): State<Arc<AppState>>,
    body: Result<Json<VideoInfoBody>, JsonRejection>,
) -> Result<Json<VideoInfo>, ApiError> {
    let (url, video) = resolve_body(&state, body).await?;

    let info = video.to_video_info(&state.container);
    info!(
        "Video info for {}: {} video / {} audio qualities",
        url,
        info.video_qualities.len(),
        info.audio_qualities.len()
    );
    Ok(Json(info))
}

/// POST /api/video-info - Single format list for the web frontend
pub async fn get_format_listing(
    State(state): State<Arc<AppState>>,
    body: Result<Json<VideoInfoBody>, JsonRejection>,
) -> Result<Json<FormatListing>, ApiError> {
    let (url, video) = resolve_body(&state, body).await?;

    let listing = video.to_format_listing();
    info!("Format listing for {}: {} formats", url, listing.formats.len());
    Ok(Json(listing))
}

// ====== DOWNLOAD ======

/// Resolve `url` again and open the stream tagged `tag`.
async fn open_stream(
    state: &AppState,
    url: &str,
    tag: &StreamTag,
) -> Result<(StreamDescriptor, StreamBody), ApiError> {
    let video = state.resolver.resolve(url).await.map_err(ApiError::transfer)?;
    let stream = video
        .find_stream(tag)
        .cloned()
        .ok_or_else(|| ApiError::transfer(ResolveError::UnknownStream(tag.to_string())))?;
    let body = state.resolver.open(&stream).await.map_err(ApiError::transfer)?;
    Ok((stream, body))
}

/// GET /download - Relay one stream variant to the client
pub async fn download(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DownloadRequest>, QueryRejection>,
) -> Result<Response, PlainError> {
    let request = query.map(|Query(q)| q).unwrap_or_default();
    let url = non_empty(request.url);
    let tag = request.itag.as_deref().and_then(StreamTag::parse);
    let (url, tag) = match (url, tag) {
        (Some(url), Some(tag)) => (url, tag),
        _ => return Err(ApiError::InvalidInput("URL and itag are required.".to_string()).into()),
    };

    let publisher = non_empty(request.progress_id).map(|id| state.progress.publisher(&id));
    let label = format!("itag {}", tag);

    let (stream, body) = match open_stream(&state, &url, &tag).await {
        Ok(opened) => opened,
        Err(e) => {
            if let Some(p) = &publisher {
                p.publish(ProgressTracker::new(label, None).fail(e.to_string()));
            }
            return Err(e.into());
        }
    };

    let total = body.content_length.or(stream.filesize);
    let relay = track_progress(
        bounded_chunks(body.stream, state.chunk_size),
        ProgressTracker::new(label, total),
        publisher,
    );

    info!(
        "Streaming itag {} ({}) as \"{}\", {:?} bytes",
        tag, stream.mime_type, stream.filename, total
    );

    let disposition = format!("attachment; filename=\"{}\"", stream.filename.replace('"', "_"));
    let mut response = Response::new(Body::from_stream(relay));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&stream.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    if let Some(length) = body.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok(response)
}

/// GET /download/progress/:id - Server-sent progress events for one download
pub async fn download_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = state.progress.subscribe(&id);
    let events = futures::stream::unfold(Some(subscription), |subscription| async move {
        let mut subscription = subscription?;
        let event = subscription.recv().await?;
        let next = if event.is_final() { None } else { Some(subscription) };
        Some((Event::default().json_data(&event), next))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

// ====== HEALTH ======

/// GET /api/health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
