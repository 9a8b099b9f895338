//! Object storage proxy endpoints: recording listings, audio streaming,
//! assistant config blobs, and speaker enrollment.

use crate::bus::publish_message;
use crate::storage::{BlobEntry, StorageError};
use crate::AppState;
use axum::{
    body::Body,
    extract::{Extension, Multipart, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Query parameters for `GET /api/files`.
#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    #[serde(default)]
    pub prefix: String,
}

/// Response wrapper for the file listing.
#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<BlobEntry>,
}

/// Handler for `GET /api/files`: lists objects in the recordings bucket,
/// newest first.
pub async fn get_files_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<FilesQuery>,
) -> Result<Json<FilesResponse>, Response> {
    let files = state
        .blobs
        .list(&params.prefix)
        .await
        .map_err(storage_error_response)?;
    Ok(Json(FilesResponse { files }))
}

/// Handler for `GET /api/files/stream/{key}`.
///
/// Proxies the audio body through the server so the browser never needs
/// direct network access to the storage endpoint.
pub async fn stream_file_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, Response> {
    let upstream = state
        .blobs
        .get_stream(&key)
        .await
        .map_err(storage_error_response)?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("audio/wav")
        .to_string();

    let body = Body::from_stream(upstream.bytes_stream());
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Maps the public config file id to its object key. The set is fixed;
/// anything else is a client error.
fn config_object_key(file_id: &str) -> Option<&'static str> {
    match file_id {
        "tools" => Some("tools.json"),
        "vocab" => Some("vocabulary.json"),
        "cache" => Some("tool_cache.json"),
        _ => None,
    }
}

/// Handler for `GET /api/config/{file_id}`: reads a JSON config blob.
/// A blob that does not exist yet reads as an empty object.
pub async fn read_config_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<serde_json::Value>, Response> {
    let key = config_object_key(&file_id).ok_or_else(|| invalid_config_id(&file_id))?;

    let content = state
        .blobs
        .get_json(key)
        .await
        .map_err(storage_error_response)?
        .unwrap_or_else(|| serde_json::json!({}));

    Ok(Json(serde_json::json!({ "data": content })))
}

/// Request body for `POST /api/config/{file_id}`.
#[derive(Debug, Deserialize)]
pub struct ConfigWriteRequest {
    pub data: serde_json::Value,
}

/// Handler for `POST /api/config/{file_id}`: writes a JSON config blob
/// back to the bucket.
pub async fn write_config_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(file_id): Path<String>,
    Json(payload): Json<ConfigWriteRequest>,
) -> Result<Json<serde_json::Value>, Response> {
    let key = config_object_key(&file_id).ok_or_else(|| invalid_config_id(&file_id))?;

    state
        .blobs
        .put_json(key, &payload.data)
        .await
        .map_err(storage_error_response)?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "message": format!("{key} saved"),
    })))
}

/// Handler for `POST /api/speaker/upload`.
///
/// Accepts a multipart form with a `speaker_id` field and a recorded
/// sample file; stores the sample under the speaker's enrollment prefix.
pub async fn upload_speaker_sample_handler(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, Response> {
    let mut speaker_id: Option<String> = None;
    let mut sample: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("speaker_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("unreadable speaker_id: {e}")))?;
                speaker_id = Some(value);
            }
            Some("file") => {
                let filename = field
                    .file_name()
                    .unwrap_or("sample.wav")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("unreadable file field: {e}")))?;
                sample = Some((filename, bytes.to_vec()));
            }
            _ => continue,
        }
    }

    let speaker_id = speaker_id.ok_or_else(|| bad_request("missing speaker_id".to_string()))?;
    let (filename, bytes) = sample.ok_or_else(|| bad_request("missing file".to_string()))?;

    let key = format!("enrollment/{speaker_id}/{filename}");
    state
        .blobs
        .put_bytes(&key, bytes, "audio/wav")
        .await
        .map_err(storage_error_response)?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "filename": key,
    })))
}

/// Request body for `POST /api/speaker/enroll`.
#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub speaker_id: String,
    pub filenames: Vec<String>,
}

/// Handler for `POST /api/speaker/enroll`.
///
/// Publishes an enrollment trigger onto the bus so the training service
/// picks up the uploaded samples.
pub async fn enroll_speaker_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<EnrollRequest>,
) -> Result<Json<serde_json::Value>, Response> {
    let payload = serde_json::json!({
        "speaker_id": request.speaker_id,
        "filenames": request.filenames,
    })
    .to_string();

    publish_message(
        &state.config.bus.host,
        state.config.bus.port,
        "voice/speaker/enroll",
        payload,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "failed to publish enrollment trigger");
        (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": format!("bus publish failed: {e}") })),
        )
            .into_response()
    })?;

    Ok(Json(serde_json::json!({
        "status": "enrolling",
        "speaker_id": request.speaker_id,
    })))
}

fn storage_error_response(error: StorageError) -> Response {
    let status = match &error {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    };
    if status != StatusCode::NOT_FOUND {
        tracing::error!(error = %error, "storage proxy request failed");
    }
    (
        status,
        Json(serde_json::json!({ "error": error.to_string() })),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn invalid_config_id(file_id: &str) -> Response {
    bad_request(format!(
        "invalid config file id '{file_id}', expected one of: tools, vocab, cache"
    ))
}
