use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::AppState;
use crate::config;
use crate::error::ApiError;
use crate::handlers::{json_body, parse_body, require_fields};
use crate::middleware::{ApiResponse, ApiResult};
use crate::storage::{check_upload, object_path, validate_object_path};

const DEFAULT_FOLDER: &str = "uploads";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub path: String,
    pub content_type: String,
    pub size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub path: String,
}

struct UploadedFile {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// POST /api/upload - multipart `file` (and optional `folder`) to object storage
pub async fn upload_post(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<UploadResponse> {
    let mut file: Option<UploadedFile> = None;
    let mut folder = DEFAULT_FOLDER.to_string();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("file").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("folder") => {
                folder = field.text().await.map_err(multipart_error)?;
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::field_error("file", "This field is required"))?;
    if file.bytes.is_empty() {
        return Err(ApiError::field_error("file", "Uploaded file is empty"));
    }

    check_upload(&config::config().storage, &file.content_type, file.bytes.len())?;
    let path = object_path(&folder, &file.filename)?;
    let size = file.bytes.len();
    let url = state.storage.upload(&path, &file.content_type, file.bytes).await?;

    tracing::info!("Uploaded {} ({} bytes)", path, size);
    Ok(ApiResponse::created(UploadResponse {
        url,
        path,
        content_type: file.content_type,
        size,
    }))
}

/// DELETE /api/upload - remove a stored object by path
pub async fn upload_delete(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<RemoveRequest> {
    let body = json_body(body)?;
    require_fields(&body, &["path"])?;
    let request: RemoveRequest = parse_body(body)?;

    let path = validate_object_path(&request.path)?.to_string();
    state.storage.remove(&path).await?;

    tracing::info!("Removed {}", path);
    Ok(ApiResponse::success(RemoveRequest { path }))
}
