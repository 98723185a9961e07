//! File service HTTP routes
//!
//! | Method | Path | Body / Query |
//! |---|---|---|
//! | GET | /list | `folder` (optional) |
//! | POST | /upload | multipart `file` + `folder` |
//! | GET | /download/*path | |
//! | DELETE | /delete/*path | |
//! | POST | /move/*path | JSON `{new_name}` |
//! | POST | /update_variable | JSON `{new_value}` |
//! | GET | /get_variable | |
//! | GET | /get_logs | |
//!
//! Every route sits behind [`require_access`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Multipart, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::errors::ApiError;
use super::state::AppState;
use crate::access::RequestCredentials;
use crate::file_store::StoreError;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const DEVICE_ID_HEADER: &str = "x-device-id";

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MoveRequest {
    #[serde(default)]
    pub new_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateVariableRequest {
    #[serde(default)]
    pub new_value: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VariableResponse {
    pub server_variable: String,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: String,
}

// ==================
// Router
// ==================

/// All file service routes, guarded.
pub fn file_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/list", get(list_handler))
        .route("/upload", post(upload_handler))
        .route("/download/*path", get(download_handler))
        .route("/delete/*path", delete(delete_handler))
        .route("/move/*path", post(move_handler))
        .route("/update_variable", post(update_variable_handler))
        .route("/get_variable", get(get_variable_handler))
        .route("/get_logs", get(get_logs_handler))
        .route_layer(middleware::from_fn_with_state(state, require_access))
}

// ==================
// Access
// ==================

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Runs the access guard before any route work, including body decoding.
pub async fn require_access(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();
    let credentials = RequestCredentials {
        api_key: header_value(headers, API_KEY_HEADER),
        device_id: header_value(headers, DEVICE_ID_HEADER),
        peer: Some(peer.ip()),
    };

    state.guard.authorize(&credentials).await?;
    Ok(next.run(request).await)
}

/// JSON body that tolerates absence or malformation: a missing field is
/// reported by the operation itself as a missing parameter.
fn lenient_json<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

// ==================
// File Handlers
// ==================

async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let files = state.store.list(query.folder.as_deref())?;
    Ok(Json(ListResponse { files }))
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut folder: Option<String> = None;

    let rejected = |e: axum::extract::multipart::MultipartError| {
        ApiError::Rejected(e.status(), e.body_text())
    };

    while let Some(field) = multipart.next_field().await.map_err(rejected)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(rejected)?;
                file = Some((file_name, data));
            }
            Some("folder") => {
                folder = Some(field.text().await.map_err(rejected)?);
            }
            _ => {}
        }
    }

    let (file_name, data) = match file {
        Some(file) => file,
        None => {
            state.audit.warning("No file provided for upload");
            return Err(StoreError::MissingParameter("file".to_string()).into());
        }
    };

    let relative = state
        .store
        .put(folder.as_deref().filter(|f| !f.is_empty()), &file_name, &data)?;

    Ok(Json(MessageResponse {
        message: format!("File {} uploaded successfully", relative),
    }))
}

async fn download_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let data = state.store.get(&path)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let file_name = path.rsplit('/').next().unwrap_or(&path).replace('"', "_");
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((StatusCode::OK, headers, Bytes::from(data)).into_response())
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.store.delete(&path)?;
    Ok(Json(MessageResponse {
        message: format!("File {} deleted", path),
    }))
}

async fn move_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request: MoveRequest = lenient_json(&body);
    let destination = request.new_name.unwrap_or_default();

    state.store.rename(&path, Some(destination.as_str()))?;
    Ok(Json(MessageResponse {
        message: format!("File moved to: {}", destination),
    }))
}

// ==================
// Variable and Log Handlers
// ==================

async fn update_variable_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request: UpdateVariableRequest = lenient_json(&body);
    let value = state.variable.set(request.new_value.as_deref())?;
    Ok(Json(MessageResponse {
        message: format!("Server variable updated to: {}", value),
    }))
}

async fn get_variable_handler(State(state): State<Arc<AppState>>) -> Json<VariableResponse> {
    Json(VariableResponse {
        server_variable: state.variable.get(),
    })
}

async fn get_logs_handler(State(state): State<Arc<AppState>>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: state.audit.snapshot_text(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_json_defaults_on_garbage() {
        let parsed: MoveRequest = lenient_json(&Bytes::from_static(b"not json"));
        assert!(parsed.new_name.is_none());

        let parsed: MoveRequest = lenient_json(&Bytes::new());
        assert!(parsed.new_name.is_none());

        let parsed: UpdateVariableRequest =
            lenient_json(&Bytes::from_static(br#"{"new_value":"v2"}"#));
        assert_eq!(parsed.new_value.as_deref(), Some("v2"));
    }
}
