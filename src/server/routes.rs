//! HTTP routes.
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /me`: The player the API key belongs to
//! - `GET /players/{player_id}/files`: That player's files (own files only)
//! - `PUT /files/{name}`: Create or replace one of the caller's files
//! - `GET /files/{name}`: Download one of the caller's files

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use savesync_core::sync::{FileListResponse, MeResponse, PlayerId};
use tower_http::trace::TraceLayer;

use super::storage::{PlayerStorage, StorageError};
use super::ApiKeyStore;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub storage: PlayerStorage,
}

/// Error response body
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.error,
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidFileName(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_name", e.to_string())
            }
            StorageError::InvalidPlayerId(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_player", e.to_string())
            }
            StorageError::IoError(_) => {
                tracing::error!("Storage error: {}", e);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Failed to access storage",
                )
            }
        }
    }
}

/// Authentication middleware
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key,
            None => {
                return ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
                .into_response();
            }
        },
        None => {
            return ApiError::new(
                StatusCode::UNAUTHORIZED,
                "missing_auth",
                "Authorization header required",
            )
            .into_response();
        }
    };

    match state.api_keys.validate(api_key) {
        Some(player) => {
            request.extensions_mut().insert(player);
            next.run(request).await
        }
        None => ApiError::new(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key")
            .into_response(),
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn me(Extension(player): Extension<PlayerId>) -> Json<MeResponse> {
    Json(MeResponse { player_id: player })
}

async fn list_files(
    State(state): State<AppState>,
    Extension(player): Extension<PlayerId>,
    Path(player_id): Path<String>,
) -> Result<Json<FileListResponse>, ApiError> {
    if player.as_str() != player_id {
        tracing::warn!("Player {} asked for the files of {}", player, player_id);
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "identity_mismatch",
            format!("Signed in as {}, not {}", player, player_id),
        ));
    }

    let files = state.storage.list(&player)?;
    Ok(Json(FileListResponse { files }))
}

async fn put_file(
    State(state): State<AppState>,
    Extension(player): Extension<PlayerId>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state.storage.write(&player, &name, &body)?;
    tracing::info!("Stored {} for {} ({} bytes)", name, player, body.len());
    Ok(StatusCode::NO_CONTENT)
}

async fn get_file(
    State(state): State<AppState>,
    Extension(player): Extension<PlayerId>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    match state.storage.read(&player, &name)? {
        Some(bytes) => Ok((
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response()),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("No file named {}", name),
        )),
    }
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/me", get(me))
        .route("/players/{player_id}/files", get(list_files))
        .route("/files/{name}", get(get_file).put(put_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
