use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tokio::task;

use crate::http::server::AppState;
use crate::introspection::views::{self, ContentHashesView, ContentValidityView, MetadataView, RoutesView};

#[derive(Debug, Error)]
pub enum IntrospectError {
    #[error("unknown introspection endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("introspection failed: {0}")]
    Internal(String),
}

impl IntrospectError {
    fn status(&self) -> StatusCode {
        match self {
            Self::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IntrospectError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Introspection request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub async fn get_metadata(State(state): State<AppState>) -> Json<MetadataView> {
    Json(views::metadata(&state.registry.snapshot()))
}

pub async fn get_routes(State(state): State<AppState>) -> Json<RoutesView> {
    Json(views::routes(&state.registry.snapshot()))
}

pub async fn get_content_hashes(State(state): State<AppState>) -> Json<ContentHashesView> {
    Json(views::content_hashes(&state.registry.snapshot()))
}

pub async fn get_content_validity(
    State(state): State<AppState>,
) -> Result<Json<ContentValidityView>, IntrospectError> {
    let snapshot = state.registry.snapshot();
    let cache = state.validity.clone();
    task::spawn_blocking(move || views::content_validity(&snapshot, &cache))
        .await
        .map(Json)
        .map_err(|e| IntrospectError::Internal(e.to_string()))
}

pub async fn unknown_endpoint(uri: Uri) -> IntrospectError {
    IntrospectError::UnknownEndpoint(uri.path().to_string())
}
