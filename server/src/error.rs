use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use search_core::profile::ProfileError;
use search_core::urls::UrlError;
use search_core::StoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    ClientInput(String),

    #[error("document index unavailable: {0}")]
    IndexUnavailable(#[from] StoreError),
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        match self {
            QueryError::ClientInput(message) => (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response(),
            QueryError::IndexUnavailable(e) => {
                tracing::error!(error = %e, "search failed");
                let body = json!({ "error": "Something went wrong while fetching results.", "details": e.to_string() });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum VisitError {
    #[error("no profile store configured")]
    NotConfigured,

    #[error(transparent)]
    InvalidUrl(#[from] UrlError),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

impl IntoResponse for VisitError {
    fn into_response(self) -> Response {
        let status = match &self {
            VisitError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            VisitError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            VisitError::Profile(e) => {
                tracing::warn!(error = %e, "could not record visit");
                StatusCode::BAD_GATEWAY
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
