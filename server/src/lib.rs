pub mod error;
pub mod service;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use error::{QueryError, VisitError};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use service::{SearchResponse, SearchService};

#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
}

#[derive(Deserialize)]
pub struct VisitBody {
    pub url: String,
}

pub fn build_app(search: SearchService) -> Router {
    let state = AppState { search: Arc::new(search) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/search_queries/:id/visits", post(visit_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// `X-Real-IP` when a proxy sets it, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> Option<IpAddr> {
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .or(peer.map(|ConnectInfo(addr)| addr.ip()))
}

pub async fn search_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = match params.get("q") {
        Some(q) if params.len() == 1 => q,
        _ => return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Malformed query params" }))).into_response(),
    };
    match state.search.search(q, client_ip(&headers, peer)).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<String>) -> Result<Response, QueryError> {
    Ok(match state.search.document(&doc_id)? {
        Some(content) => Json(json!({ "id": doc_id, "url": doc_id, "content": content })).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response(),
    })
}

pub async fn visit_handler(
    State(state): State<AppState>,
    Path(search_query_id): Path<i64>,
    Json(body): Json<VisitBody>,
) -> Result<StatusCode, VisitError> {
    state.search.record_visit(search_query_id, &body.url).await?;
    Ok(StatusCode::NO_CONTENT)
}
