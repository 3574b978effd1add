use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse},
};
use std::sync::Arc;
use tracing::debug;

use super::{AppError, TEXT_PLAIN};
use crate::metrics::encode;
use crate::AppState;

/// Prometheus text exposition, version 0.0.4.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const INDEX_HTML: &str = r#"<html>
<head><title>Homelab Exporter</title></head>
<body>
    <h1>Homelab Exporter</h1>
    <p>Metrics: <a href="/metrics">/metrics</a></p>
    <p>Health: <a href="/health">/health</a></p>
</body>
</html>
"#;

// ─── GET /metrics ────────────────────────────────────────────────
/// Runs one full collection and returns it as exposition text.

pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let set = state.collector.collect_all().await;
    let body = encode(&set)?;
    debug!(bytes = body.len(), "serving scrape");
    Ok(([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body))
}

// ─── GET /health ─────────────────────────────────────────────────
/// Liveness only; never touches the collector.

pub async fn health() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, TEXT_PLAIN)], "OK\n")
}

// ─── GET / ───────────────────────────────────────────────────────

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// ─── Everything else ─────────────────────────────────────────────

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        "Not Found\n",
    )
}
