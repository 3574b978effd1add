use axum::{middleware as axum_mw, routing::get, Router};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

use crate::handlers;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router`: scrape, health, index and a plain 404.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Scrape surface ──────────────────────────────────────
        .route("/metrics", get(handlers::scrape::metrics))
        .route("/health", get(handlers::scrape::health))
        .route("/", get(handlers::scrape::index))
        .fallback(handlers::scrape::not_found)
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(CatchPanicLayer::custom(handlers::panic_response))
        .layer(axum_mw::from_fn(timing::timing_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Collector, CollectorConfig};
    use crate::probes::fake::{FakeCounters, FakeHost, FakeLatency, FakeSpeedTest};
    use crate::probes::ProbeResult;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(latency: Vec<ProbeResult<f64>>) -> Router {
        let mut host = FakeHost {
            cpu: Some(42.0),
            ..FakeHost::default()
        };
        host.reachable.insert("8.8.8.8".into(), true);
        let collector = Collector::new(
            CollectorConfig::default(),
            Arc::new(host),
            Arc::new(FakeCounters::default()),
            Arc::new(FakeLatency::new(latency)),
            Arc::new(FakeSpeedTest::succeeding(100.0, 20.0)),
        );
        create_router(Arc::new(AppState {
            collector: Arc::new(collector),
        }))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_owned());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn metrics_serves_exposition_text() {
        let (status, content_type, body) = get(app(vec![Ok(11.5)]), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            content_type.as_deref(),
            Some(handlers::scrape::EXPOSITION_CONTENT_TYPE)
        );
        assert!(body.starts_with("cpu_usage_percent 42\nmemory_usage_percent 0\n"));
        assert!(body.contains("network_latency_ms 11.5\n"));
        assert!(body.contains("internet_download_speed_mbps 100\n"));
        assert!(body.ends_with("internet_up 1\n"));
    }

    #[tokio::test]
    async fn unencodable_metrics_become_a_fixed_500() {
        let (status, _, body) = get(app(vec![Ok(f64::NAN)]), "/metrics").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, handlers::INTERNAL_ERROR_BODY);
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        let (status, content_type, body) = get(app(vec![]), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(handlers::TEXT_PLAIN));
        assert_eq!(body, "OK\n");
    }

    #[tokio::test]
    async fn index_links_both_endpoints() {
        let (status, content_type, body) = get(app(vec![]), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/html"));
        assert!(body.contains(r#"href="/metrics""#));
        assert!(body.contains(r#"href="/health""#));
    }

    #[tokio::test]
    async fn unknown_paths_are_404() {
        let (status, _, body) = get(app(vec![]), "/metrics/extra").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not Found\n");
    }

    #[tokio::test]
    async fn responses_carry_server_timing() {
        let response = app(vec![])
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let timing = response.headers().get("Server-Timing").unwrap().to_str().unwrap();
        assert!(timing.starts_with("total;dur="));
    }
}
