//! HTTP router and handlers

pub mod favicon;
pub mod origin;
pub mod seo;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{any, get},
};
use bytes::Bytes;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use self::favicon::{FaviconProxy, favicon_handler};
use self::origin::{OriginProxy, origin_handler};
use self::seo::{Seo, robots_handler, sitemap_handler};
use crate::config::Config;
use crate::maintenance::{FlagCache, FlagSource, HttpFlagSource, MaintenanceGate, maintenance_gate};
use crate::Result;

/// Built-in maintenance page, used unless `maintenance.page_file` is set
pub const DEFAULT_MAINTENANCE_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta name="robots" content="noindex">
<title>Under maintenance</title>
<style>
body{margin:0;min-height:100vh;display:flex;align-items:center;justify-content:center;font-family:system-ui,sans-serif;background:#fff;color:#000}
main{max-width:42rem;padding:1.5rem;text-align:center}
h1{font-size:1.5rem;font-weight:600}
</style>
</head>
<body>
<main>
<h1>This site is under maintenance.</h1>
<p>Please check back shortly. For inquiries in the meantime, contact us by email.</p>
</main>
</body>
</html>
"#;

/// Shared application state
pub struct SiteState {
    /// Maintenance gate (also consulted by `/health`)
    pub gate: Arc<MaintenanceGate>,
    /// Pass-through to the rendering origin
    pub origin: OriginProxy,
    /// CMS favicon proxy
    pub favicon: FaviconProxy,
    /// robots.txt / sitemap.xml
    pub seo: Seo,
    /// Maintenance page body
    pub maintenance_page: Bytes,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// Prometheus handle when the exporter is installed
    #[cfg(feature = "metrics")]
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl SiteState {
    /// Build every component from config
    pub async fn from_config(config: &Config) -> Result<Self> {
        let source: Arc<dyn FlagSource> = Arc::new(HttpFlagSource::from_config(&config.maintenance)?);
        Self::with_flag_source(config, source).await
    }

    /// Build every component from config around a given flag source
    pub async fn with_flag_source(config: &Config, source: Arc<dyn FlagSource>) -> Result<Self> {
        let flags = FlagCache::new(source, config.maintenance.revalidate);
        let gate = Arc::new(MaintenanceGate::from_config(&config.maintenance, flags)?);

        let maintenance_page = match &config.maintenance.page_file {
            Some(path) => {
                info!(path = %path.display(), "Using custom maintenance page");
                Bytes::from(tokio::fs::read(path).await?)
            }
            None => Bytes::from_static(DEFAULT_MAINTENANCE_PAGE.as_bytes()),
        };

        Ok(Self {
            gate,
            origin: OriginProxy::from_config(&config.origin)?,
            favicon: FaviconProxy::from_config(&config.favicon)?,
            seo: Seo::from_config(&config.seo)?,
            maintenance_page,
            request_timeout: config.server.request_timeout,
            #[cfg(feature = "metrics")]
            metrics: None,
        })
    }
}

/// Routes served by the gateway itself; everything else goes to the origin
pub fn create_router(state: Arc<SiteState>) -> Router {
    let maintenance_path = state.gate.maintenance_path().to_string();

    let router = Router::new()
        .route("/health", get(health_handler))
        .route(&maintenance_path, any(maintenance_page_handler))
        .route("/api/favicon", get(favicon_handler))
        .route("/favicon.ico", get(favicon_handler))
        .route("/robots.txt", get(robots_handler))
        .route("/sitemap.xml", get(sitemap_handler));

    #[cfg(feature = "metrics")]
    let router = if state.metrics.is_some() {
        router.route("/metrics", get(metrics_handler))
    } else {
        router
    };

    router.fallback(origin_handler).with_state(state)
}

/// Full application: the maintenance gate wrapped around [`create_router`].
///
/// The gate sits outside the router so a rewritten URI is routed to the
/// maintenance page handler.
pub fn create_app(state: Arc<SiteState>) -> Router {
    let gate = Arc::clone(&state.gate);
    let request_timeout = state.request_timeout;

    Router::new()
        .fallback_service(create_router(state))
        .layer(middleware::from_fn_with_state(gate, maintenance_gate))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Maintenance page, for any method
async fn maintenance_page_handler(State(state): State<Arc<SiteState>>) -> impl IntoResponse {
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        state.maintenance_page.clone(),
    )
}

/// Health check; reports the cached flag without triggering a lookup
async fn health_handler(State(state): State<Arc<SiteState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "maintenance": state.gate.last_flag(),
        "flag_cache": state.gate.flags().stats(),
    }))
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<SiteState>>) -> impl IntoResponse {
    state
        .metrics
        .as_ref()
        .map(metrics_exporter_prometheus::PrometheusHandle::render)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintenance::{LookupError, MaintenanceFlag};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    struct FixedSource(Option<MaintenanceFlag>);

    #[async_trait]
    impl FlagSource for FixedSource {
        async fn fetch(&self) -> std::result::Result<MaintenanceFlag, LookupError> {
            self.0.ok_or(LookupError::ConfigurationMissing)
        }
    }

    async fn app_with(flag: Option<MaintenanceFlag>) -> (Router, Arc<SiteState>) {
        let mut config = Config::default();
        // Nothing listens here; only the origin fallback would notice
        config.origin.url = "http://127.0.0.1:9".to_string();
        config.favicon.source = String::new();
        config.seo.site_url = "https://example.org".to_string();
        let state = Arc::new(
            SiteState::with_flag_source(&config, Arc::new(FixedSource(flag)))
                .await
                .unwrap(),
        );
        (create_app(Arc::clone(&state)), state)
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_rewrite_serves_maintenance_page() {
        let (app, _) = app_with(Some(MaintenanceFlag::UnderMaintenance)).await;

        let response = app
            .oneshot(Request::builder().uri("/about-us?ref=home").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(body_string(response).await, DEFAULT_MAINTENANCE_PAGE);
    }

    #[tokio::test]
    async fn test_rewrite_applies_to_any_method() {
        let (app, _) = app_with(Some(MaintenanceFlag::UnderMaintenance)).await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/contact")
                    .body(Body::from("name=x"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, DEFAULT_MAINTENANCE_PAGE);
    }

    #[tokio::test]
    async fn test_health_is_not_gated() {
        let (app, state) = app_with(Some(MaintenanceFlag::UnderMaintenance)).await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "healthy");
        assert!(body["maintenance"].is_null());
        assert_eq!(state.gate.flags().stats().misses, 0);
    }

    #[tokio::test]
    async fn test_unknown_flag_reaches_origin() {
        let (app, _) = app_with(None).await;

        let response = app
            .oneshot(Request::builder().uri("/about-us").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // Origin is down in this test, so pass-through shows up as 502
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_robots_txt_route() {
        let (app, _) = app_with(Some(MaintenanceFlag::Active)).await;

        let response = app
            .oneshot(Request::builder().uri("/robots.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.starts_with("User-Agent: *\nAllow: /\n"));
    }

    #[tokio::test]
    async fn test_favicon_without_source_is_no_content() {
        let (app, _) = app_with(Some(MaintenanceFlag::UnderMaintenance)).await;

        let response = app
            .oneshot(Request::builder().uri("/favicon.ico").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
