//! In-process stand-ins for the CMS and the rendering origin

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use site_gate::config::{CollectionConfig, Config};
use site_gate::site::{SiteState, create_app};
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const ABOUT_US_HTML: &str = "<html><body><h1>About us</h1></body></html>";
pub const ICON_BYTES: &[u8] = b"\x00\x00\x01\x00fake-icon";
pub const ICON_VERSION: &str = "2025-03-01T10:00:00";

/// Serve `router` on an ephemeral loopback port
pub async fn spawn(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing listens on
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Fake CMS with a switchable maintenance answer
pub struct FakeCms {
    status: Mutex<StatusCode>,
    body: Mutex<String>,
    lookups: AtomicUsize,
}

impl FakeCms {
    pub fn answering(body: &str) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(StatusCode::OK),
            body: Mutex::new(body.to_string()),
            lookups: AtomicUsize::new(0),
        })
    }

    pub fn under_maintenance() -> Arc<Self> {
        Self::answering(r#"[{"acf":{"maintenance_mode":"Site is Under Maintenance"}}]"#)
    }

    pub fn active() -> Arc<Self> {
        Self::answering(r#"[{"acf":{"maintenance_mode":"Active"}}]"#)
    }

    pub fn set_answer(&self, status: StatusCode, body: &str) {
        *self.status.lock() = status;
        *self.body.lock() = body.to_string();
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct CmsState {
    cms: Arc<FakeCms>,
    addr: SocketAddr,
}

#[derive(Deserialize)]
struct IconQuery {
    v: Option<String>,
}

async fn maintenance(State(state): State<CmsState>) -> Response {
    state.cms.lookups.fetch_add(1, Ordering::SeqCst);
    let status = *state.cms.status.lock();
    let body = state.cms.body.lock().clone();
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn top_bar(State(state): State<CmsState>) -> Response {
    axum::Json(json!([{
        "modified": ICON_VERSION,
        "acf": {"favicon": {"url": format!("http://{}/uploads/icon.png", state.addr)}}
    }]))
    .into_response()
}

async fn icon(Query(query): Query<IconQuery>) -> Response {
    // Only the cache-busted URL is served
    if query.v.as_deref() != Some(ICON_VERSION) {
        return StatusCode::NOT_FOUND.into_response();
    }
    ([(header::CONTENT_TYPE, "image/x-icon")], ICON_BYTES).into_response()
}

async fn visit_visas() -> Response {
    axum::Json(json!([
        {"slug": "tourist", "modified": "2025-03-01T10:00:00"},
        {"slug": "business", "modified": "2025-02-14T08:30:00"},
        {"slug": ""}
    ]))
    .into_response()
}

/// Start the fake CMS
pub async fn spawn_cms(cms: Arc<FakeCms>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new()
        .route("/wp-json/wp/v2/maintenance", get(maintenance))
        .route("/wp-json/wp/v2/top-bar-header", get(top_bar))
        .route("/uploads/icon.png", get(icon))
        .route("/wp-json/wp/v2/visit-visa", get(visit_visas))
        .route(
            "/wp-json/wp/v2/broken",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .with_state(CmsState { cms, addr });
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Start the fake rendering origin
pub async fn spawn_origin() -> SocketAddr {
    let router = Router::new()
        .route(
            "/about-us",
            get(|| async {
                (
                    [
                        (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                        (header::CACHE_CONTROL, "s-maxage=60"),
                    ],
                    ABOUT_US_HTML,
                )
            }),
        )
        .route(
            "/api/contact",
            post(|headers: HeaderMap, body: String| async move {
                let forwarded = headers
                    .get("x-forwarded-host")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                (StatusCode::CREATED, format!("{forwarded}|{body}"))
            }),
        )
        .route(
            "/search",
            any(|request: Request<Body>| async move {
                request.uri().query().unwrap_or_default().to_string()
            }),
        );
    spawn(router).await
}

/// Config pointing at the fakes
pub fn config_for(cms: SocketAddr, origin: SocketAddr) -> Config {
    let mut config = Config::default();
    config.origin.url = format!("http://{origin}");
    config.maintenance.endpoint = format!("http://{cms}/wp-json/wp/v2/maintenance");
    config.favicon.source = format!("http://{cms}/wp-json/wp/v2/top-bar-header");
    config.seo.site_url = "https://www.example.org/".to_string();
    config.seo.static_paths = vec!["/".to_string(), "/about-us".to_string()];
    config.seo.collections = vec![
        CollectionConfig {
            route: "/visit-visa".to_string(),
            endpoint: format!("http://{cms}/wp-json/wp/v2/visit-visa"),
        },
        CollectionConfig {
            route: "/broken".to_string(),
            endpoint: format!("http://{cms}/wp-json/wp/v2/broken"),
        },
    ];
    config
}

/// Build the full application for `config`
pub async fn app(config: &Config) -> (Router, Arc<SiteState>) {
    let state = Arc::new(SiteState::from_config(config).await.unwrap());
    (create_app(Arc::clone(&state)), state)
}

/// Send one request through the app
pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get_path(app: &Router, path: &str) -> Response {
    send(app, Request::builder().uri(path).body(Body::empty()).unwrap()).await
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_string(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
