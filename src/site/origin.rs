//! Pass-through proxy to the page-rendering origin

use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::SiteState;
use crate::config::OriginConfig;
use crate::{Error, Result};

/// Headers that describe one connection and must not be forwarded
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Largest request body relayed to the origin
const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

/// Forwards requests to the origin and streams its answer back
pub struct OriginProxy {
    client: Client,
    base: String,
}

impl OriginProxy {
    /// Create a proxy for `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("origin url '{base_url}': {e}")))?;

        // Bodies are relayed byte for byte: no redirects, no decompression
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::none())
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .map_err(|e| Error::Config(format!("origin client: {e}")))?;

        Ok(Self {
            client,
            base: base.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Create from the `origin` config section
    pub fn from_config(config: &OriginConfig) -> Result<Self> {
        Self::new(&config.url, config.timeout)
    }

    /// Origin URL for a path-and-query
    #[must_use]
    pub fn target(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base, path_and_query)
    }

    /// Forward `request` as-is (minus hop-by-hop headers)
    pub async fn forward(&self, request: Request) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map_or("/", axum::http::uri::PathAndQuery::as_str);
        let url = self.target(path_and_query);

        let mut headers = parts.headers;
        let original_host = headers.remove(header::HOST);
        strip_hop_by_hop(&mut headers);
        if let Some(host) = original_host {
            headers.insert(HeaderName::from_static("x-forwarded-host"), host);
        }

        let body = axum::body::to_bytes(body, MAX_FORWARD_BODY)
            .await
            .map_err(|e| Error::Request(format!("request body: {e}")))?;

        debug!(method = %parts.method, url = %url, "Forwarding to origin");

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// Remove connection-scoped headers, including any named in `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Fallback handler: everything the gateway doesn't serve itself
pub async fn origin_handler(State(state): State<Arc<SiteState>>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    match state.origin.forward(request).await {
        Ok(response) => response,
        Err(e) if e.is_upstream() => {
            warn!(path = %path, error = %e, "Origin request failed");
            (
                StatusCode::BAD_GATEWAY,
                [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
                "Bad Gateway",
            )
                .into_response()
        }
        Err(e) => {
            debug!(path = %path, error = %e, "Rejected request before forwarding");
            (StatusCode::BAD_REQUEST, "Bad Request").into_response()
        }
    }
}
