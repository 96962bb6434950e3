//! Favicon proxy
//!
//! The favicon is managed in the CMS as an image field on the newest
//! top-bar-header item. We look it up on every request (no caching, the
//! browser revalidates) and append the item's modification time as `v=` so
//! CDNs and browsers see a new URL whenever the editor swaps the icon.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::SiteState;
use crate::config::FaviconConfig;
use crate::{Error, Result};

/// Content type used when the media server doesn't say
const DEFAULT_ICON_TYPE: &str = "image/png";

/// A fetched favicon
#[derive(Debug, Clone)]
pub struct Favicon {
    /// Media type reported by the media server
    pub content_type: String,
    /// Image bytes
    pub bytes: Bytes,
}

/// Looks up and fetches the CMS-managed favicon
pub struct FaviconProxy {
    client: Client,
    source: Option<String>,
}

impl FaviconProxy {
    /// Create a proxy reading from `source`
    pub fn new(source: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("favicon client: {e}")))?;

        Ok(Self {
            client,
            source: source.map(str::to_string),
        })
    }

    /// Create from the `favicon` config section
    pub fn from_config(config: &FaviconConfig) -> Result<Self> {
        Self::new(config.source(), config.timeout)
    }

    /// Fetch the current favicon.
    ///
    /// `Ok(None)` means there is nothing to serve (no source configured, no
    /// item, no image on the item).
    pub async fn fetch(&self) -> Result<Option<Favicon>> {
        let Some(source) = self.source.as_deref() else {
            return Ok(None);
        };

        let response = self
            .client
            .get(source)
            .query(&[("per_page", "1"), ("orderby", "modified"), ("order", "desc")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "favicon source answered {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await?;
        let Some(item) = payload.as_array().and_then(|items| items.first()) else {
            return Ok(None);
        };
        let Some(raw_url) = image_url(item) else {
            return Ok(None);
        };

        let src = cache_busted_url(raw_url, version_tag(item))?;
        debug!(src = %src, "Fetching favicon");

        let image = self.client.get(src).send().await?;
        if !image.status().is_success() {
            return Err(Error::Upstream(format!(
                "favicon image answered {}",
                image.status()
            )));
        }

        let content_type = image
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_ICON_TYPE)
            .to_string();
        let bytes = image.bytes().await?;

        Ok(Some(Favicon {
            content_type,
            bytes,
        }))
    }
}

/// Pick the best image for a favicon: the square medium size, then the
/// original upload, then the thumbnail.
fn image_url(item: &Value) -> Option<&str> {
    let favicon = item.get("acf")?.get("favicon")?;
    let sizes = favicon.get("sizes");

    [
        sizes.and_then(|s| s.get("medium")),
        favicon.get("url"),
        sizes.and_then(|s| s.get("thumbnail")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|s| !s.is_empty())
}

/// Version tag for cache busting: item modification time, else publish date
fn version_tag(item: &Value) -> &str {
    ["modified", "date"]
        .into_iter()
        .filter_map(|key| item.get(key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or("1")
}

/// Append `v=<version>` to `raw`, keeping any existing query
fn cache_busted_url(raw: &str, version: &str) -> Result<Url> {
    let mut url =
        Url::parse(raw).map_err(|e| Error::Upstream(format!("favicon url '{raw}': {e}")))?;
    url.query_pairs_mut().append_pair("v", version);
    Ok(url)
}

/// `GET /api/favicon` and `GET /favicon.ico`
///
/// Always answers: any failure becomes `204 No Content` so the browser just
/// shows no icon.
pub async fn favicon_handler(State(state): State<Arc<SiteState>>) -> Response {
    match state.favicon.fetch().await {
        Ok(Some(icon)) => {
            let content_type = HeaderValue::from_str(&icon.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_ICON_TYPE));
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (
                        header::CACHE_CONTROL,
                        HeaderValue::from_static("public, max-age=0, must-revalidate"),
                    ),
                ],
                icon.bytes,
            )
                .into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            debug!(error = %e, "Favicon unavailable");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}
