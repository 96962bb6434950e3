//! robots.txt and sitemap.xml

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, NaiveDateTime};
use futures::future::join_all;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::SiteState;
use crate::config::{CollectionConfig, SeoConfig};
use crate::{Error, Result};

/// Used when `seo.site_url` is empty or not an http(s) URL
pub const DEFAULT_SITE_URL: &str = "https://example.com";

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Reduce a configured site URL to its origin (`scheme://host[:port]`)
#[must_use]
pub fn site_origin(site_url: &str) -> String {
    Url::parse(site_url.trim())
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map_or_else(
            || DEFAULT_SITE_URL.to_string(),
            |u| u.origin().ascii_serialization(),
        )
}

/// robots.txt body allowing everything and pointing at the sitemap
#[must_use]
pub fn robots_txt(origin: &str) -> String {
    format!("User-Agent: *\nAllow: /\n\nHost: {origin}\nSitemap: {origin}/sitemap.xml\n")
}

/// One `<url>` of the sitemap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    /// Absolute page URL
    pub loc: String,
    /// `YYYY-MM-DD` of the last modification, when known
    pub lastmod: Option<String>,
}

/// The subset of a CMS item the sitemap needs
#[derive(Debug, Deserialize)]
struct CollectionItem {
    slug: String,
    #[serde(default)]
    modified: Option<String>,
}

/// Builds the sitemap from static paths and CMS collections
pub struct Seo {
    client: Client,
    origin: String,
    static_paths: Vec<String>,
    collections: Vec<CollectionConfig>,
}

impl Seo {
    /// Create from the `seo` config section
    pub fn from_config(config: &SeoConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| Error::Config(format!("sitemap client: {e}")))?;

        let collections = config
            .collections
            .iter()
            .filter(|c| {
                let absolute = Url::parse(&c.endpoint)
                    .is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
                if !absolute {
                    debug!(route = %c.route, endpoint = %c.endpoint, "Sitemap collection has no CMS endpoint, skipped");
                }
                absolute
            })
            .cloned()
            .collect();

        Ok(Self {
            client,
            origin: site_origin(&config.site_url),
            static_paths: config.static_paths.clone(),
            collections,
        })
    }

    /// Public origin used in robots.txt and every sitemap URL
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Static paths first, then every collection in configured order.
    ///
    /// Collections are fetched concurrently. One that fails is logged and
    /// left out; the rest of the sitemap is still served.
    pub async fn entries(&self) -> Vec<SitemapEntry> {
        let mut entries: Vec<SitemapEntry> = self
            .static_paths
            .iter()
            .map(|path| SitemapEntry {
                loc: format!("{}{path}", self.origin),
                lastmod: None,
            })
            .collect();

        let fetched = join_all(self.collections.iter().map(|c| self.collection(c))).await;
        for (collection, result) in self.collections.iter().zip(fetched) {
            match result {
                Ok(items) => entries.extend(items),
                Err(e) => {
                    warn!(route = %collection.route, error = %e, "Sitemap collection skipped");
                }
            }
        }

        entries
    }

    async fn collection(&self, collection: &CollectionConfig) -> Result<Vec<SitemapEntry>> {
        let response = self.client.get(&collection.endpoint).send().await?;
        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "{} answered {}",
                collection.endpoint,
                response.status()
            )));
        }

        let items: Vec<Value> = response.json().await?;
        let route = collection.route.trim_end_matches('/');
        let entries: Vec<SitemapEntry> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<CollectionItem>(item).ok())
            .filter(|item| !item.slug.is_empty())
            .map(|item| SitemapEntry {
                loc: format!("{}{route}/{}", self.origin, item.slug),
                lastmod: item.modified.as_deref().and_then(lastmod_date),
            })
            .collect();

        debug!(route = %collection.route, count = entries.len(), "Sitemap collection fetched");
        Ok(entries)
    }
}

/// Convert a CMS timestamp to a sitemap date.
///
/// WordPress `modified` has no offset (`2025-03-01T10:00:00`); RFC 3339 is
/// accepted too.
fn lastmod_date(raw: &str) -> Option<String> {
    let date = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .ok()?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Render entries as a sitemaps.org `urlset`
pub fn render_sitemap(entries: &[SitemapEntry]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("urlset").with_attributes([("xmlns", SITEMAP_NS)]),
        ))
        .map_err(xml_error)?;

    for entry in entries {
        writer
            .write_event(Event::Start(BytesStart::new("url")))
            .map_err(xml_error)?;
        write_text_element(&mut writer, "loc", &entry.loc)?;
        if let Some(lastmod) = &entry.lastmod {
            write_text_element(&mut writer, "lastmod", lastmod)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("url")))
            .map_err(xml_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("urlset")))
        .map_err(xml_error)?;

    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_error)?;
    Ok(())
}

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::Internal(format!("sitemap xml: {e}"))
}

/// `GET /robots.txt`
pub async fn robots_handler(State(state): State<Arc<SiteState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        robots_txt(state.seo.origin()),
    )
        .into_response()
}

/// `GET /sitemap.xml`
pub async fn sitemap_handler(State(state): State<Arc<SiteState>>) -> Response {
    let entries = state.seo.entries().await;
    match render_sitemap(&entries) {
        Ok(xml) => ([(header::CONTENT_TYPE, "application/xml")], xml).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render sitemap");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
