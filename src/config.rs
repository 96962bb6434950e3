//! Configuration management

use std::{env, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables are set into the process environment for `${VAR}` resolution.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Page-rendering origin that owns every route we don't serve ourselves
    pub origin: OriginConfig,
    /// Maintenance gate configuration
    pub maintenance: MaintenanceConfig,
    /// Favicon proxy configuration
    pub favicon: FaviconConfig,
    /// robots.txt / sitemap.xml configuration
    pub seo: SeoConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Whole-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Rendering origin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL of the origin (supports `${VAR}`)
    pub url: String,
    /// Per-request timeout towards the origin
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: "${SITE_ORIGIN_URL:-http://127.0.0.1:3000}".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Maintenance gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Content-source endpoint holding `acf.maintenance_mode`.
    /// Empty means "not configured": the flag is then always unknown.
    pub endpoint: String,
    /// How long a looked-up flag is reused before asking again
    #[serde(with = "humantime_serde")]
    pub revalidate: Duration,
    /// Lookup timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Route of the maintenance page
    pub page_path: String,
    /// Optional HTML file replacing the built-in maintenance page
    pub page_file: Option<PathBuf>,
    /// Path patterns (regex) the gate never looks at.
    /// The maintenance page path is always excluded on top of these.
    pub exclude: Vec<String>,
}

fn default_exclude() -> Vec<String> {
    vec![
        r"^/_next/".to_string(),
        r"^/favicon\.ico".to_string(),
        r"^/api/favicon".to_string(),
        r"^/health$".to_string(),
        r"^/metrics$".to_string(),
    ]
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            endpoint: "${WP_MAINTENANCE_ENDPOINT}".to_string(),
            revalidate: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            page_path: "/maintenance".to_string(),
            page_file: None,
            exclude: default_exclude(),
        }
    }
}

impl MaintenanceConfig {
    /// Configured lookup endpoint, if any
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        non_empty(&self.endpoint)
    }
}

/// Favicon proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaviconConfig {
    /// CMS collection whose newest item carries `acf.favicon`
    pub source: String,
    /// Timeout for both the CMS and the image fetch
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for FaviconConfig {
    fn default() -> Self {
        Self {
            source: "${WP_HEADER_TOP_BAR_URL}".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl FaviconConfig {
    /// Configured CMS source, if any
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        non_empty(&self.source)
    }
}

/// robots.txt and sitemap.xml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeoConfig {
    /// Public site URL; only its origin is used
    pub site_url: String,
    /// Paths always listed in the sitemap
    pub static_paths: Vec<String>,
    /// CMS collections listed as `<route>/<slug>`
    pub collections: Vec<CollectionConfig>,
    /// Timeout per collection fetch
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_static_paths() -> Vec<String> {
    [
        "/",
        "/about-us",
        "/contact-us",
        "/visit-visa",
        "/work-permit",
        "/skilled-migration",
        "/job-seeker-visa",
        "/working-holiday",
        "/success-stories",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Collections the site renders, read from the CMS REST base
fn default_collections() -> Vec<CollectionConfig> {
    [
        "visit-visa",
        "work-permit",
        "skilled-migration",
        "job-seeker-visa",
        "working-holiday",
        "posts",
    ]
    .into_iter()
    .map(|name| CollectionConfig {
        route: format!("/{name}"),
        endpoint: format!("${{WP_REST_BASE}}/{name}?per_page=100"),
    })
    .collect()
}

impl Default for SeoConfig {
    fn default() -> Self {
        Self {
            site_url: "${SITE_URL}".to_string(),
            static_paths: default_static_paths(),
            collections: default_collections(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// One CMS collection exposed in the sitemap
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Route prefix on the public site (e.g. `/visit-visa`)
    pub route: String,
    /// REST endpoint listing the collection's items
    pub endpoint: String,
}

/// Routes the gateway serves itself
const RESERVED_ROUTES: [&str; 6] = [
    "/health",
    "/metrics",
    "/api/favicon",
    "/favicon.ico",
    "/robots.txt",
    "/sitemap.xml",
];

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (SITE_GATE_ prefix)
        figment = figment.merge(Env::prefixed("SITE_GATE_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();

        config.expand_env_vars()?;
        config.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in URL-ish config values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        // Pattern: ${VAR} or ${VAR:-default}
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        self.origin.url = Self::expand_string(&re, &self.origin.url);
        self.maintenance.endpoint = Self::expand_string(&re, &self.maintenance.endpoint);
        self.favicon.source = Self::expand_string(&re, &self.favicon.source);
        self.seo.site_url = Self::expand_string(&re, &self.seo.site_url);
        for collection in &mut self.seo.collections {
            collection.endpoint = Self::expand_string(&re, &collection.endpoint);
        }

        Ok(())
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }

    /// Reject values that would only fail later, at request time
    pub fn validate(&self) -> Result<()> {
        let page_path = &self.maintenance.page_path;
        if !page_path.starts_with('/') || page_path.contains(['{', '}', '*', '?']) {
            return Err(Error::Config(format!(
                "maintenance.page_path must be a plain absolute route, got '{page_path}'"
            )));
        }

        // The page path and everything below it skip the gate
        if page_path.ends_with('/') {
            return Err(Error::Config(format!(
                "maintenance.page_path must name a page, not a directory, got '{page_path}'"
            )));
        }

        if RESERVED_ROUTES.contains(&page_path.as_str()) {
            return Err(Error::Config(format!(
                "maintenance.page_path '{page_path}' collides with a built-in route"
            )));
        }

        RegexSet::new(&self.maintenance.exclude)
            .map_err(|e| Error::Config(format!("maintenance.exclude: {e}")))?;

        let origin = Url::parse(&self.origin.url)
            .map_err(|e| Error::Config(format!("origin.url '{}': {e}", self.origin.url)))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "origin.url must be http(s), got '{}'",
                self.origin.url
            )));
        }

        for collection in &self.seo.collections {
            if !collection.route.starts_with('/') {
                return Err(Error::Config(format!(
                    "seo.collections route must start with '/', got '{}'",
                    collection.route
                )));
            }
        }

        Ok(())
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
