//! site-gate library
//!
//! Edge gateway in front of a headless-CMS driven marketing site.
//!
//! # Features
//!
//! - **Maintenance gate**: serves the maintenance page under every URL while
//!   the CMS flag says "under maintenance"; fails open when the CMS can't say
//! - **Favicon proxy**: CMS-managed favicon with cache busting
//! - **SEO**: robots.txt and a sitemap built from CMS collections
//! - **Pass-through**: everything else goes to the rendering origin untouched

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod server;
pub mod site;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
    }
}
