//! Maintenance flag lookup against the content source

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use site_gate_core::{MaintenanceFlag, status_field};
use thiserror::Error;
use tracing::debug;

use crate::config::MaintenanceConfig;
use crate::{Error, Result};

/// Why a lookup did not produce a flag.
///
/// Every variant means the same thing to the gate: the flag is unknown.
#[derive(Debug, Error)]
pub enum LookupError {
    /// No endpoint configured
    #[error("no maintenance endpoint configured")]
    ConfigurationMissing,

    /// Connection refused, DNS failure, timeout
    #[error("content source unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Content source answered with a non-2xx status
    #[error("content source answered {0}")]
    UpstreamError(StatusCode),

    /// Body is not JSON or lacks `acf.maintenance_mode`
    #[error("malformed maintenance payload: {0}")]
    MalformedResponse(String),
}

impl LookupError {
    /// Short label for logs and metrics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing => "configuration_missing",
            Self::UpstreamUnreachable(_) => "upstream_unreachable",
            Self::UpstreamError(_) => "upstream_error",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Something that can tell whether the site is under maintenance
#[async_trait]
pub trait FlagSource: Send + Sync {
    /// Ask for the current flag.
    ///
    /// `Ok` only ever carries `UnderMaintenance` or `Active`; anything that
    /// would be `Unknown` is reported as the reason instead.
    async fn fetch(&self) -> std::result::Result<MaintenanceFlag, LookupError>;
}

/// Reads the flag from a CMS REST endpoint
pub struct HttpFlagSource {
    client: Client,
    endpoint: Option<String>,
}

impl HttpFlagSource {
    /// Create a source for `endpoint`; `None` yields a source that never
    /// touches the network.
    pub fn new(endpoint: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("maintenance lookup client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.map(str::to_string),
        })
    }

    /// Create from the `maintenance` config section
    pub fn from_config(config: &MaintenanceConfig) -> Result<Self> {
        Self::new(config.endpoint(), config.timeout)
    }

    /// Whether an endpoint is configured at all
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[async_trait]
impl FlagSource for HttpFlagSource {
    async fn fetch(&self) -> std::result::Result<MaintenanceFlag, LookupError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Err(LookupError::ConfigurationMissing);
        };

        let response = self
            .client
            .get(endpoint)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| LookupError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::UpstreamError(status));
        }

        let payload: Value = response.json().await.map_err(|e| {
            if e.is_decode() {
                LookupError::MalformedResponse(e.to_string())
            } else {
                LookupError::UpstreamUnreachable(e.to_string())
            }
        })?;

        let Some(status_text) = status_field(&payload) else {
            return Err(LookupError::MalformedResponse(
                "no acf.maintenance_mode in first record".to_string(),
            ));
        };

        let flag = MaintenanceFlag::from_status(&status_text);
        debug!(endpoint = %endpoint, status = %status_text, flag = %flag, "Maintenance flag looked up");
        Ok(flag)
    }
}
