//! Maintenance gate middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Uri,
    middleware::Next,
    response::Response,
};
use site_gate_core::{GateDecision, MaintenanceFlag, decide};
use tracing::{debug, info};

use super::cache::FlagCache;
use super::matcher::RouteFilter;
use crate::config::MaintenanceConfig;
use crate::{Error, Result};

/// Per-request maintenance decision, shared by every request
pub struct MaintenanceGate {
    filter: RouteFilter,
    flags: FlagCache,
    maintenance_path: String,
    maintenance_uri: Uri,
}

impl MaintenanceGate {
    /// Create a gate for `maintenance_path`
    pub fn new(filter: RouteFilter, flags: FlagCache, maintenance_path: &str) -> Result<Self> {
        let maintenance_uri = maintenance_path
            .parse::<Uri>()
            .map_err(|e| Error::Config(format!("maintenance page path '{maintenance_path}': {e}")))?;

        Ok(Self {
            filter,
            flags,
            maintenance_path: maintenance_path.to_string(),
            maintenance_uri,
        })
    }

    /// Create from the `maintenance` config section and a ready flag cache
    pub fn from_config(config: &MaintenanceConfig, flags: FlagCache) -> Result<Self> {
        let filter = RouteFilter::new(&config.exclude, &config.page_path)?;
        Self::new(filter, flags, &config.page_path)
    }

    /// Decide what to do with a request for `path`.
    ///
    /// Excluded paths return before any lookup.
    pub async fn evaluate(&self, path: &str) -> GateDecision {
        if self.filter.is_excluded(path) {
            return GateDecision::PassThrough;
        }

        let flag = self.flags.current().await;
        decide(flag, path, &self.maintenance_path)
    }

    /// Maintenance page route
    #[must_use]
    pub fn maintenance_path(&self) -> &str {
        &self.maintenance_path
    }

    /// Last known flag, without a lookup
    #[must_use]
    pub fn last_flag(&self) -> Option<MaintenanceFlag> {
        self.flags.peek()
    }

    /// Flag cache behind this gate
    #[must_use]
    pub fn flags(&self) -> &FlagCache {
        &self.flags
    }

    /// Exclusion set in use
    #[must_use]
    pub fn filter(&self) -> &RouteFilter {
        &self.filter
    }
}

/// Maintenance gate middleware.
///
/// Must wrap the router it rewrites for (see `site::create_app`), not sit
/// inside it, so the rewritten URI is what gets routed.
pub async fn maintenance_gate(
    State(gate): State<Arc<MaintenanceGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    match gate.evaluate(request.uri().path()).await {
        GateDecision::Rewrite => {
            info!(
                method = %request.method(),
                path = %request.uri().path(),
                to = %gate.maintenance_path,
                "Under maintenance, rewriting"
            );
            telemetry_metrics::counter!("site_gate_decisions_total", "decision" => "rewrite")
                .increment(1);
            // Only the path survives the rewrite; the query is dropped
            *request.uri_mut() = gate.maintenance_uri.clone();
        }
        GateDecision::PassThrough => {
            debug!(path = %request.uri().path(), "Gate pass-through");
            telemetry_metrics::counter!("site_gate_decisions_total", "decision" => "pass")
                .increment(1);
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintenance::cache::tests::{FakeSource, ManualClock};
    use crate::maintenance::{Clock, FlagSource};
    use std::time::Duration;

    fn gate_with(answer: Option<MaintenanceFlag>) -> (MaintenanceGate, Arc<FakeSource>) {
        let source = Arc::new(FakeSource::new(answer));
        let flags = FlagCache::with_clock(
            Arc::clone(&source) as Arc<dyn FlagSource>,
            Duration::from_secs(30),
            Arc::new(ManualClock::new()) as Arc<dyn Clock>,
        );
        let gate = MaintenanceGate::from_config(&MaintenanceConfig::default(), flags).unwrap();
        (gate, source)
    }

    #[tokio::test]
    async fn test_excluded_paths_never_look_up() {
        let (gate, source) = gate_with(Some(MaintenanceFlag::UnderMaintenance));

        for path in ["/_next/static/app.js", "/favicon.ico", "/api/favicon", "/maintenance"] {
            assert_eq!(gate.evaluate(path).await, GateDecision::PassThrough, "{path}");
        }
        assert_eq!(source.calls(), 0);
        assert_eq!(gate.last_flag(), None);
    }

    #[tokio::test]
    async fn test_rewrites_under_maintenance() {
        let (gate, source) = gate_with(Some(MaintenanceFlag::UnderMaintenance));

        assert_eq!(gate.evaluate("/about-us").await, GateDecision::Rewrite);
        assert_eq!(gate.evaluate("/contact-us").await, GateDecision::Rewrite);
        // One lookup, second answer from the cache
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_lookalike_paths_are_rewritten() {
        let (gate, _) = gate_with(Some(MaintenanceFlag::UnderMaintenance));
        assert_eq!(gate.evaluate("/maintenance-schedule").await, GateDecision::Rewrite);
        assert_eq!(gate.evaluate("/maintenance/logo.svg").await, GateDecision::PassThrough);

        let config = MaintenanceConfig {
            page_path: "/down".to_string(),
            ..MaintenanceConfig::default()
        };
        let flags = FlagCache::with_clock(
            Arc::new(FakeSource::new(Some(MaintenanceFlag::UnderMaintenance))) as Arc<dyn FlagSource>,
            Duration::from_secs(30),
            Arc::new(ManualClock::new()) as Arc<dyn Clock>,
        );
        let gate = MaintenanceGate::from_config(&config, flags).unwrap();
        assert_eq!(gate.evaluate("/downloads").await, GateDecision::Rewrite);
        assert_eq!(gate.evaluate("/down").await, GateDecision::PassThrough);
    }

    #[tokio::test]
    async fn test_passes_when_active_or_unknown() {
        let (active, _) = gate_with(Some(MaintenanceFlag::Active));
        assert_eq!(active.evaluate("/about-us").await, GateDecision::PassThrough);

        let (unknown, _) = gate_with(None);
        assert_eq!(unknown.evaluate("/about-us").await, GateDecision::PassThrough);
        assert_eq!(unknown.last_flag(), Some(MaintenanceFlag::Unknown));
    }

    #[tokio::test]
    async fn test_evaluation_is_idempotent_with_cached_flag() {
        let (gate, _) = gate_with(Some(MaintenanceFlag::UnderMaintenance));

        let first = gate.evaluate("/success-stories").await;
        let second = gate.evaluate("/success-stories").await;
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_unparseable_path() {
        let flags = FlagCache::new(
            Arc::new(FakeSource::new(None)) as Arc<dyn FlagSource>,
            Duration::from_secs(30),
        );
        let filter = RouteFilter::new::<&str>(&[], "/maintenance").unwrap();
        assert!(MaintenanceGate::new(filter, flags, "/bad path").is_err());
    }
}
