//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::config::Config;
use crate::site::{SiteState, create_app};
use crate::{Error, Result};

/// site-gate server
pub struct SiteGate {
    /// Configuration
    config: Config,
    /// Shared state handed to every request
    state: Arc<SiteState>,
}

impl SiteGate {
    /// Build the server and all of its components
    pub async fn new(config: Config) -> Result<Self> {
        #[allow(unused_mut)]
        let mut state = SiteState::from_config(&config).await?;

        #[cfg(feature = "metrics")]
        {
            match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
                Ok(handle) => state.metrics = Some(handle),
                Err(e) => warn!(error = %e, "Prometheus exporter not installed, /metrics disabled"),
            }
        }

        Ok(Self {
            config,
            state: Arc::new(state),
        })
    }

    /// Run until SIGINT/SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let app = create_app(Arc::clone(&self.state));
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("SITE GATE v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(origin = %self.config.origin.url, "Pass-through origin");

        match self.config.maintenance.endpoint() {
            Some(endpoint) => info!(
                endpoint = %endpoint,
                revalidate = ?self.config.maintenance.revalidate,
                page = %self.config.maintenance.page_path,
                "MAINTENANCE gate enabled"
            ),
            None => warn!("MAINTENANCE endpoint not configured - flag always unknown, gate passes everything"),
        }
        info!(
            patterns = ?self.state.gate.filter().patterns(),
            "Gate exclusions"
        );
        info!(origin = %self.state.seo.origin(), "Public site origin (robots/sitemap)");
        if self.config.favicon.source().is_none() {
            warn!("Favicon source not configured - /favicon.ico answers 204");
        }
        info!("============================================================");

        // Once a signal arrives, in-flight requests get `shutdown_timeout` to finish
        let shutdown_timeout = self.config.server.shutdown_timeout;
        let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(());
        });
        let mut server = tokio::spawn(async move { server.await });

        tokio::select! {
            result = &mut server => {
                result
                    .map_err(|e| Error::Internal(e.to_string()))?
                    .map_err(|e| Error::Internal(e.to_string()))?;
            }
            () = async {
                if signalled_rx.await.is_ok() {
                    tokio::time::sleep(shutdown_timeout).await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {
                warn!(timeout = ?shutdown_timeout, "Graceful shutdown timed out, dropping open connections");
                server.abort();
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
