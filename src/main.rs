//! site-gate - maintenance-aware edge gateway for a headless-CMS site

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tracing::error;

use site_gate::{
    cli::{Cli, Command},
    config::Config,
    maintenance::{FlagSource, HttpFlagSource, MaintenanceFlag},
    server::SiteGate,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Flag { json }) => run_flag(&config, json).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Load config and apply CLI overrides
fn load_config(cli: &Cli) -> site_gate::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host.clone_from(host);
    }
    if let Some(ref endpoint) = cli.maintenance_endpoint {
        config.maintenance.endpoint.clone_from(endpoint);
    }

    Ok(config)
}

/// Look up the flag once, bypassing the cache
async fn run_flag(config: &Config, as_json: bool) -> ExitCode {
    let source = match HttpFlagSource::from_config(&config.maintenance) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = source.fetch().await;
    let flag = result.as_ref().map_or(MaintenanceFlag::Unknown, |f| *f);

    if as_json {
        let error = result.as_ref().err().map(|e| {
            json!({
                "kind": e.kind(),
                "message": e.to_string(),
            })
        });
        println!(
            "{}",
            json!({
                "endpoint": config.maintenance.endpoint(),
                "flag": flag,
                "error": error,
            })
        );
    } else {
        println!("Maintenance flag: {flag}");
        match &result {
            Ok(_) => {
                if flag.is_under_maintenance() {
                    println!("   Requests are rewritten to {}", config.maintenance.page_path);
                } else {
                    println!("   Requests pass through");
                }
            }
            Err(e) => {
                println!("   Lookup failed ({}): {e}", e.kind());
                println!("   Requests pass through (fail-open)");
            }
        }
    }

    ExitCode::SUCCESS
}

/// Run the gateway server
async fn run_server(config: Config) -> ExitCode {
    let gate = match SiteGate::new(config).await {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to start site-gate: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gate.run().await {
        error!("site-gate error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
