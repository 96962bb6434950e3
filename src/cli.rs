//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Maintenance-aware edge gateway for a headless-CMS driven website
#[derive(Parser, Debug)]
#[command(name = "site-gate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "SITE_GATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "SITE_GATE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "SITE_GATE_HOST")]
    pub host: Option<String>,

    /// Content-source endpoint carrying the maintenance flag
    #[arg(long, env = "WP_MAINTENANCE_ENDPOINT", global = true)]
    pub maintenance_endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "SITE_GATE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "SITE_GATE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Look up the maintenance flag once and print it
    Flag {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}
