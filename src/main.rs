//! Property Mock API - CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use property_mock_api::{MockApiConfig, MockApiServer, RecordStore};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "property-mock-api",
    about = "Mock property listing API with query filtering and booking simulation",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-api.yaml")]
    config: PathBuf,

    /// JSON data file (overrides the configuration)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Listening port (overrides the configuration)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Listening address (overrides the configuration)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../config/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load configuration
    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockApiConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        MockApiConfig::default()
    };

    if let Some(data) = args.data {
        config.data.path = data;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    config.validate()?;
    if args.validate {
        println!(
            "Configuration is valid (data file: {})",
            config.data.path.display()
        );
        return Ok(());
    }

    // A missing or corrupt data file is fatal
    let store = RecordStore::from_file(&config.data.path, config.settings.id_field.clone())
        .await
        .with_context(|| format!("failed to load data from {}", config.data.path.display()))?;

    MockApiServer::new(config, Arc::new(store)).serve().await
}
