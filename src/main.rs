use clap::Parser;
use plccache::api::{start_api_server, ApiState};
use plccache::config::{Config, LoggingConfig};
use plccache::connection::DriverRegistry;
use plccache::pool::ConnectionPool;
use plccache::telemetry::TelemetryHistory;
use plccache::{PlcCacheError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "plccache")]
#[command(about = "Connection cache and pool for industrial protocol clients", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Generate example configuration file
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,

    /// Management API port (overrides config and enables the API)
    #[arg(long)]
    api_port: Option<u16>,

    /// Borrow a connection to ADDRESS once, ping it, print the cache stats and exit
    #[arg(long, value_name = "ADDRESS")]
    probe: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(config_path) = args.generate_config {
        println!("Generating example configuration file: {:?}", config_path);
        Config::create_example(&config_path)?;
        println!("Example configuration file created successfully!");
        println!("Edit the file and run: plccache --config {:?}", config_path);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(port) = args.api_port {
        config.api.enabled = true;
        config.api.bind_port = port;
    }
    config.validate()?;

    init_logging(&config.logging)?;
    info!("plccache v{} starting", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("No configuration file specified, using defaults"),
    }

    #[cfg(feature = "metrics")]
    plccache::cache::metrics::init();

    let telemetry = config.telemetry.enabled.then(|| {
        TelemetryHistory::new(config.telemetry.max_events, config.telemetry.retention_hours)
    });

    let mut builder = ConnectionPool::builder(DriverRegistry::with_builtin_drivers())
        .config(&config.cache);
    if let Some(history) = telemetry.clone() {
        builder = builder.telemetry(history);
    }
    let pool = Arc::new(builder.build());

    for address in &config.pool.prewarm {
        if let Err(e) = pool.prewarm(address) {
            warn!("Cannot prewarm {}: {}", address, e);
        }
    }

    if let Some(address) = args.probe {
        let result = probe(&pool, &address).await;
        pool.close();
        return result;
    }

    let api_task = if config.api.enabled {
        Some(start_api_server(&config.api, ApiState::new(Arc::clone(&pool), telemetry)).await?)
    } else {
        info!("Management API disabled");
        None
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    } else {
        info!("Received Ctrl+C, shutting down gracefully...");
    }

    pool.close();
    if let Some(task) = api_task {
        task.abort();
    }
    info!("Shutdown complete");

    Ok(())
}

async fn probe(pool: &ConnectionPool, address: &str) -> Result<()> {
    let connection = pool.get_connection(address).await?;
    info!("Borrowed {}", connection.connection_id());

    let ping = connection.ping().await;
    connection.close();
    ping?;

    let stats = pool
        .cache_stats(address)
        .ok_or_else(|| PlcCacheError::Config(format!("No cache for {}", address)))?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_new(&config.level)
        .map_err(|e| PlcCacheError::Config(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    Ok(())
}
