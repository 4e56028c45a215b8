//! Tollgate - Token issuing and session service

use anyhow::{Context, Result};
use axum::http::StatusCode;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod server;

use config::{Config, LedgerBackend, LogFormat};
use tollgate_api::{AppState, CookieSettings, create_router, with_request_tracing};
use tollgate_auth::TokenManager;
use tollgate_core::AuthService;
use tollgate_db::{Database, utils::is_memory_url};
use tollgate_ledger::{MemoryLedger, RedisLedger, SessionLedger};

/// How often expired in-memory sessions are swept
const MEMORY_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Tollgate - Token issuing and session service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "TOLLGATE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "TOLLGATE_PORT")]
    port: Option<u16>,

    /// Database URL
    #[arg(long, env = "TOLLGATE_DATABASE_URL")]
    database_url: Option<String>,

    /// Redis URL for the session ledger
    #[arg(long, env = "TOLLGATE_REDIS_URL")]
    redis_url: Option<String>,

    /// PEM file with the RSA signing key
    #[arg(long, env = "TOLLGATE_PRIVATE_KEY")]
    private_key: Option<String>,

    /// PEM file with the RSA public key
    #[arg(long, env = "TOLLGATE_PUBLIC_KEY")]
    public_key: Option<String>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        if let Some(url) = self.redis_url {
            config.ledger.redis_url = url;
        }
        if let Some(path) = self.private_key {
            config.tokens.private_key_path = path;
        }
        if let Some(path) = self.public_key {
            config.tokens.public_key_path = path;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration; command line and environment win over the file
    let config = resolve_config(args)?;

    // Initialize logging
    init_logging(&config.logging.level, config.logging.format);

    info!("Starting Tollgate v{}", env!("CARGO_PKG_VERSION"));

    // Initialize metrics recorder
    let metrics_handle = if config.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(Arc::new(handle))
    } else {
        None
    };

    // Initialize database
    ensure_database_dir(&config.database.url).await?;
    let db = Database::new(&config.database.url).await?;
    info!("{} accounts registered", db.count_accounts().await?);

    // Initialize session ledger
    let ledger = build_ledger(&config).await?;

    // Load signing keys
    let tokens = Arc::new(
        TokenManager::from_key_files(
            &config.tokens.private_key_path,
            &config.tokens.public_key_path,
        )
        .context("Failed to load token key pair")?,
    );

    // Initialize auth service
    let auth = AuthService::new(Arc::new(db), ledger, tokens, config.auth_settings())?;

    // Create application state
    let state = AppState::new(
        Arc::new(auth),
        CookieSettings {
            secure: config.cookie.secure,
            path: config.cookie.path.clone(),
        },
    );

    if !config.cookie.secure {
        warn!("Refresh cookie is issued without the Secure attribute");
    }

    // Create router
    let app = with_request_tracing(create_router(state, metrics_handle).layer(
        TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout()),
    ));

    // Determine bind address
    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .context("Invalid bind address")?;

    info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    server::serve(listener, app, config.idle_timeout(), shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}

/// File settings with command line and environment overrides applied
fn resolve_config(args: Args) -> Result<Config> {
    let mut config = Config::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Initialize logging
fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}

/// Create the parent directory of a file-backed SQLite database
async fn ensure_database_dir(url: &str) -> Result<()> {
    if is_memory_url(url) {
        return Ok(());
    }
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Build the configured session ledger
async fn build_ledger(config: &Config) -> Result<Arc<dyn SessionLedger>> {
    match config.ledger.backend {
        LedgerBackend::Redis => {
            let ledger = RedisLedger::connect(&config.ledger.redis_url)
                .await
                .context("Failed to connect to Redis")?;
            Ok(Arc::new(ledger))
        }
        LedgerBackend::Memory => {
            warn!("Using in-memory session ledger; sessions are lost on restart");
            let ledger = Arc::new(MemoryLedger::new());

            let sweeper = ledger.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(MEMORY_PURGE_INTERVAL);
                loop {
                    interval.tick().await;
                    let purged = sweeper.purge_expired();
                    if purged > 0 {
                        tracing::debug!("Purged {} expired sessions", purged);
                    }
                }
            });

            Ok(ledger as Arc<dyn SessionLedger>)
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_override_completes_file_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[ledger]\nbackend = \"redis\"\nredis_url = \"\"\n")
            .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = Args::parse_from(["tollgate", "--config", &path]);
        assert!(resolve_config(args).is_err());

        let args = Args::parse_from([
            "tollgate",
            "--config",
            &path,
            "--redis-url",
            "redis://cache:6379",
        ]);
        let config = resolve_config(args).unwrap();
        assert_eq!(config.ledger.redis_url, "redis://cache:6379");
    }

    #[test]
    fn test_port_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let args = Args::parse_from(["tollgate", "--config", path.to_str().unwrap(), "--port", "9100"]);
        assert_eq!(resolve_config(args).unwrap().server.port, 9100);
    }
}
