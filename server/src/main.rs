//! OBEX Alert Server - Main entry point.
//!
//! This binary starts the alert ingestion backend with:
//! - Structured JSON logging for production
//! - HTTP + WebSocket serving with graceful shutdown (SIGTERM/SIGINT)
//! - An MQTT ingestion thread, unless disabled
//!
//! # Configuration
//!
//! See [`obex_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Development mode (local broker, local database)
//! cargo run --bin obex-server
//!
//! # Production mode
//! OBEX_DATABASE_PATH=/var/lib/obex/obex.db \
//! OBEX_MQTT_HOST=broker.internal \
//! OBEX_MQTT_USERNAME=obex \
//! OBEX_MQTT_PASSWORD=secret \
//! PORT=8080 \
//! cargo run --release --bin obex-server
//! ```

use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use obex_server::config::Config;
use obex_server::mqtt::MqttIngest;
use obex_server::routes::{create_router, AppState};
use obex_server::store::AlertStore;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    init_logging();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                 - HTTP server port (default: 8080)");
            eprintln!("  OBEX_DATABASE_PATH   - SQLite database file (default: obex.db)");
            eprintln!("  OBEX_MQTT_HOST       - MQTT broker host (default: localhost)");
            eprintln!("  OBEX_MQTT_PORT       - MQTT broker port (default: 1883)");
            eprintln!("  OBEX_MQTT_USERNAME   - MQTT username (requires password)");
            eprintln!("  OBEX_MQTT_PASSWORD   - MQTT password (requires username)");
            eprintln!("  OBEX_MQTT_TOPIC      - Alert topic (default: obex/alerts)");
            eprintln!("  OBEX_MQTT_DISABLED   - Skip MQTT ingestion (set to 'true')");
            eprintln!("  OBEX_CACHE_PREFIX    - Cache key namespace (default: obex)");
            eprintln!("  OBEX_CACHE_TTL_SECS  - Default cache TTL (default: 3600)");
            eprintln!("  RUST_LOG             - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    info!(
        port = config.port,
        database = %config.database_path,
        mqtt_enabled = !config.mqtt.disabled,
        "OBEX alert server starting"
    );

    // Open the database
    let store = match AlertStore::open(&config.database_path).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, path = %config.database_path, "Failed to open database");
            return ExitCode::from(1);
        }
    };

    // Create application state
    let state = AppState::new(config.clone(), store);

    // Start MQTT ingestion unless disabled
    let mqtt = if config.mqtt.disabled {
        warn!("MQTT ingestion disabled by configuration");
        None
    } else {
        match MqttIngest::spawn(&config.mqtt, state.pipeline.clone(), Handle::current()) {
            Ok(ingest) => {
                info!(
                    host = %config.mqtt.host,
                    port = config.mqtt.port,
                    topic = %config.mqtt.topic,
                    "MQTT ingestion started"
                );
                Some(ingest)
            }
            Err(err) => {
                error!(error = %err, "Failed to start MQTT ingestion");
                return ExitCode::from(1);
            }
        }
    };

    // Create router
    let app = create_router(state);

    // Bind to address
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!(port = config.port, address = %bind_addr, "Server listening");
            listener
        }
        Err(err) => {
            error!(error = %err, address = %bind_addr, "Failed to bind to address");
            return ExitCode::from(1);
        }
    };

    // Start server with graceful shutdown
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    info!("Server ready to accept connections");

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    // Shutdown cleanup
    info!("Server shutting down gracefully");

    if let Some(mqtt) = mqtt {
        mqtt.stop();
        info!("MQTT ingestion stopped");
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Initialize structured logging with tracing.
///
/// Configures JSON-formatted output for production use with:
/// - Environment-based log level filtering via RUST_LOG
/// - Default log level of `info`
/// - Target and level information
fn init_logging() {
    // Build env filter from RUST_LOG or use default
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default: info level for our crates, debug for HTTP plumbing
        EnvFilter::new("info,tower_http=debug,axum::rejection=trace")
    });

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Creates a future that resolves when a shutdown signal is received.
///
/// Listens for:
/// - SIGTERM (container orchestrator shutdown)
/// - SIGINT (Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
