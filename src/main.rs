//! Notification Dispatcher
//!
//! Consumes domain events from the broker and turns them into
//! notifications:
//! - routing-key based decoding and recipient resolution
//! - delivery through a circuit-breaker protected gateway
//! - tenant escalation for urgent alerts
//! - an append-only audit record per attempt

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use validator::Validate;

use api::{router, AppState};
use audit_store::{AuditClient, AuditConfig, AuditLogger, AuditSink, ClickHouseAuditStore, TracingAuditSink};
use broker::{BrokerConfig, BrokerConnectionManager, ReconnectPolicy};
use dispatcher::{EventRouter, RouterConfig};
use gateway::{
    BreakerConfig, CircuitBreaker, GatewayConfig, HttpDeliveryGateway, ProfileConfig,
    TenantConfigResolver,
};
use telemetry::{health, init_tracing_from_env};

/// Operational HTTP listener.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct HttpConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    http: HttpConfig,

    #[serde(default)]
    broker: BrokerConfig,

    #[serde(default)]
    reconnect: ReconnectPolicy,

    #[serde(default)]
    gateway: GatewayConfig,

    /// Applied to both the delivery and the profile breaker
    #[serde(default)]
    breaker: BreakerConfig,

    #[serde(default)]
    profile: ProfileConfig,

    #[serde(default)]
    router: RouterConfig,

    #[serde(default)]
    audit: AuditConfig,

    /// Hard limit on graceful shutdown before exiting non-zero
    #[serde(default = "default_shutdown_timeout_secs")]
    shutdown_timeout_secs: u64,
}

fn default_shutdown_timeout_secs() -> u64 {
    15
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Notification Dispatcher v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    config
        .gateway
        .validate()
        .context("Invalid gateway configuration")?;
    config
        .profile
        .validate()
        .context("Invalid profile configuration")?;

    info!(
        exchange = %config.broker.exchange,
        queue = %config.broker.queue,
        bindings = ?config.broker.routing_keys,
        urgent_auto_send = config.router.urgent_auto_send,
        "Loaded configuration"
    );

    // Outbound dependencies, one breaker each
    let delivery_breaker = Arc::new(CircuitBreaker::new("delivery", config.breaker.clone()));
    let profile_breaker = Arc::new(CircuitBreaker::new("profile", config.breaker.clone()));

    let delivery = Arc::new(
        HttpDeliveryGateway::new(config.gateway.clone(), delivery_breaker.clone())
            .context("Failed to create delivery gateway")?,
    );
    let directory = Arc::new(
        TenantConfigResolver::new(&config.profile)
            .context("Failed to create tenant config resolver")?
            .with_breaker(profile_breaker.clone()),
    );

    let audit = AuditLogger::new(build_audit_sink(&config.audit).await?);

    let event_router = Arc::new(EventRouter::new(
        config.router.clone(),
        delivery,
        directory,
        audit,
    ));

    // Broker: a failed first connect is retried in the background
    let broker = BrokerConnectionManager::from_config(&config.broker, config.reconnect.clone());
    if let Err(e) = broker.connect().await {
        error!(error = %e, "Failed to connect to broker");
    }
    // Registers the handler even without a session; the reconnect loop resumes with it.
    if let Err(e) = broker.start_consuming(event_router.clone()).await {
        error!(error = %e, "Broker unavailable at startup, reconnecting in background");
        broker.trigger_reconnect();
    }

    // Operational HTTP surface
    let state = AppState::new(broker.clone()).with_breakers(vec![delivery_breaker, profile_breaker]);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    shutdown_signal().await;

    // Cleanup
    info!("Shutting down...");
    let _ = stop_tx.send(true);

    let timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let graceful = async {
        broker.shutdown().await;
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "HTTP server error"),
            Err(e) => error!(error = %e, "HTTP server task failed"),
        }
    };

    if tokio::time::timeout(timeout, graceful).await.is_err() {
        error!(
            timeout_secs = config.shutdown_timeout_secs,
            "Graceful shutdown timed out, exiting"
        );
        std::process::exit(1);
    }

    info!("Shutdown complete");
    Ok(())
}

/// ClickHouse when enabled, log-only otherwise.
async fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>> {
    if !config.enabled {
        warn!("Audit store disabled, attempts are only logged");
        health().audit.set_healthy();
        return Ok(Arc::new(TracingAuditSink));
    }

    let client = AuditClient::new(config.clone()).context("Failed to create audit store client")?;

    if config.init_schema {
        if let Err(e) = audit_store::schema::init_schema(&client).await {
            error!("Failed to initialize audit schema: {}", e);
            // Continue anyway - schema might already exist
        }
    }

    if audit_store::health::check_connection(&client).await {
        info!("Audit store connection: healthy");
    } else {
        error!("Audit store connection: unhealthy");
    }

    Ok(Arc::new(ClickHouseAuditStore::new(client)))
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("DISPATCHER")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Flat overrides for URLs and secrets; nested parsing trips over
    // underscored field names.
    if let Ok(url) = std::env::var("DISPATCHER_AMQP_URL") {
        config.broker.amqp_url = url;
    }
    if let Ok(url) = std::env::var("DISPATCHER_GATEWAY_URL") {
        config.gateway.base_url = url;
    }
    if let Ok(key) = std::env::var("DISPATCHER_GATEWAY_API_KEY") {
        config.gateway.api_key = key;
    }
    if let Ok(url) = std::env::var("DISPATCHER_PROFILE_URL") {
        config.profile.base_url = url;
    }
    if let Ok(key) = std::env::var("DISPATCHER_PROFILE_API_KEY") {
        config.profile.api_key = key;
    }

    if let Ok(url) = std::env::var("DISPATCHER_CLICKHOUSE_URL") {
        config.audit.url = url;
    }
    if let Ok(database) = std::env::var("DISPATCHER_CLICKHOUSE_DATABASE") {
        config.audit.database = database;
    }
    if let Ok(username) = std::env::var("DISPATCHER_CLICKHOUSE_USERNAME") {
        config.audit.username = Some(username);
    }
    if let Ok(password) = std::env::var("DISPATCHER_CLICKHOUSE_PASSWORD") {
        config.audit.password = Some(password);
    }

    if let Ok(statuses) = std::env::var("DISPATCHER_NOTIFY_STATUSES") {
        config.router.notify_statuses = statuses
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(recipient) = std::env::var("DISPATCHER_DEFAULT_ESCALATION_RECIPIENT") {
        config.router.default_escalation_recipient = Some(recipient);
    }
    if let Ok(flag) = std::env::var("DISPATCHER_URGENT_AUTO_SEND") {
        config.router.urgent_auto_send = flag == "1" || flag.eq_ignore_ascii_case("true");
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
