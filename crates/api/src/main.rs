//! API server entry point.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use api::config::{Config, LogFormat};
use lifecycle::{LogNotifier, RetryPolicy, SignatureVerifier, spawn_notification_worker};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn Error + Send + Sync>;

/// How long pending notifications may run after the server stops.
const NOTIFY_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
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
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick the store and run
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections).await?;
            store.run_migrations().await?;
            tracing::info!("using Postgres store");
            serve(store, config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            serve(InMemoryStore::new(), config, metrics_handle).await
        }
    }
}

async fn serve<S: Store>(
    store: S,
    config: Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    if config.seed_demo_catalog {
        api::seed::seed_demo_catalog(&store).await?;
    }

    // Notification worker
    let (queue, worker) = spawn_notification_worker(
        store.clone(),
        Arc::new(LogNotifier),
        RetryPolicy::new(config.notify_max_retries, config.notify_backoff()),
        config.notify_queue_capacity,
    );

    let signature = SignatureVerifier::new(config.webhook_secret.clone());
    if !signature.is_enabled() {
        tracing::warn!("WEBHOOK_SECRET not set, webhook signatures are not checked");
    }

    let state = Arc::new(
        api::AppState::new(store, Some(queue))
            .with_signature(signature)
            .with_default_provider(config.payment_provider_default.clone()),
    );
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last queue handle; the worker now drains.
    match tokio::time::timeout(NOTIFY_DRAIN_TIMEOUT, worker).await {
        Ok(joined) => joined?,
        Err(_) => tracing::warn!("notification worker still busy at shutdown, abandoning"),
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
