use std::sync::Arc;

use anyhow::{Error, Result};
use notification_publisher::{
    api::{AppState, run_api_server},
    clients::{
        database::PgNotificationStore, memory::MemoryNotificationStore, rbmq::RabbitMqTransport,
        store::NotificationStore,
    },
    config::Config,
    publisher::Publisher,
    service::{NotificationService, ReconcileTask},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = Config::load()?;
    info!(
        exchange = %config.rabbitmq_exchange,
        routing_key = %config.rabbitmq_routing_key,
        "Configuration loaded"
    );

    let store: Arc<dyn NotificationStore> = match config.database_url() {
        Some(url) => {
            let store = PgNotificationStore::connect(url).await?;
            store.ensure_schema().await?;
            store.health_check().await?;
            info!("Connected to notification database");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL is not set, notification records are kept in memory only");
            Arc::new(MemoryNotificationStore::new())
        }
    };

    let transport = Arc::new(RabbitMqTransport::from_config(&config));
    let publisher = Arc::new(Publisher::start(transport, config.publisher_config()).await);
    let service = Arc::new(NotificationService::new(store, publisher.clone()));

    let reconcile_shutdown = CancellationToken::new();
    let reconcile_config = config.reconcile_config();
    let reconcile_handle = if reconcile_config.enabled {
        let task = ReconcileTask::new(service.clone(), reconcile_config);
        Some(tokio::spawn(task.run(reconcile_shutdown.clone())))
    } else {
        info!("Reconciliation is disabled");
        None
    };

    let state = Arc::new(AppState::new(service, publisher.clone()));

    if let Err(e) = run_api_server(&config, state, shutdown_signal()).await {
        error!(error = %e, "API server failed");
    }

    reconcile_shutdown.cancel();
    if let Some(handle) = reconcile_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Reconciliation task failed during shutdown");
        }
    }

    publisher.shutdown(config.shutdown_grace()).await;

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received terminate signal, initiating graceful shutdown"),
    }
}
