//! API server entry point.

use api::config::Config;
use issuance::{
    AgentConfig, CallbackNotificationService, CourierBookingAgent, CourierConfig,
    HttpCourierService, IssuanceConfig, OutboxConfig, OutboxSignal, OutboxWorker,
};
use metrics_exporter_prometheus::PrometheusHandle;
use policy_store::{InMemoryPolicyStore, PgPolicyStore, PolicyStore, ReferenceData};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

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

/// Starts the outbox worker and serves HTTP until shutdown.
async fn run<S: PolicyStore + Clone + 'static>(
    store: S,
    config: &Config,
    issuance_config: IssuanceConfig,
    metrics_handle: PrometheusHandle,
) {
    let signal = OutboxSignal::new();

    let courier_config = CourierConfig::from_env();
    let agent_config = AgentConfig::from_env();
    let outbox_config = OutboxConfig::from_env()
        .with_lease_covering(courier_config.timeout, agent_config.callback_timeout);
    let worker = if outbox_config.enabled {
        let agent = CourierBookingAgent::new(
            store.clone(),
            HttpCourierService::new(&courier_config),
            CallbackNotificationService::new(agent_config.callback_timeout),
            courier_config,
            agent_config,
        );
        Some(OutboxWorker::new(store.clone(), agent, signal.clone(), outbox_config).spawn())
    } else {
        tracing::warn!("outbox worker disabled, courier bookings will queue up");
        None
    };

    let state = api::create_default_state(store, issuance_config, signal);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    if let Some(worker) = worker {
        worker.abort();
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    api::describe_metrics();

    // 3. Pick the store and serve
    let issuance_config = IssuanceConfig::from_env();
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store =
                PgPolicyStore::new(pool).with_statement_timeout(issuance_config.transaction_timeout);
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL policy store");
            run(store, &config, issuance_config, metrics_handle).await;
        }
        None => {
            let path = config
                .reference_data_path
                .as_deref()
                .expect("REFERENCE_DATA_PATH is required when DATABASE_URL is not set");
            let json = tokio::fs::read_to_string(path)
                .await
                .expect("failed to read reference data");
            let data = ReferenceData::from_json(&json).expect("invalid reference data");

            let store = InMemoryPolicyStore::new();
            store.seed(data).await;
            tracing::warn!(path, "DATABASE_URL not set, using in-memory policy store");
            run(store, &config, issuance_config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
