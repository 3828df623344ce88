//! Server entry point: wiring, hosted services and graceful shutdown.

use std::sync::Arc;

use api::config::Config;
use bus::{AmqpEventBus, EventBus, InMemoryEventBus};
use inventory::InventoryEngine;
use saga::{ConsumerDeps, SimulatedPaymentProcessor, SimulatedRefundGateway};
use store::{
    IdempotencyStore, InMemoryIdempotencyStore, InMemoryOrderStore, OrderStore,
    PostgresIdempotencyStore, PostgresOrderStore,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
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

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();
    let shutdown = CancellationToken::new();

    // 3. Stores: Postgres when configured, in-memory otherwise
    let (order_store, idempotency_store): (Arc<dyn OrderStore>, Arc<dyn IdempotencyStore>) =
        match &config.orders_conn {
            Some(conn) => {
                let pool = store::connect_pool(conn, config.db_max_connections)
                    .await
                    .expect("failed to connect to database");
                let orders = PostgresOrderStore::new(pool.clone());
                orders
                    .run_migrations()
                    .await
                    .expect("failed to run migrations");
                (Arc::new(orders), Arc::new(PostgresIdempotencyStore::new(pool)))
            }
            None => {
                tracing::warn!("ORDERS_CONN not set, orders are not durable");
                (
                    Arc::new(InMemoryOrderStore::new()),
                    Arc::new(InMemoryIdempotencyStore::new()),
                )
            }
        };

    // 4. Bus: AMQP when configured, in-memory otherwise
    let bus: Arc<dyn EventBus> = match &config.amqp {
        Some(amqp) => {
            let bus = AmqpEventBus::connect(amqp, shutdown.clone())
                .await
                .expect("failed to connect to RabbitMQ");
            bus.declare_exchanges()
                .await
                .expect("failed to declare exchanges");
            Arc::new(bus)
        }
        None => {
            tracing::warn!("RABBITMQ_HOST not set, using in-memory bus");
            Arc::new(InMemoryEventBus::new())
        }
    };

    let engine = Arc::new(InventoryEngine::new());

    // 5. Hosted services: consumers + TTL sweeper
    if config.disable_hosted_services {
        tracing::warn!("hosted services disabled, consumers and sweeper not started");
    } else {
        saga::start_consumers(ConsumerDeps {
            orders: order_store.clone(),
            inventory: engine.clone(),
            bus: bus.clone(),
            payments: Arc::new(SimulatedPaymentProcessor::new()),
            refunds: Arc::new(SimulatedRefundGateway::new()),
            reservation_ttl: chrono::Duration::seconds(config.inventory_ttl_seconds as i64),
        })
        .await
        .expect("failed to start consumers");

        tokio::spawn(inventory::sweeper::run(engine.clone(), shutdown.clone()));
    }

    // 6. HTTP surface
    let state = Arc::new(api::AppState::new(
        order_store,
        idempotency_store,
        bus,
        engine,
    ));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");

    let shutdown_for_server = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_for_server.cancel();
        })
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
