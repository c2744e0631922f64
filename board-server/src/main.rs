use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use board_server::boards::{BoardRegistry, BoardService};
use board_server::bus::{BusPublisher, InMemoryBus, MqttBus, MqttSettings};
use board_server::config::{AppConfig, config_path, load_config};
use board_server::discovery::{Discovery, availability_message};
use board_server::hub::UpdateHub;
use board_server::ingest::{run_ingest, snapshot_filter};
use board_server::poller::{Poller, PollerConfig};
use board_server::store::SnapshotStore;
use board_server::web::{AppState, create_router};
use board_server::wien::{WienClient, build_queries};

/// How long queued publishes may take to flush on shutdown.
const BROKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match load_config(config_path()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "board server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = SnapshotStore::new(&config.store.store_config());
    let boards = BoardService::new(Arc::new(BoardRegistry::new(config.boards.clone())), store.clone());
    let hub = UpdateHub::new(config.http.stream_capacity);

    let cancel = CancellationToken::new();

    // Subscribe before the poller starts so the first cycle is not missed.
    let filter = snapshot_filter(&config.bus.base_topic)?;
    let (publisher, subscription, broker) = match MqttSettings::from_config(&config.bus) {
        Some(settings) => {
            let will = availability_message(&config.bus.base_topic, false);
            let (bus, connection) = MqttBus::connect(&settings, Some(&will));
            let subscription = bus.subscribe(filter);
            let driver = tokio::spawn(connection.run(cancel.clone()));
            let publisher: Arc<dyn BusPublisher> = bus.clone();
            (publisher, subscription, Some((bus, driver)))
        }
        None => {
            info!("no broker host configured; using the in-process bus");
            let bus = Arc::new(InMemoryBus::with_capacity(config.bus.channel_capacity));
            let subscription = bus.subscribe(filter);
            let publisher: Arc<dyn BusPublisher> = bus;
            (publisher, subscription, None)
        }
    };

    let discovery = Discovery::new(publisher.clone(), boards.clone(), &config.bus);

    let ingest = tokio::spawn(run_ingest(
        subscription,
        store,
        hub.clone(),
        config.bus.base_topic.clone(),
        cancel.clone(),
    ));

    let queries = build_queries(&config.wien)?;
    if queries.is_empty() {
        warn!("no stop_ids or diva_ids configured; nothing to poll");
    }
    let client = WienClient::new(&config.wien)?;
    let poller = Poller::new(
        client,
        queries,
        publisher,
        PollerConfig::new(&config.bus, &config.wien),
    )
    .with_discovery(discovery.clone());
    let polling = tokio::spawn(poller.run(cancel.clone()));

    let announcer = match &broker {
        Some((bus, _)) => Some(tokio::spawn(
            discovery.clone().follow_connection(bus.connection(), cancel.clone()),
        )),
        None => {
            let announced = discovery.on_connected()?;
            info!(boards = announced, "discovery announced");
            None
        }
    };

    let state = AppState::new(boards, hub, Some(discovery.clone()), config.http.clone());
    let app = create_router(state, &config.http.static_dir);

    let addr = config.http.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "board server listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    let (polling, ingest) = tokio::join!(polling, ingest);
    report_exit("poller", polling);
    report_exit("ingest", ingest);
    if let Some(announcer) = announcer {
        report_exit("announcer", announcer.await);
    }

    if let Err(e) = discovery.publish_availability(false) {
        warn!(error = %e, "failed to publish offline availability");
    }

    if let Some((bus, driver)) = broker {
        if let Err(e) = bus.disconnect() {
            warn!(error = %e, "broker disconnect request failed");
        }
        match tokio::time::timeout(BROKER_SHUTDOWN_GRACE, driver).await {
            Ok(result) => {
                report_exit("broker", result);
            }
            Err(_) => warn!("broker did not disconnect in time"),
        }
    }
    Ok(())
}

/// Log how a background task ended; returns whether it ended cleanly.
fn report_exit(task: &str, result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!(task, error = %e, "background task failed");
            false
        }
    }
}
