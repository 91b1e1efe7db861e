//! OBS Overlay - Entry Point
//!
//! Wires the connection supervisor, presentation state machine and session
//! coordinator together and serves the UI bridge.

use anyhow::Result;
use clap::Parser;
use obs_overlay::{
    coordinator::{CoordinatorSettings, SessionCoordinator},
    core::{config::Config, events::EventSender, store::JsonFileStore},
    remote::{MockRemote, ObsClient, RemoteService},
    session::ConnectionSupervisor,
    sync::{self, StateSyncChannel},
    window::{ChannelSurface, PresentationStateMachine, TransitionTiming},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "obs-overlay", about = "Recording overlay host for OBS Studio")]
struct Cli {
    /// Listen address for the UI bridge (overrides the config file)
    #[arg(long)]
    listen: Option<String>,

    /// Path to the config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not connect to OBS at startup
    #[arg(long)]
    no_connect: bool,

    /// Use a simulated OBS connection
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!("Starting OBS overlay host");

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let listen = cli.listen.unwrap_or_else(|| config.server.listen.clone());

    let store = Arc::new(JsonFileStore::open_default()?);
    info!("Settings stored in {}", store.path().display());

    let remote: Arc<dyn RemoteService> = if cli.offline {
        info!("Offline mode, using simulated OBS connection");
        Arc::new(MockRemote::accepting())
    } else {
        Arc::new(ObsClient::new())
    };

    let (events, events_rx) = EventSender::channel();
    let (host, ui) = StateSyncChannel::open();

    let supervisor = Arc::new(ConnectionSupervisor::new(
        remote,
        config.connection.timeout(),
        events.clone(),
    ));
    let presentation = PresentationStateMachine::new(
        Arc::new(ChannelSurface::new(host.notifier())),
        TransitionTiming::from(&config.presentation),
        events,
    );

    let mut settings = CoordinatorSettings::from(&config);
    settings.connect_on_start = !cli.no_connect;
    let coordinator = SessionCoordinator::new(
        supervisor,
        presentation,
        host,
        store,
        events_rx,
        settings,
    );

    let server = tokio::spawn(async move { sync::ws::serve(&listen, ui).await });
    let coordinator = tokio::spawn(coordinator.run());

    tokio::select! {
        result = server => result??,
        _ = coordinator => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
