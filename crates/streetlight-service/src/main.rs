//! Streetlight Service - Control loop and HTTP API.
//!
//! Run with: `cargo run -p streetlight-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use streetlight_service::simulator::{DEFAULT_STEP_INTERVAL, SimulatorState};
use streetlight_service::{AppState, Config, Controller, Links, app, simulator_app};
use streetlight_store::Store;

/// Streetlight Service - Control loop, cloud sync and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "streetlight-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Remote endpoint base URL, e.g. `http://192.168.0.136:3000/api`
    /// (overrides config).
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Do not start the control loop (API only mode).
    #[arg(long, global = true)]
    no_controller: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the controller in the foreground (default behavior).
    Run,

    /// Serve a simulated streetlight endpoint.
    Simulate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::Simulate) => run_simulator(args).await,
        Some(Command::Run) | None => run_server(args).await,
    }
}

fn init_logging() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("streetlight_service=info".parse()?)
                .add_directive("streetlight_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();
    Ok(())
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    init_logging()?;

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    // Override config with CLI args
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if let Some(remote) = args.remote {
        config.remote.url = Some(remote);
    }
    config.validate()?;

    // Open the database
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    // Collaborators
    let links = Links::from_config(&config)?;
    match &config.remote.url {
        Some(url) => info!("Remote endpoint: {}", url),
        None => info!("No remote endpoint configured, simulating readings"),
    }

    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::with_links(store, config, links);

    // Start the control loop
    if !args.no_controller {
        Controller::new(Arc::clone(&state)).start().await;
    } else {
        info!("Control loop disabled");
    }

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

async fn run_simulator(args: Args) -> anyhow::Result<()> {
    init_logging()?;

    let bind = args.bind.unwrap_or_else(|| "127.0.0.1:3000".to_string());
    let addr: SocketAddr = bind.parse()?;

    let state = SimulatorState::new();
    let _walk = state.spawn_walk(DEFAULT_STEP_INTERVAL);

    info!("Simulated streetlight listening on http://{}/api", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, simulator_app(state)).await?;

    Ok(())
}
