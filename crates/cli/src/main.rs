//! `consult-relay`: webhook server wiring the channel bridge to the
//! consultation backend.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use {
    anyhow::Context,
    clap::Parser,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    consult_backend::BackendClient,
    consult_channels::Allowlist,
    consult_router::MessageRouter,
    consult_sessions::SessionStore,
    consult_webhook::{AppState, HttpTransport, serve},
};

/// Hard eviction cadence for idle sessions.
const SWEEP_PERIOD: Duration = Duration::from_secs(300);
/// Session counter log cadence.
const STATS_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "consult-relay", version, about = "Messaging relay for remote consultations")]
struct Cli {
    /// Base URL of the chat and vision backend.
    #[arg(long, env = "RELAY_BACKEND_URL", default_value = "http://localhost:3000")]
    backend_url: String,

    /// Base URL of the channel bridge (reply sink and media source).
    #[arg(long, env = "RELAY_TRANSPORT_URL", default_value = "http://localhost:3100")]
    transport_url: String,

    /// Address for the inbound webhook listener.
    #[arg(long, env = "RELAY_BIND", default_value = "127.0.0.1:8090")]
    bind: SocketAddr,

    /// Idle minutes before a session's history resets.
    #[arg(long, env = "RELAY_SESSION_EXPIRY_MINUTES", default_value_t = consult_sessions::DEFAULT_EXPIRY_MINUTES)]
    session_expiry_minutes: u64,

    /// Comma-separated E.164 numbers admitted to the relay; empty admits all.
    #[arg(long, env = "RELAY_ALLOWLIST", default_value = "")]
    allowlist: String,

    /// Session snapshot file.
    #[arg(long, env = "RELAY_SESSION_FILE", default_value = "./relay_sessions.json")]
    session_file: PathBuf,

    /// Per-request backend timeout in seconds.
    #[arg(long, env = "RELAY_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    request_timeout_secs: u64,

    /// Log filter when RUST_LOG is unset.
    #[arg(long, env = "RELAY_LOG", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "RELAY_JSON_LOGS")]
    json_logs: bool,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(
        backend = %cli.backend_url,
        transport = %cli.transport_url,
        bind = %cli.bind,
        expiry_minutes = cli.session_expiry_minutes,
        "starting consult-relay"
    );

    let store = SessionStore::new(
        Duration::from_secs(cli.session_expiry_minutes * 60),
        Some(cli.session_file.clone()),
    );
    let allowlist = Allowlist::from_config_str(&cli.allowlist);
    let backend = BackendClient::new(
        &cli.backend_url,
        Duration::from_secs(cli.request_timeout_secs),
    )
    .context("building backend client")?;

    match backend.health_check().await {
        Ok(true) => info!("backend health check passed"),
        Ok(false) => warn!("backend answered the health probe unexpectedly, continuing"),
        Err(e) => warn!(error = %e, "backend unreachable at startup, continuing"),
    }

    let router = Arc::new(MessageRouter::new(store.clone(), allowlist, backend));
    let state = AppState {
        router,
        transport: Arc::new(HttpTransport::new(&cli.transport_url)),
    };

    spawn_timers(store.clone());

    tokio::select! {
        result = serve(cli.bind, state) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        },
    }

    // Write the final state out even if a debounced save was still pending.
    store.flush();
    info!("sessions flushed, exiting");
    Ok(())
}

/// Periodic eviction of idle sessions and a stats heartbeat.
fn spawn_timers(store: SessionStore) {
    let sweeper = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_PERIOD);
        interval.tick().await;
        loop {
            interval.tick().await;
            sweeper.sweep();
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_PERIOD);
        interval.tick().await;
        loop {
            interval.tick().await;
            let stats = store.stats();
            info!(total = stats.total, active = stats.active, "session stats");
        }
    });
}
