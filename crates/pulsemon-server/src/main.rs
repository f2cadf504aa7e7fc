use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

use pulsemon_notify::{Dispatcher, TransportRegistry};
use pulsemon_server::config::ServerConfig;
use pulsemon_server::reports::Reporter;
use pulsemon_server::sendalerts::SendAlerts;
use pulsemon_server::api;
use pulsemon_server::state::AppState;
use pulsemon_storage::{BodyStore, MonitorStore};

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  pulsemon-server serve [config.toml]                       Run intake API + alerting loop");
    eprintln!("  pulsemon-server sendalerts [config.toml] [--num-workers N] [--pool]");
    eprintln!("                                                            Run the alerting loop alone");
    eprintln!("  pulsemon-server sendreports [config.toml] [--loop]        Send project status reports");
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulsemon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => run_serve(config_path(&args)).await,
        Some("sendalerts") => {
            let num_workers = flag_value(&args, "--num-workers");
            let pool = args.iter().any(|a| a == "--pool");
            run_sendalerts(config_path(&args), num_workers, pool).await
        }
        Some("sendreports") => {
            let run_loop = args.iter().any(|a| a == "--loop");
            run_sendreports(config_path(&args), run_loop).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            Err(anyhow::anyhow!("unknown command"))
        }
    }
}

fn config_path(args: &[String]) -> &str {
    args.get(2)
        .filter(|a| !a.starts_with("--"))
        .map(|s| s.as_str())
        .unwrap_or("config/pulsemon.toml")
}

fn flag_value(args: &[String], flag: &str) -> Option<usize> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}

/// Install SIGINT/SIGTERM handlers that flip the shared shutdown flag.
fn spawn_signal_listener(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let ctrl_c = signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("installing SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("Shutdown signal received, finishing...");
        shutdown.store(true, Ordering::Relaxed);
    });
}

async fn build_components(
    config: &ServerConfig,
    num_workers: Option<usize>,
    max_connections: u32,
) -> Result<(Arc<MonitorStore>, Arc<BodyStore>, Dispatcher)> {
    let store = Arc::new(MonitorStore::connect_with(&config.db_url, max_connections).await?);
    let body_store = Arc::new(BodyStore::open(&config.body_dir)?);
    let registry = TransportRegistry::with_builtins(config.smtp_settings());
    let dispatcher = Dispatcher::new(
        store.clone(),
        registry,
        &config.site_root,
        num_workers.unwrap_or(config.alerting.num_workers),
    )
    .with_body_store(body_store.clone());
    Ok((store, body_store, dispatcher))
}

async fn run_sendalerts(
    config_path: &str,
    num_workers: Option<usize>,
    pool: bool,
) -> Result<()> {
    let config = ServerConfig::load_or_default(config_path)?;
    tracing::info!(
        db = %config.db_url,
        num_workers = num_workers.unwrap_or(config.alerting.num_workers),
        pool,
        "sendalerts starting"
    );

    let (store, _body_store, dispatcher) =
        build_components(&config, num_workers, if pool { 10 } else { 5 }).await?;
    let loop_ = SendAlerts::new(store, dispatcher, config.alerting.tick_secs);

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(shutdown.clone());
    loop_.run(shutdown).await
}

async fn run_sendreports(config_path: &str, run_loop: bool) -> Result<()> {
    let config = ServerConfig::load_or_default(config_path)?;
    let store = Arc::new(MonitorStore::connect(&config.db_url).await?);
    let reporter = Reporter::new(
        store,
        config.smtp_settings(),
        config.reports.recipients.clone(),
    );

    if run_loop {
        let shutdown = Arc::new(AtomicBool::new(false));
        spawn_signal_listener(shutdown.clone());
        reporter
            .run_loop(config.reports.interval_secs, shutdown)
            .await
    } else {
        reporter.run_once(chrono::Utc::now()).await
    }
}

async fn run_serve(config_path: &str) -> Result<()> {
    let config = ServerConfig::load_or_default(config_path)?;
    tracing::info!(
        port = config.port,
        db = %config.db_url,
        site_root = %config.site_root,
        "pulsemon-server starting"
    );

    let (store, body_store, dispatcher) = build_components(&config, None, 5).await?;
    let state = AppState {
        store: store.clone(),
        body_store,
        ping_endpoint: config.ping_endpoint.clone(),
    };

    // Alerting loop alongside the intake API.
    let alerts = SendAlerts::new(store.clone(), dispatcher, config.alerting.tick_secs);
    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(shutdown.clone());
    let alerts_shutdown = shutdown.clone();
    let alerts_handle = tokio::spawn(async move { alerts.run(alerts_shutdown).await });

    // Hourly housekeeping: expired flips and stale ping bodies.
    let cleanup_store = store.clone();
    let cleanup_handle = tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(3600));
        loop {
            tick.tick().await;
            match cleanup_store.prune_expired_flips(chrono::Utc::now()).await {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "Pruned expired flips")
                }
                Err(e) => tracing::error!(error = %e, "Flip pruning failed"),
                _ => {}
            }
        }
    });

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = api::build_router(state);
    tracing::info!(http = %addr, "Server started");

    let serve_shutdown = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        while !serve_shutdown.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
    .await?;

    // Let the alerting loop notice the flag and finish its cycle.
    let _ = tokio::time::timeout(Duration::from_secs(10), alerts_handle).await;
    cleanup_handle.abort();
    tracing::info!("Server stopped");
    Ok(())
}
