use clap::Parser;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{debug, error, info};

use water_level_novelty::data::pegelonline::PegelonlineClient;
use water_level_novelty::server::config::ServerConfig;
use water_level_novelty::server::logging::init_logging;
use water_level_novelty::services::DashboardService;
use water_level_novelty::services::dashboard_service::{CacheTtls, WindowSizes};
use water_level_novelty::version::VERSION;
use water_level_novelty::web;

const CACHE_PURGE_INTERVAL_SECONDS: u64 = 5 * 60;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Manually check for --version before full parsing to keep the output short.
    if std::env::args().any(|arg| arg == "--version") {
        println!("Dashboard version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    // Logging depends on the configured log directory, so config errors go to stderr.
    let config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load dashboard configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!("Starting dashboard, version: {}", VERSION);

    let source = match PegelonlineClient::new(
        config.upstream_url.clone(),
        config.timeseries.clone(),
        config.request_timeout,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build upstream client: {}", e);
            return Err(e.into());
        }
    };
    let detector = config.detection.build_detector()?;
    info!(
        detector = detector.name(),
        upstream = %config.upstream_url,
        "Novelty detection configured."
    );

    let dashboard = Arc::new(DashboardService::new(
        source,
        detector,
        WindowSizes {
            reference: config.reference_window,
            prediction: config.prediction_window,
        },
        CacheTtls {
            station_data: config.station_data_ttl,
            detection: config.detection_ttl,
        },
    ));

    // --- Cache Purge Task ---
    let dashboard_for_purge = dashboard.clone();
    let purge_task = tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(CACHE_PURGE_INTERVAL_SECONDS));
        loop {
            interval.tick().await;
            let purged = dashboard_for_purge.purge_expired();
            if purged > 0 {
                debug!(count = purged, "Purged expired cache entries.");
            }
        }
    });

    let app = web::create_axum_router(dashboard, config.clone());

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("Dashboard listening on {}", config.listen_addr);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    purge_task.abort();

    if let Err(e) = result {
        error!("Dashboard server error: {}", e);
        return Err(e.into());
    }
    info!("Dashboard stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
