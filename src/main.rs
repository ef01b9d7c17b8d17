use anyhow::Result;
use clap::Parser;
use log::info;
use pothole_tracker::api::rest::{AppState, RestApi};
use pothole_tracker::config;
use pothole_tracker::db::repositories::PotholesRepository;
use pothole_tracker::db::DatabaseService;
use pothole_tracker::report::PdfReportGenerator;
use pothole_tracker::{DetectionService, RoboflowGateway};
use std::path::PathBuf;
use std::sync::Arc;

/// Pothole detection and road health reporting service
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a TOML or JSON configuration file
    #[arg(short, long, env = "POTHOLE_CONFIG")]
    config: Option<PathBuf>,
}

async fn run_app(args: Args) -> Result<()> {
    let mut config = config::load_config(args.config.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.api.log_level.as_str()),
    )
    .init();
    info!("Starting Pothole Tracker {}", env!("CARGO_PKG_VERSION"));

    config.resolve_secrets()?;
    info!("Configuration loaded");

    std::fs::create_dir_all(&config.storage.upload_dir)?;
    std::fs::create_dir_all(&config.storage.report_dir)?;

    let database = DatabaseService::new(&config.database).await?;
    let db_pool = database.pool.clone();

    let gateway = Arc::new(RoboflowGateway::new(&config.detection)?);
    info!(
        "Detection gateway ready: {} via {:?}",
        config.detection.api_url, config.detection.transport
    );

    let detection = Arc::new(DetectionService::new(
        gateway,
        PotholesRepository::new(db_pool.clone()),
        config.storage.upload_dir.clone(),
    ));

    let state = AppState {
        db_pool,
        detection,
        reports: Arc::new(PdfReportGenerator::new()),
        report_dir: config.storage.report_dir.clone(),
    };

    RestApi::new(&config.api, state).run().await
}

#[tokio::main]
async fn main() -> Result<()> {
    run_app(Args::parse()).await
}
