use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use meshgarden::db::services::reading_service::{init_db, PgReadingStore};
use meshgarden::decisions::{DecisionStore, ThresholdEngine};
use meshgarden::nodes::NodeRegistry;
use meshgarden::server::config::AppConfig;
use meshgarden::server::pipeline::Pipeline;
use meshgarden::version::VERSION;
use meshgarden::weather::service::WeatherService;
use meshgarden::web::create_axum_router;

#[derive(Parser)]
#[command(version = VERSION, about = "Sensor telemetry decision server")]
struct Args {
    /// Path to a TOML config file; environment variables override it.
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging() {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily("logs", "meshgarden.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    init_logging();
    info!(version = VERSION, "Starting telemetry server...");

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Critical error loading configuration. Exiting.");
            return Err(e.into());
        }
    };

    let nodes = match NodeRegistry::load(Path::new(&config.nodes_file)) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!(error = %e, "Critical error loading node registry. Exiting.");
            return Err(e.into());
        }
    };
    info!(node_count = nodes.len(), "Node registry loaded.");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    init_db(&pool).await?;
    info!("Database ready.");

    let engine = ThresholdEngine::new(config.thresholds.clone(), config.rules.clone())?;
    let weather = Arc::new(WeatherService::new(config.weather.clone())?);
    let decision_store = Arc::new(DecisionStore::new(
        PathBuf::from(&config.data_dir).join("decisions.json"),
    ));

    let (ingest_tx, ingest_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pipeline = Pipeline::new(
        Arc::new(PgReadingStore::new(pool.clone())),
        decision_store.clone(),
        engine,
        weather,
        nodes.clone(),
    );
    let pipeline_handle = tokio::spawn(pipeline.run(ingest_rx, shutdown_rx));

    let app = create_axum_router(pool, decision_store, ingest_tx, nodes);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(listen_addr = %config.listen_addr, "HTTP server listening.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal.");
            }
        })
        .await?;

    info!("Shutdown signal received; draining pipeline.");
    let _ = shutdown_tx.send(true);
    pipeline_handle.await?;
    info!("Server stopped.");
    Ok(())
}
