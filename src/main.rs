//! Heart Risk Pipeline - Main Entry Point
//!
//! Loads the classifier once, then serves CSV scoring requests over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use heart_risk_pipeline::{
    config::AppConfig,
    metrics::{MetricsReporter, PipelineMetrics},
    models::inference::InferenceService,
    processor::RiskPipeline,
    server::{self, AppContext},
    upload::UploadStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config/config.toml", env = "HEART_RISK_CONFIG")]
    config: PathBuf,
    /// Override the bind host
    #[arg(long)]
    host: Option<String>,
    /// Override the bind port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = if args.config.exists() {
        AppConfig::load_from_path(&args.config)?
    } else {
        AppConfig::default()
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_logging(&config)?;

    info!("Starting Heart Risk Pipeline");
    info!(config = %args.config.display(), "Configuration loaded successfully");

    // The model must load before the listener accepts anything
    let inference = match InferenceService::new(&config) {
        Ok(service) => Arc::new(service),
        Err(e) if e.is_fatal() => {
            error!(
                kind = e.kind().as_str(),
                error = %e,
                "Model artifact unusable, refusing to start"
            );
            return Err(e).context("Cannot serve requests without a model");
        }
        Err(e) => return Err(e).context("Failed to initialize inference"),
    };
    info!(model = %config.model.path.display(), "Inference service ready");

    let metrics = Arc::new(PipelineMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let uploads = UploadStore::new(&config.upload.dir, config.upload.retain_uploads);
    uploads.init()?;
    info!(dir = %uploads.dir().display(), "Upload directory ready");

    let ctx = AppContext {
        pipeline: Arc::new(RiskPipeline::new(inference, metrics.clone(), uploads)),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let served = server::run(&addr, ctx, config.server.max_upload_bytes).await;

    info!("Pipeline shutting down...");
    metrics.print_summary();

    served
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.level))?
        .add_directive(format!("heart_risk_pipeline={}", config.logging.level).parse()?);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
