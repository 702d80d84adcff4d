//! Background Removal API server
//!
//! Command-line front end that configures tracing, builds the server
//! configuration and runs the HTTP service.

use super::config::CliConfigBuilder;
use crate::{
    backends::OnnxSessionLoader,
    inference::SessionLoader,
    server,
    tracing_config::{TracingConfig, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Background removal HTTP service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-server")]
pub struct Cli {
    /// Address to bind [default: 0.0.0.0]
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on [default: 8000]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory holding `<model>.onnx` files [default: $U2NET_HOME or ~/.u2net]
    #[arg(long, value_name = "PATH")]
    pub model_dir: Option<PathBuf>,

    /// Execution provider: auto, cpu, cuda or coreml [default: auto]
    #[arg(short, long)]
    pub execution_provider: Option<String>,

    /// Number of intra-op threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Models to load before accepting requests (repeatable)
    #[arg(long, value_name = "MODEL")]
    pub preload: Vec<String>,

    /// Never download missing models
    #[arg(long)]
    pub no_download: bool,

    /// HTML file served on `GET /`
    #[arg(long, value_name = "PATH", default_value = "demo.html")]
    pub demo_page: PathBuf,

    /// Longest image side before inputs are downsampled [default: 4000]
    #[arg(long)]
    pub max_dimension: Option<u32>,

    /// Largest accepted upload in megabytes [default: 50]
    #[arg(long)]
    pub max_upload_mb: Option<usize>,

    /// Seconds allowed for creating a model session [default: 60]
    #[arg(long)]
    pub model_load_timeout: Option<u64>,

    /// Primary attempts before the fallback model runs
    #[arg(long, default_value_t = 2)]
    pub max_attempts: usize,

    /// Model used when every primary attempt failed
    #[arg(long, default_value = crate::config::FALLBACK_MODEL)]
    pub fallback_model: String,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid command-line arguments")?;
    debug!(?config, "Server configuration");

    let loader = OnnxSessionLoader::from_config(&config).context("Failed to prepare model directory")?;
    let loader: Arc<dyn SessionLoader> = Arc::new(loader);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        provider = %config.execution_provider,
        "Starting background removal API"
    );
    server::serve(&config, loader).await.context("Server failed")?;
    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let mut tracing = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format.into());
    if let Ok(filter) = std::env::var("RUST_LOG") {
        tracing = tracing.with_env_filter(filter);
    }
    tracing.init().context("Failed to initialize tracing subscriber")
}
