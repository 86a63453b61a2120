mod summary;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rustop::opts;
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidtune_core::config::load_config_from_env;
use vidtune_core::{
    collect_inputs, load_config, metrics, validate_config, BatchCoordinator, BatchError, Bitrate,
    Config, FfmpegConverter, FfmpegMetadataTransfer, LogReporter,
};

use summary::Summary;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Config file picked up from the working directory when nothing else is given
const DEFAULT_CONFIG_FILE: &str = "vidtune.toml";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    // Logs go to stderr so --json output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (args, _rest) = opts! {
        synopsis "Convert video files to MP3, keeping their tags and cover art.";
        version VERSION;
        opt config:Option<String>, short:'c', desc:"Configuration file (TOML).";
        opt output_dir:Option<String>, short:'o', long:"output-dir", desc:"Directory for the MP3 files.";
        opt bitrate:Option<u32>, short:'b', desc:"MP3 bitrate in kbps (128, 192, 256, 320).";
        opt normalize:bool=false, short:'n', desc:"Normalize loudness.";
        opt no_metadata:bool=false, short:'M', long:"no-metadata", desc:"Do not copy tags from the source.";
        opt no_cover:bool=false, short:'C', long:"no-cover", desc:"Do not embed cover art.";
        opt overwrite:bool=false, short:'y', desc:"Replace existing MP3 files.";
        opt recursive:bool=false, short:'r', desc:"Descend into subdirectories.";
        opt workers:Option<usize>, short:'w', desc:"Number of parallel conversions.";
        opt json:bool=false, short:'j', desc:"Print the summary as JSON.";
        opt metrics:bool=false, short:'m', desc:"Print Prometheus metrics after the run.";
        param inputs:Vec<String>, desc:"Video files or directories.";
    }
    .parse_or_exit();

    let mut config = read_config(args.config.as_deref())?;

    if let Some(dir) = args.output_dir {
        config.conversion.output_directory = Some(PathBuf::from(dir));
    }
    if let Some(kbps) = args.bitrate {
        config.conversion.bitrate = Bitrate::try_from(kbps).context("Invalid --bitrate")?;
    }
    if args.normalize {
        config.conversion.normalize = true;
    }
    if args.no_metadata {
        config.conversion.preserve_metadata = false;
    }
    if args.no_cover {
        config.conversion.extract_cover = false;
    }
    if args.overwrite {
        config.conversion.overwrite = true;
    }
    if args.workers.is_some() {
        config.batch.max_workers = args.workers;
    }

    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        bitrate = %config.conversion.bitrate,
        normalize = config.conversion.normalize,
        "Configuration loaded"
    );

    if args.inputs.is_empty() {
        bail!("No input files given");
    }

    let sources = collect_inputs(&args.inputs, args.recursive).context("Failed to read inputs")?;
    if sources.is_empty() {
        warn!("No video files found");
    }

    let requests: Vec<_> = sources
        .iter()
        .map(|source| config.conversion.request_for(source))
        .collect();

    let coordinator = BatchCoordinator::new(
        FfmpegConverter::new(config.converter.clone()),
        FfmpegMetadataTransfer::new(config.converter.clone()),
        Arc::new(LogReporter::new()),
    );
    coordinator.enqueue(requests).await?;

    match coordinator.start(config.batch.max_workers).await {
        Ok(()) => {}
        // The batch still finishes (aborted), so the summary gets printed.
        Err(BatchError::ExternalToolMissing(e)) => error!("{}", e),
        Err(e) => return Err(e.into()),
    }

    let state = tokio::select! {
        state = coordinator.wait() => state,
        _ = shutdown_signal() => {
            info!("Shutdown requested, cancelling batch...");
            coordinator.cancel();
            coordinator.wait().await
        }
    };

    let results = coordinator.results().await;
    let summary = Summary::new(&state, &results);

    if args.json {
        println!("{}", summary.to_json()?);
    } else {
        print!("{}", summary.to_text());
    }

    if args.metrics {
        print!("{}", metrics::render());
    }

    Ok(if summary.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Loads the config from, in order: `--config`, `VIDTUNE_CONFIG`, `./vidtune.toml`,
/// or defaults plus environment overrides.
fn read_config(explicit: Option<&str>) -> Result<Config> {
    let path = explicit
        .map(PathBuf::from)
        .or_else(|| std::env::var("VIDTUNE_CONFIG").ok().map(PathBuf::from))
        .or_else(|| {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            default.exists().then(|| default.to_path_buf())
        });

    match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))
        }
        None => load_config_from_env().context("Failed to load config from environment"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
