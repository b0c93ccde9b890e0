//! civitai-sync - fetch Civitai metadata and preview images for local
//! safetensors models.
//!
//! Thin command-line layer over `civitai-sync-core`: parses arguments, merges
//! them with the stored user config, installs logging and Ctrl-C handling,
//! and prints results.

mod config_store;
mod output;

use anyhow::{Context, Result};
use civitai_sync_core::model_files::resolve_root;
use civitai_sync_core::{
    extract_header_metadata, list_missing_previews, list_not_found, CancellationToken,
    CivitaiClient, SyncOptions, Synchronizer,
};
use clap::{CommandFactory, Parser};
use config_store::{ConfigStore, UserConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Parser, Debug)]
#[command(name = "civitai-sync", version)]
#[command(about = "Sync safetensors model metadata and images from Civitai")]
struct Args {
    /// Folder containing safetensors files (searched recursively)
    folder: Option<PathBuf>,

    /// Civitai API key for this session
    #[arg(long)]
    api_key: Option<String>,

    /// Save an API key to the local config for future runs
    #[arg(long, value_name = "API_KEY")]
    save_api_key: Option<String>,

    /// Download preview images for models
    #[arg(long = "img", visible_alias = "images")]
    img: bool,

    /// Refresh metadata even when the cached copy is fresh
    #[arg(long, visible_alias = "force")]
    update: bool,

    /// Refresh metadata older than this many days (0 = always)
    #[arg(long, value_name = "DAYS")]
    max_age_days: Option<u64>,

    /// Minimum delay between API requests, in seconds
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    rate_limit: Option<Duration>,

    /// Remove metadata and previews whose model file no longer exists
    #[arg(long)]
    clean: bool,

    /// List files that could not be found on Civitai
    #[arg(short, long, conflicts_with_all = ["api_key", "img", "rate_limit", "list_img"])]
    list: bool,

    /// List files that have no preview image
    #[arg(long, conflicts_with_all = ["api_key", "img", "rate_limit"])]
    list_img: bool,

    /// Print the safetensors header metadata of a file and exit
    #[arg(long, value_name = "FILE", conflicts_with_all = ["list", "list_img"])]
    inspect: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors and skip the summary
    #[arg(short, long)]
    quiet: bool,
}

fn parse_seconds(value: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("`{}` is not a number", value))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("`{}` is not a valid delay", value))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Set up logging; RUST_LOG overrides the flags
    let default_level = if args.quiet {
        "error"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    if let Some(path) = &args.inspect {
        let header = extract_header_metadata(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        println!("{}", output::format_header(path, &header));
        return Ok(ExitCode::SUCCESS);
    }

    let store = ConfigStore::default_location()?;

    if let Some(api_key) = &args.save_api_key {
        store.save_api_key(api_key)?;
        println!("API key saved to {}", store.path().display());
        if args.folder.is_none() {
            return Ok(ExitCode::SUCCESS);
        }
    }

    let Some(folder) = args.folder.clone() else {
        Args::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "FOLDER is required unless only saving an API key or using --inspect",
            )
            .exit();
    };

    if args.list {
        print!(
            "{}",
            path_report("Not found on Civitai", &folder, list_not_found)?
        );
        return Ok(ExitCode::SUCCESS);
    }
    if args.list_img {
        print!(
            "{}",
            path_report("Missing preview images", &folder, list_missing_previews)?
        );
        return Ok(ExitCode::SUCCESS);
    }

    let config = store.load().unwrap_or_else(|e| {
        warn!("{:#}; using defaults", e);
        UserConfig::default()
    });
    let options = build_options(&args, &config)?;
    if options.api_key.is_none() {
        warn!("No API key provided. Some models may not be visible.");
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    info!("Syncing {}", folder.display());
    let started = Instant::now();
    let client = CivitaiClient::new(&options)?;
    let stats = Synchronizer::new(client, options)
        .with_cancellation(cancel)
        .run(&folder)
        .await
        .with_context(|| format!("Cannot sync {}", folder.display()))?;

    if !args.quiet {
        print!("{}", output::format_summary(&stats, started.elapsed()));
    }

    Ok(if stats.interrupted {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Merge flags over stored settings.
fn build_options(args: &Args, config: &UserConfig) -> Result<SyncOptions> {
    let mut options = SyncOptions::new()
        .with_download_images(args.img)
        .with_force(args.update)
        .with_clean_orphans(args.clean)
        .with_api_key(
            args.api_key
                .clone()
                .or_else(|| config.api_key().map(str::to_string)),
        );

    let rate_limit = match (args.rate_limit, config.rate_limit_secs) {
        (Some(delay), _) => Some(delay),
        (None, Some(secs)) => Some(
            Duration::try_from_secs_f64(secs)
                .with_context(|| format!("Invalid rate_limit_secs in config: {}", secs))?,
        ),
        (None, None) => None,
    };
    if let Some(delay) = rate_limit {
        options = options.with_min_interval(delay);
    }

    if let Some(days) = args.max_age_days.or(config.max_age_days) {
        options = options.with_max_age(Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY)));
    }

    Ok(options)
}

/// Run a listing report, printing paths relative to the resolved folder.
fn path_report(
    title: &str,
    folder: &Path,
    list: fn(&Path) -> civitai_sync_core::Result<Vec<PathBuf>>,
) -> Result<String> {
    let root = resolve_root(folder)?;
    let paths = list(&root)?;
    Ok(output::format_path_list(title, &root, &paths))
}

/// Cancel the run on the first Ctrl-C; exit immediately on the second.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping after the current file (Ctrl-C again to abort)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}
