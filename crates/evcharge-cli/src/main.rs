//! evcharge - command-line access to Taiwan EV charging-point data.
//!
//! Wires one shared cache into the credential manager and region fetcher,
//! then prints records or rate summaries for the requested regions.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use evcharge_core::summary::RateStats;
use evcharge_core::{
    shared_cache, CacheValue, ChargingPoint, Config, RegionFetcher, RegionSummary, SecretStore,
};

/// Log file name prefix inside `--log-file`
const LOG_FILE_PREFIX: &str = "evcharge.log";

#[derive(Parser)]
#[command(name = "evcharge", version, about = "Taiwan EV charging-point data from the TDX API")]
struct Cli {
    /// Config file (default: ~/.config/evcharge/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_file: Option<PathBuf>,

    /// Print the cache contents before exiting
    #[arg(long, global = true)]
    show_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured regions
    Regions,
    /// Print the charging points of one region
    Fetch {
        region: String,
        #[arg(long)]
        json: bool,
    },
    /// Summarize billing rates for one region, or all of them
    Summary {
        #[arg(required_unless_present = "all")]
        region: Option<String>,
        #[arg(long, conflicts_with = "region")]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Check that an access token can be obtained
    Token,
    /// Store the client secret in the OS keychain
    Login {
        #[arg(long)]
        client_id: String,
    },
    /// Remove the client secret from the OS keychain
    Logout {
        #[arg(long)]
        client_id: String,
    },
}

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load_from(path)?;
    config.apply_env();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_ref());
    info!("evcharge starting");

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::config_path()?,
    };

    match cli.command {
        Command::Login { client_id } => login(&config_path, &client_id)?,
        Command::Logout { client_id } => {
            SecretStore::delete(&client_id)?;
            println!("Removed secret for {}", client_id);
        }
        Command::Regions => print_regions(&load_config(&config_path)?),
        command => run_online(command, &load_config(&config_path)?, cli.show_cache).await?,
    }

    info!("evcharge done");
    Ok(())
}

/// Commands that talk to the API share one cache and one fetcher.
async fn run_online(command: Command, config: &Config, show_cache: bool) -> Result<()> {
    let fetcher = RegionFetcher::from_config(config, shared_cache(config))
        .context("Failed to set up region fetcher")?;

    match command {
        Command::Fetch { region, json } => {
            let records = fetcher.fetch(&region).await;
            print_records(&region, &records, json)?;
        }
        Command::Summary { region, all, json } => {
            let targets: Vec<(String, Arc<[ChargingPoint]>)> = if all {
                fetcher
                    .fetch_all()
                    .await
                    .into_iter()
                    .map(|(r, records)| (r.name, records))
                    .collect()
            } else {
                let region = region.unwrap_or_default();
                let records = fetcher.fetch(&region).await;
                vec![(region, records)]
            };
            for (name, records) in &targets {
                print_summary(name, &RegionSummary::from_records(records), json)?;
            }
        }
        Command::Token => {
            fetcher
                .credentials()
                .obtain_token()
                .await
                .context("No access token")?;
            println!("Access token obtained for {}", fetcher.credentials().client_id());
        }
        Command::Regions | Command::Login { .. } | Command::Logout { .. } => {}
    }

    if show_cache {
        print_cache(&fetcher);
    }
    Ok(())
}

fn print_regions(config: &Config) {
    for region in config.region_set().iter() {
        println!(
            "{:<10} {:<6} {:>9.4} {:>10.4}",
            region.code, region.name, region.latitude, region.longitude
        );
    }
}

/// Store the secret in the keychain and record `client_id` in the config
/// file so later runs find it without `EVCHARGE_CLIENT_ID`.
fn login(config_path: &Path, client_id: &str) -> Result<()> {
    let secret = rpassword::prompt_password(format!("Client secret for {}: ", client_id))
        .context("Failed to read client secret")?;
    if secret.trim().is_empty() {
        anyhow::bail!("Client secret must not be empty");
    }
    SecretStore::store(client_id, secret.trim())?;
    if !SecretStore::has_secret(client_id) {
        warn!(client_id, "Secret stored but could not be read back");
    }

    // Saved from the file contents alone so env overrides are not persisted
    let mut config = Config::load_from(config_path)?;
    if config.client_id.as_deref() != Some(client_id) {
        config.client_id = Some(client_id.to_string());
        config.save_to(config_path)?;
        info!(path = %config_path.display(), "Recorded client id in config");
    }
    println!("Stored secret for {}", client_id);
    Ok(())
}

fn print_records(region: &str, records: &[ChargingPoint], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("{}: no charging point data", region);
        return Ok(());
    }
    println!("{}: {} charging points", region, records.len());
    for record in records {
        println!("  {:<16} {}", record.station_display(), record.rate_display());
    }
    Ok(())
}

fn print_summary(region: &str, summary: &RegionSummary, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({ "region": region, "summary": summary });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    match summary {
        RegionSummary::NoData => println!("{}: no charging point data", region),
        RegionSummary::Unparseable => {
            println!("{}: charging point data could not be interpreted", region)
        }
        RegionSummary::Stats(stats) => print_stats(region, stats),
    }
    Ok(())
}

fn print_stats(region: &str, stats: &RateStats) {
    println!("{}", region);
    println!("  stations:       {}", stats.total_stations);
    println!("  billing rates:  {}", stats.distinct_rates);
    for share in &stats.distribution {
        println!(
            "  {:>5.1}%  {:>3}  {}",
            stats.fraction(share) * 100.0,
            share.count,
            share.label
        );
    }
}

fn print_cache(fetcher: &RegionFetcher) {
    let entries = fetcher.cache().entries(CacheValue::kind);
    eprintln!(
        "cache: {}/{} entries, ttl {}s",
        entries.len(),
        fetcher.cache().capacity(),
        fetcher.cache().ttl().as_secs()
    );
    for entry in entries {
        eprintln!(
            "  {:<14} {:<8} cached {:<9} expires in {}s",
            entry.key,
            entry.kind,
            entry.age_display(),
            entry.expires_in.as_secs()
        );
    }
}
