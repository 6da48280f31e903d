//! PriceVault CLI — run, status and config commands.
//!
//! Commands:
//! - `run` — download, validate, merge and store the configured universe
//! - `protected` — run only the protected subset (`--list` shows coverage)
//! - `status` — report which configured tickers have stored history
//! - `init-config` — write a starter config with the default universe

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pricevault_core::data::{CancelToken, SeriesStore, TickerRegistry, TracingProgress, YahooClient};
use pricevault_core::PipelineConfig;
use pricevault_runner::export::generate_report;
use pricevault_runner::{execute, Selection, StoreStatus};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "pricevault.toml";

#[derive(Parser)]
#[command(
    name = "pricevault",
    about = "PriceVault — batch stock price acquisition and merge"
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG overrides.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and merge every configured ticker (or a subset).
    Run {
        /// Path to a TOML config file. Defaults to ./pricevault.toml, then
        /// the built-in universe.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only process these symbols (must be in the configured universe).
        #[arg(long, num_args = 1..)]
        only: Vec<String>,
    },
    /// Download and merge only the protected tickers.
    Protected {
        #[arg(long)]
        config: Option<PathBuf>,

        /// List protected tickers and their stored coverage instead of running.
        #[arg(long, default_value_t = false)]
        list: bool,
    },
    /// Report stored coverage for the configured universe.
    Status {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write a starter config file.
    InitConfig {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("pricevault_core={0},pricevault_runner={0},pricevault_cli={0}", cli.log_level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Run { config, only } => {
            let selection = if only.is_empty() {
                Selection::All
            } else {
                Selection::Only(only)
            };
            run_cmd(config.as_deref(), selection)
        }
        Commands::Protected { config, list: true } => protected_list_cmd(config.as_deref()),
        Commands::Protected { config, list: false } => {
            run_cmd(config.as_deref(), Selection::Protected)
        }
        Commands::Status { config } => status_cmd(config.as_deref()),
        Commands::InitConfig { path, force } => init_config_cmd(&path, force),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_file(p)
            .with_context(|| format!("loading config {}", p.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            PipelineConfig::from_file(Path::new(DEFAULT_CONFIG))
                .with_context(|| format!("loading config {DEFAULT_CONFIG}"))
        }
        None => {
            tracing::info!("no config file found; using the built-in universe");
            Ok(PipelineConfig::default_universe())
        }
    }
}

fn store_for(config: &PipelineConfig) -> SeriesStore {
    SeriesStore::new(
        &config.storage.data_dir,
        config.download.start_date,
        config.download.interval,
    )
}

/// Trip the token on Ctrl-C. Tickers already in flight finish; the rest are
/// reported as cancelled.
fn install_ctrl_c(cancel: CancelToken) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl-C handler unavailable");
                return;
            }
        };
        rt.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; finishing in-flight tickers");
                cancel.cancel();
            }
        });
    });
}

fn run_cmd(config_path: Option<&Path>, selection: Selection) -> Result<()> {
    let config = load_config(config_path)?;

    let client = YahooClient::new(config.download.request_timeout())
        .context("building HTTP client")?;
    let cancel = CancelToken::new();
    install_ctrl_c(cancel.clone());

    let today = chrono::Local::now().date_naive();
    let (run, out_dir) = execute(
        &config,
        &client,
        &selection,
        &TracingProgress,
        cancel,
        today,
    )?;

    println!("{}", generate_report(&run.summary, &run.report));
    println!("Artifacts saved to: {}", out_dir.display());

    if run.report.failed() > 0 {
        eprintln!("{} ticker(s) failed", run.report.failed());
        std::process::exit(1);
    }
    Ok(())
}

fn protected_list_cmd(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = TickerRegistry::load(&config.tickers).context("invalid ticker universe")?;
    let store = store_for(&config);

    let protected = registry.protected_only();
    if protected.is_empty() {
        println!("No protected tickers configured.");
        return Ok(());
    }

    let symbols: Vec<&str> = protected.iter().map(|t| t.symbol.as_str()).collect();
    let records = store.status(&symbols);

    println!("{:<12} {:<18} {:<25} {:>8}", "Symbol", "Sector", "Stored Range", "Rows");
    println!("{}", "-".repeat(66));
    for (ticker, record) in protected.iter().zip(&records) {
        println!(
            "{:<12} {:<18} {:<25} {:>8}",
            ticker.symbol,
            ticker.sector,
            format_range(record.start_date, record.end_date),
            record.row_count.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
        );
    }
    Ok(())
}

fn status_cmd(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = TickerRegistry::load(&config.tickers).context("invalid ticker universe")?;
    let store = store_for(&config);
    let status = StoreStatus::collect(&registry, &store);

    println!("Store: {}", config.storage.data_dir.display());
    println!(
        "Stored: {}/{} ({:.1}%)",
        status.stored(),
        status.configured(),
        status.completion_pct()
    );
    println!();
    println!("{:<12} {:<25} {:>8}  {:<20}", "Symbol", "Date Range", "Rows", "Written");
    println!("{}", "-".repeat(70));
    for r in &status.records {
        println!(
            "{:<12} {:<25} {:>8}  {:<20}",
            r.symbol,
            format_range(r.start_date, r.end_date),
            r.row_count.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
            r.written_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".into()),
        );
    }

    if !status.protected_missing.is_empty() {
        println!();
        println!(
            "WARNING: protected tickers with no stored history: {}",
            status.protected_missing.join(", ")
        );
    }
    Ok(())
}

fn init_config_cmd(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (pass --force to overwrite)", path.display());
    }
    let toml = PipelineConfig::default_universe()
        .to_toml()
        .context("serializing default config")?;
    std::fs::write(path, toml).with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn format_range(start: Option<chrono::NaiveDate>, end: Option<chrono::NaiveDate>) -> String {
    match (start, end) {
        (Some(s), Some(e)) => format!("{s} to {e}"),
        _ => "(none)".into(),
    }
}
