//! dayahead CLI: configuration checks, forecast validation, store status and
//! manual fallback.
//!
//! Commands:
//! - `check-config`: validate a TOML pipeline config and print the merged result
//! - `validate`: run the validation engine over a stored forecast file
//! - `status`: report which products have fresh or fallback forecasts for a date
//! - `resolve`: search back for a substitute forecast and store it under a date
//!
//! Verbosity is controlled with `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dayahead_core::data::{read_frame, ParquetStore};
use dayahead_core::observability::TracingSink;
use dayahead_core::validation::{ValidationEngine, ValidationSettings};
use dayahead_runner::config::{load_config_file, PipelineConfig};
use dayahead_runner::FallbackResolver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[derive(Parser)]
#[command(
    name = "dayahead",
    about = "dayahead CLI: day-ahead forecast pipeline tooling"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a pipeline config file and print it merged over the defaults.
    CheckConfig {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Run the validation engine over a forecast Parquet file.
    Validate {
        /// Forecast file to validate.
        #[arg(long)]
        file: PathBuf,

        /// Pipeline config supplying products and thresholds.
        #[arg(long, conflicts_with = "products")]
        config: Option<PathBuf>,

        /// Products expected in the file (used without --config).
        #[arg(long, num_args = 1..)]
        products: Vec<String>,
    },
    /// Report stored forecasts for a target date.
    Status {
        /// Target date (YYYY-MM-DD).
        #[arg(long)]
        date: String,

        /// Pipeline config supplying products and the storage root.
        #[arg(long)]
        config: PathBuf,
    },
    /// Serve a product from an earlier forecast.
    Resolve {
        /// Target date (YYYY-MM-DD).
        #[arg(long)]
        date: String,

        /// Product to resolve.
        #[arg(long)]
        product: String,

        /// Pipeline config supplying the storage root and search window.
        #[arg(long)]
        config: PathBuf,

        /// Override `fallback.max_search_days`.
        #[arg(long)]
        max_days: Option<i64>,
    },
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { config } => run_check_config(&config),
        Commands::Validate {
            file,
            config,
            products,
        } => run_validate(&file, config.as_deref(), products),
        Commands::Status { date, config } => run_status(&date, &config),
        Commands::Resolve {
            date,
            product,
            config,
            max_days,
        } => run_resolve(&date, &product, &config, max_days),
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn load_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    let raw = load_config_file(path)?;
    let (config, _) = PipelineConfig::resolve(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

fn store_for(config: &PipelineConfig) -> Result<ParquetStore> {
    Ok(ParquetStore::with_options(
        config.storage.path.clone(),
        config.store_options()?,
    ))
}

fn run_check_config(path: &Path) -> Result<()> {
    let raw = load_config_file(path)?;
    let (config, merged) = match PipelineConfig::resolve(&raw) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            std::process::exit(1);
        }
    };

    println!("Pipeline: {}", config.pipeline_name);
    println!("Products: {}", config.products.join(", "));
    println!(
        "Fallback: {} (max {} day(s))",
        if config.fallback.enabled { "enabled" } else { "disabled" },
        config.fallback.max_search_days
    );
    println!(
        "Storage:  {} / {} at {}",
        config.storage.format,
        config.storage.compression,
        config.storage.path.display()
    );
    println!();
    println!("{}", serde_json::to_string_pretty(&merged)?);
    Ok(())
}

fn run_validate(file: &Path, config: Option<&Path>, products: Vec<String>) -> Result<()> {
    let settings = match config {
        Some(path) => load_pipeline_config(path)?.validation_settings(),
        None => {
            if products.is_empty() {
                bail!("one of --config or --products is required");
            }
            let names: Vec<&str> = products.iter().map(String::as_str).collect();
            ValidationSettings::for_products(&names)
        }
    };

    let frame = read_frame(file)?;
    let result = ValidationEngine::new(settings).validate_all(&frame);

    if result.is_valid() {
        println!("{}: valid ({} rows)", file.display(), frame.height());
        return Ok(());
    }

    println!(
        "{}: {} error(s) [{}]",
        file.display(),
        result.error_count(),
        result.category()
    );
    for (key, messages) in result.errors() {
        println!("  {key}:");
        for message in messages {
            println!("    - {message}");
        }
    }
    std::process::exit(1);
}

fn run_status(date: &str, config_path: &Path) -> Result<()> {
    let date = parse_date(date)?;
    let config = load_pipeline_config(config_path)?;
    let store = store_for(&config)?;
    let products: Vec<&str> = config.products.iter().map(String::as_str).collect();

    println!("Store: {}", store.root().display());
    println!("Date:  {date}");
    println!();
    println!("{:<24} {:<7} {:<9} {:>6}", "Product", "Fresh", "Fallback", "Rows");
    println!("{}", "-".repeat(49));
    for status in store.status(date, &products) {
        let rows = status
            .row_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<24} {:<7} {:<9} {:>6}",
            status.product,
            yes_no(status.fresh),
            yes_no(status.fallback),
            rows
        );
    }
    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn run_resolve(date: &str, product: &str, config_path: &Path, max_days: Option<i64>) -> Result<()> {
    let date = parse_date(date)?;
    let config = load_pipeline_config(config_path)?;
    if !config.products.iter().any(|p| p == product) {
        bail!("product '{product}' is not configured in {}", config_path.display());
    }
    let store = Arc::new(store_for(&config)?);
    let schema = ValidationEngine::new(config.validation_settings()).schema_validator();
    let resolver = FallbackResolver::new(store, schema, Arc::new(TracingSink));

    let max_search_days = max_days.unwrap_or(config.fallback.max_search_days);
    let record = resolver.resolve(product, date, max_search_days)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
