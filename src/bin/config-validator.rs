//! # Sentinel Configuration Validator
//!
//! Command-line tool for validating sentinel configuration across
//! environments before a service starts with it.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use db_sentinel::config::{ConfigManager, SentinelConfig};

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate db-sentinel configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory (default: $SENTINEL_CONFIG_DIR or ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate and summarise every section
    All,

    /// Show the resolved database connection strategy
    Database,

    /// Show monitoring intervals and capacities
    Monitoring,

    /// List the alert rules in effect
    Rules,

    /// List environments that have an overlay file
    Environments,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    match run(&cli) {
        Ok(()) => {
            info!("Configuration validation completed successfully");
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    match cli.command.as_ref().unwrap_or(&Commands::All) {
        Commands::Environments => list_environments(cli),
        Commands::All => {
            let manager = load(cli)?;
            let config = manager.config();
            if cli.format == OutputFormat::Table {
                println!("🔧 Validating Sentinel Configuration");
                println!("Environment: {}", manager.environment());
                println!("Config Directory: {}", manager.config_directory().display());
                println!();
                println!("✅ Configuration loaded and validated");
                println!();
            }
            show_database(config, cli.format);
            show_monitoring(config, cli.format);
            show_rules(config, cli.format);
            if cli.format == OutputFormat::Table {
                println!("\n🎉 All configuration validation checks passed!");
            }
            Ok(())
        }
        Commands::Database => {
            show_database(load(cli)?.config(), cli.format);
            Ok(())
        }
        Commands::Monitoring => {
            show_monitoring(load(cli)?.config(), cli.format);
            Ok(())
        }
        Commands::Rules => {
            show_rules(load(cli)?.config(), cli.format);
            Ok(())
        }
    }
}

fn load(cli: &Cli) -> Result<Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("loading configuration for environment '{}'", cli.environment))
}

fn show_database(config: &SentinelConfig, format: OutputFormat) {
    let url = config.database.resolve_url();
    let strategy = config.database.pool_strategy(&url);
    let pool = strategy.pool_configuration();

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "database": {
                    "url": redact_url(&url),
                    "strategy": strategy.name(),
                    "max_connections": pool.max_connections,
                    "min_connections": pool.min_connections,
                    "acquire_timeout_seconds": pool.acquire_timeout.as_secs(),
                    "max_lifetime_seconds": pool.max_lifetime.as_secs(),
                    "statement_cache_capacity": pool.statement_cache_capacity,
                    "statement_timeout_ms": config.database.statement_timeout_ms,
                    "circuit_breakers_enabled": config.circuit_breakers.enabled,
                }
            })
        ),
        OutputFormat::Table => {
            println!("💾 Database");
            println!("  URL:                {}", redact_url(&url));
            println!("  Strategy:           {}", strategy.name());
            println!("  Max connections:    {}", pool.max_connections);
            println!("  Min connections:    {}", pool.min_connections);
            println!("  Acquire timeout:    {}s", pool.acquire_timeout.as_secs());
            println!("  Max lifetime:       {}s", pool.max_lifetime.as_secs());
            println!("  Statement cache:    {}", pool.statement_cache_capacity);
            println!("  Statement timeout:  {}ms", config.database.statement_timeout_ms);
            println!("  Circuit breakers:   {}", enabled(config.circuit_breakers.enabled));
            println!("  Query cache:        {} (ttl {}s, {} entries)",
                enabled(config.query_cache.enabled),
                config.query_cache.ttl_seconds,
                config.query_cache.max_entries
            );
            println!();
        }
    }
}

fn show_monitoring(config: &SentinelConfig, format: OutputFormat) {
    let monitoring = &config.monitoring;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "monitoring": monitoring, "session": config.session })
        ),
        OutputFormat::Table => {
            println!("📊 Monitoring");
            println!("  Collection interval: {}s (backoff {}s)",
                monitoring.monitoring_interval_seconds, monitoring.collection_error_backoff_seconds);
            println!("  Alerting interval:   {}s (backoff {}s)",
                monitoring.alerting_interval_seconds, monitoring.alerting_error_backoff_seconds);
            println!("  Retention:           {}s", monitoring.metrics_retention_seconds);
            println!("  Points per series:   {}", monitoring.max_points_per_series);
            println!("  Trend window:        {}", monitoring.trend_window);
            println!("  Health history:      {}", monitoring.health_history_size);
            println!("  Escalation after:    {}s", monitoring.escalation_after_seconds);
            println!("  System metrics:      {}", enabled(monitoring.enable_system_metrics));
            println!("  Session retries:     {} (base backoff {}s)",
                config.session.max_retries, config.session.backoff_base_seconds);
            println!();
        }
    }
}

fn show_rules(config: &SentinelConfig, format: OutputFormat) {
    let rules = config.effective_alert_rules();
    match format {
        OutputFormat::Json => println!("{}", json!({ "alert_rules": rules })),
        OutputFormat::Table => {
            println!("🚨 Alert Rules ({})", rules.len());
            println!("  {:<28} {:<28} {:>4} {:>10} {:>8}  LEVEL", "NAME", "METRIC", "CMP", "THRESHOLD", "FOR");
            for rule in &rules {
                println!(
                    "  {:<28} {:<28} {:>4} {:>10.2} {:>7}s  {}",
                    rule.name,
                    rule.metric,
                    rule.comparison.symbol(),
                    rule.threshold,
                    rule.duration_seconds,
                    rule.level
                );
            }
        }
    }
}

fn list_environments(cli: &Cli) -> Result<()> {
    let dir = cli
        .config_dir
        .clone()
        .or_else(|| std::env::var("SENTINEL_CONFIG_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config"));
    if !dir.is_dir() {
        bail!("configuration directory not found: {}", dir.display());
    }

    let mut environments = Vec::new();
    for entry in std::fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if let Some(env) = name
            .strip_prefix("sentinel.")
            .and_then(|rest| rest.strip_suffix(".yaml"))
        {
            environments.push(env.to_string());
        }
    }
    environments.sort();

    match cli.format {
        OutputFormat::Json => println!("{}", json!({ "environments": environments })),
        OutputFormat::Table => {
            println!("📋 Available Environments:");
            for env in environments {
                println!("  • {env}");
            }
        }
    }
    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

/// Hide the password component of a connection string
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:****@{host}"),
        None => url.to_string(),
    }
}
