//! rampart: IP allow/deny filtering for services behind trusted proxies
//!
//! Thin command-line host around the filter engine: validates policy
//! files and evaluates candidate requests against them, printing the
//! decision the way an embedding server would act on it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::FilterConfig;
use filter::{Decision, IpFilter, RequestMeta};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "rampart")]
#[command(author, version, about = "IP allow/deny filtering for services behind trusted proxies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a policy file
    Validate {
        #[arg(short, long, default_value = "rampart.toml")]
        config: PathBuf,
    },
    /// Evaluate a synthetic request against a policy file
    Check {
        #[arg(short, long, default_value = "rampart.toml")]
        config: PathBuf,

        /// Direct connection address (may carry a port)
        #[arg(short, long)]
        remote: Option<String>,

        /// Forwarding header as "name: value"; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request path, matched against exclusion patterns
        #[arg(short, long)]
        path: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Validate { config } => validate_config(config),
        Commands::Check {
            config,
            remote,
            headers,
            path,
        } => check_request(config, remote, headers, path),
    }
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    let config = FilterConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Compiling catches what shape-level validation cannot: bad address
    // syntax, bad prefixes, bad exclusion regexes
    IpFilter::from_config(&config)
        .with_context(|| format!("Failed to compile filter from {:?}", config_path))?;

    println!("Configuration is valid!");
    println!("  Mode: {:?}", config.mode);
    println!("  Entries: {}", config.entries.len());
    if !config.excluding.is_empty() {
        println!("  Excluded paths: {:?}", config.excluding);
    }
    println!("  Allowed headers: {:?}", config.allowed_headers);

    Ok(())
}

fn check_request(
    config_path: PathBuf,
    remote: Option<String>,
    headers: Vec<String>,
    path: Option<String>,
) -> Result<()> {
    let config = FilterConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let filter = IpFilter::from_config(&config)
        .with_context(|| format!("Failed to compile filter from {:?}", config_path))?;

    let req = RequestMeta {
        remote_addr: remote,
        path,
        headers: parse_headers(&headers)?,
    };

    let decision = filter.check(&req);
    print_decision(&decision);

    if !decision.admit {
        std::process::exit(1);
    }

    Ok(())
}

fn parse_headers(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|header| {
            let (name, value) = header
                .split_once(':')
                .with_context(|| format!("Header '{}' is not in 'name: value' form", header))?;
            Ok((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn print_decision(decision: &Decision) {
    println!(
        "Decision: {}",
        if decision.admit { "admit" } else { "reject" }
    );

    match &decision.resolved {
        Some(addr) => println!("  Resolved address: {}", addr),
        None if decision.excluded.is_none() => println!("  Resolved address: unknown"),
        None => {}
    }

    if let Some(entry) = &decision.matched {
        println!("  Matched entry: {}", entry);
    }

    if let Some(pattern) = &decision.excluded {
        println!("  Excluded by: {}", pattern);
    }
}
