//! shellcache - drive the offline app-shell cache from the command line.
//!
//! Runs the worker lifecycle against the on-disk cache store and the real
//! network, so a deployment can pre-cache its shell, evict old generations
//! and check what a request would be answered with.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use shellcache_core::{
    CacheStorage, Config, DiskStorage, FetchOutcome, HttpNetwork, OfflineCacheManager, Request,
    WorkerHost,
};
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: shellcache [--config <path>] <command>

Commands:
  install                    Pre-cache the shell into the current generation
  activate                   Delete stale generations (current must be installed)
  update                     install, then activate
  fetch <url> [--method M]   Show how a request would be answered; requests
                             the worker would not intercept are not sent
  list                       List cache generations on disk
  config                     Print the effective configuration";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

struct Cli {
    config_path: Option<PathBuf>,
    command: String,
    rest: Vec<String>,
}

fn parse_args(args: Vec<String>) -> Result<Cli> {
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter
                .next()
                .ok_or_else(|| anyhow::anyhow!("--config needs a path"))?;
            config_path = Some(PathBuf::from(path));
        } else {
            positional.push(arg);
        }
    }

    if positional.is_empty() {
        anyhow::bail!("missing command\n\n{}", USAGE);
    }
    let command = positional.remove(0);
    Ok(Cli {
        config_path,
        command,
        rest: positional,
    })
}

/// Build a manager over the on-disk store and the real network.
fn build_manager(config: &Config) -> Result<OfflineCacheManager> {
    let worker_config = config.worker_config()?;
    let storage = Arc::new(DiskStorage::new(config.cache_dir()?)?);
    let network = match config.request_timeout() {
        Some(timeout) => HttpNetwork::with_timeout(timeout)?,
        None => HttpNetwork::new()?,
    };
    // Events are logged by the manager itself
    let (manager, _events) = OfflineCacheManager::new(worker_config, storage, Arc::new(network));
    Ok(manager)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = match parse_args(std::env::args().skip(1).collect()) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let config = match cli.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command.as_str() {
        "install" => install(&config).await,
        "activate" => activate(&config).await,
        "update" => update(&config).await,
        "fetch" => fetch(&config, &cli.rest).await,
        "list" => list(&config).await,
        "config" => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

async fn install(config: &Config) -> Result<()> {
    let manager = build_manager(config)?;
    let host = WorkerHost::new(Arc::new(manager));

    let report = host
        .install()
        .settled()
        .await
        .context("Install failed; the previous generation is still in place")?;
    println!(
        "Installed {} ({} resources)",
        report.generation, report.resources
    );
    Ok(())
}

async fn activate(config: &Config) -> Result<()> {
    let manager = build_manager(config)?;
    if !manager.restore().await? {
        anyhow::bail!(
            "Generation {} is not installed; run `shellcache install` first",
            manager.generation()
        );
    }
    let host = WorkerHost::new(Arc::new(manager));
    let report = host.activate().settled().await?;
    print_activation(&report);
    Ok(())
}

async fn update(config: &Config) -> Result<()> {
    let manager = build_manager(config)?;
    let host = WorkerHost::new(Arc::new(manager));
    let report = host.start().await.context("Update failed")?;
    print_activation(&report);
    Ok(())
}

fn print_activation(report: &shellcache_core::ActivateReport) {
    println!("Activated {}", report.generation);
    for name in &report.deleted {
        println!("  deleted {}", name);
    }
    for failure in &report.failures {
        println!("  failed to {}", failure);
    }
}

async fn fetch(config: &Config, args: &[String]) -> Result<()> {
    let mut method = "GET".to_string();
    let mut target = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--method" {
            method = iter
                .next()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("--method needs a value"))?;
        } else {
            target = Some(arg.clone());
        }
    }
    let target = target.ok_or_else(|| anyhow::anyhow!("fetch needs a url\n\n{}", USAGE))?;

    let url = config.resolve(&target)?;
    let request = Request::parse(&method, url.as_str())?;

    let manager = build_manager(config)?;
    if !manager.resume().await? {
        warn!(
            generation = manager.generation(),
            "Generation not installed, requests will pass through"
        );
    }
    let host = WorkerHost::new(Arc::new(manager));

    let outcome = host.fetch(request.clone()).settled().await?;
    println!("{}", describe(&request, &outcome));
    Ok(())
}

/// One-line summary of how the worker answered `request`.
fn describe(request: &Request, outcome: &FetchOutcome) -> String {
    let answer = match outcome.response() {
        Some(response) => format!(
            "(status {}, {} bytes)",
            response.status,
            response.body.len()
        ),
        None => "(not intercepted, the page would send it itself; not sent)".to_string(),
    };
    format!(
        "{} {} -> {} {}",
        request.method,
        request.url,
        outcome.source(),
        answer
    )
}

async fn list(config: &Config) -> Result<()> {
    let storage = DiskStorage::new(config.cache_dir()?)?;
    let names = storage.keys().await?;
    if names.is_empty() {
        println!("No caches in {}", storage.cache_dir().display());
        return Ok(());
    }

    for name in names {
        let marker = if name == config.generation { "*" } else { " " };
        match storage.stats(&name).await {
            Ok(stats) => println!(
                "{} {:<40} {:>4} entries  updated {}",
                marker,
                name,
                stats.entries,
                stats.age_display()
            ),
            Err(e) => println!("{} {:<40} unreadable: {}", marker, name, e),
        }
    }
    Ok(())
}
