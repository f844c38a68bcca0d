//! quakewatch - live earthquake map dashboard.
//!
//! Polls the USGS summary feed, filters it interactively and serves a map
//! UI, or prints a one-shot filtered snapshot to the terminal.

use std::io;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

mod cli;
mod client;
mod dashboard;
mod errors;
mod filters;
mod models;
mod output;
mod scheduler;
mod server;
mod style;

use cli::{Cli, Command};
use client::{FeedSource, UsgsClient};
use dashboard::Dashboard;
use filters::CriteriaUpdate;

/// Lowest auto-refresh period we allow, in seconds.
const MIN_REFRESH_SECS: u64 = 30;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    match cli.command {
        Command::Serve(args) => runtime.block_on(cmd_serve(args)),
        Command::Snapshot(args) => runtime.block_on(cmd_snapshot(args)),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the `serve` command - dashboard plus map UI.
async fn cmd_serve(args: cli::ServeArgs) -> Result<()> {
    let refresh_secs = args.refresh_secs.max(MIN_REFRESH_SECS);
    if refresh_secs != args.refresh_secs {
        tracing::warn!("refresh period clamped to minimum of {MIN_REFRESH_SECS} seconds");
    }

    let config = server::ServeConfig {
        port: args.port,
        host: args.host.clone(),
        base_url: args.base_url,
        feed_type: args.feed,
        refresh_period: Duration::from_secs(refresh_secs),
        auto_refresh: !args.no_auto_refresh,
    };

    let url = format!("http://{}:{}", args.host, args.port);
    println!("\x1b[1m🌍 quakewatch\x1b[0m");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("  Local:   \x1b[96m{url}\x1b[0m");
    println!("  Feed:    {}", config.feed_type.as_str());
    println!(
        "  Refresh: {}s ({})",
        refresh_secs,
        if config.auto_refresh { "auto" } else { "manual" }
    );
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("\x1b[2mPress Ctrl+C to stop\x1b[0m\n");

    // Open browser if requested (using xdg-open/open command)
    if args.open {
        #[cfg(target_os = "linux")]
        let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
        #[cfg(target_os = "macos")]
        let _ = std::process::Command::new("open").arg(&url).spawn();
        #[cfg(target_os = "windows")]
        let _ = std::process::Command::new("cmd").args(["/c", "start", &url]).spawn();
    }

    server::run_server(config).await
}

/// Execute the `snapshot` command - one fetch through the same pipeline.
async fn cmd_snapshot(args: cli::SnapshotArgs) -> Result<()> {
    let client = UsgsClient::with_base_url(&args.base_url, args.feed)
        .context("failed to create USGS client")?;

    let mut dashboard = Dashboard::new(false);
    let ticket = dashboard.begin_fetch();
    let events = client
        .fetch_events()
        .await
        .context("failed to fetch earthquake feed")?;
    dashboard.complete_fetch(ticket, Ok(events));

    dashboard.apply_update(CriteriaUpdate {
        min_magnitude: Some(args.min_magnitude),
        max_magnitude: Some(args.max_magnitude),
        location_query: Some(args.query),
        color_mode: Some(args.color_mode),
    });

    let mut view = dashboard.view();

    // Sort by time descending (most recent first)
    view.events
        .sort_by(|a, b| b.event.timestamp.cmp(&a.event.timestamp));
    view.events.truncate(args.limit);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_events(&mut handle, &view.events, &view.stats, args.format)?;

    Ok(())
}
