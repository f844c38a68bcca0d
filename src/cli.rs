//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing.

use clap::{Parser, Subcommand};

use crate::client::{FeedType, USGS_BASE_URL};
use crate::filters::ColorMode;
use crate::output::Format;
use crate::scheduler::DEFAULT_REFRESH_PERIOD;

/// Live earthquake map dashboard backed by the USGS feed.
#[derive(Parser, Debug)]
#[command(name = "quakewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the dashboard and serve the map UI
    Serve(ServeArgs),

    /// Fetch once, filter, print and exit
    Snapshot(SnapshotArgs),
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Feed host
    #[arg(long, default_value = USGS_BASE_URL)]
    pub base_url: String,

    /// Summary feed to poll
    #[arg(long, default_value = "all_day", value_parser = parse_feed_type)]
    pub feed: FeedType,

    /// Auto-refresh period in seconds (minimum 30)
    #[arg(long, default_value_t = DEFAULT_REFRESH_PERIOD.as_secs())]
    pub refresh_secs: u64,

    /// Start with auto-refresh turned off
    #[arg(long)]
    pub no_auto_refresh: bool,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,
}

/// Arguments for the `snapshot` command.
#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    /// Feed host
    #[arg(long, default_value = USGS_BASE_URL)]
    pub base_url: String,

    /// Summary feed to fetch
    #[arg(long, default_value = "all_day", value_parser = parse_feed_type)]
    pub feed: FeedType,

    /// Minimum magnitude to show
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    pub min_magnitude: f64,

    /// Maximum magnitude to show
    #[arg(long, default_value = "10", allow_negative_numbers = true)]
    pub max_magnitude: f64,

    /// Case-insensitive substring of the place name
    #[arg(long, short = 'q', default_value = "")]
    pub query: String,

    /// Color by severity or depth
    #[arg(long, default_value = "severity", value_parser = parse_color_mode)]
    pub color_mode: ColorMode,

    /// Maximum number of events to show
    #[arg(long, short = 'n', default_value = "50")]
    pub limit: usize,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Parse a feed type from string.
fn parse_feed_type(s: &str) -> Result<FeedType, String> {
    s.parse()
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}

/// Parse a color mode from string.
fn parse_color_mode(s: &str) -> Result<ColorMode, String> {
    s.parse()
}
