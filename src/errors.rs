//! Error types for quakewatch.
//!
//! Uses `thiserror` for library-style error definitions. Every variant is
//! caught at the feed client boundary and folded into the dashboard's
//! `last_error` string; none of them is fatal.

use thiserror::Error;

/// Errors that can occur while fetching the earthquake feed.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Request could not complete (DNS, connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Feed responded with a non-success status
    #[error("USGS feed error (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    /// Response body did not have the expected structure
    #[error("failed to parse feed: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
