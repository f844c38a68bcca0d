//! USGS summary feed client.
//!
//! One async GET against a fixed GeoJSON endpoint, decoded into a flat list
//! of [`Event`]s. No retries here: the refresh scheduler re-invokes the
//! client on its own timetable.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::errors::FeedError;
use crate::models::{Event, FeatureCollection};

/// Default request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// User agent string for feed requests.
const USER_AGENT: &str = concat!("quakewatch/", env!("CARGO_PKG_VERSION"));

/// USGS base URL for earthquake feeds.
pub const USGS_BASE_URL: &str = "https://earthquake.usgs.gov";

/// Summary feeds published by USGS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedType {
    AllHour,
    #[default]
    AllDay,
    AllWeek,
    Mag25Day,
    Mag45Day,
    Mag45Week,
    SignificantWeek,
    SignificantMonth,
}

impl FeedType {
    /// Get the URL path segment for this feed type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllHour => "all_hour",
            Self::AllDay => "all_day",
            Self::AllWeek => "all_week",
            Self::Mag25Day => "2.5_day",
            Self::Mag45Day => "4.5_day",
            Self::Mag45Week => "4.5_week",
            Self::SignificantWeek => "significant_week",
            Self::SignificantMonth => "significant_month",
        }
    }
}

impl std::str::FromStr for FeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all_hour" => Ok(Self::AllHour),
            "all_day" => Ok(Self::AllDay),
            "all_week" => Ok(Self::AllWeek),
            "2.5_day" => Ok(Self::Mag25Day),
            "4.5_day" => Ok(Self::Mag45Day),
            "4.5_week" => Ok(Self::Mag45Week),
            "significant_week" => Ok(Self::SignificantWeek),
            "significant_month" => Ok(Self::SignificantMonth),
            _ => Err(format!("unknown feed type: {s}")),
        }
    }
}

/// Anything that can produce a fresh event list.
///
/// The scheduler only talks to this trait, so tests can drive it with a
/// scripted source instead of the network.
#[async_trait]
pub trait FeedSource: Send + Sync + 'static {
    /// Fetch the current feed contents.
    async fn fetch_events(&self) -> Result<Vec<Event>, FeedError>;
}

/// Client for the USGS summary feed.
#[derive(Debug, Clone)]
pub struct UsgsClient {
    client: Client,
    url: String,
}

impl UsgsClient {
    /// Create a client for `feed` on an arbitrary host.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn with_base_url(base_url: &str, feed: FeedType) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        let url = format!(
            "{}/earthquakes/feed/v1.0/summary/{}.geojson",
            base_url.trim_end_matches('/'),
            feed.as_str()
        );

        Ok(Self { client, url })
    }

    /// The endpoint this client fetches.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedSource for UsgsClient {
    #[instrument(skip(self))]
    async fn fetch_events(&self) -> Result<Vec<Event>, FeedError> {
        debug!("fetching feed from {}", self.url);

        let response = self.client.get(&self.url).send().await?;

        // Check status before parsing
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            };
            return Err(FeedError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        let events = FeatureCollection::from_slice(&body)?.into_events()?;

        debug!("fetched {} events", events.len());
        Ok(events)
    }
}
