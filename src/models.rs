//! Data models for the USGS GeoJSON summary feed and the normalized event.
//!
//! The raw structures mirror the feed format; only the fields the dashboard
//! consumes are decoded; everything else in `properties` is ignored.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::FeedError;

/// Place text used when the feed omits one.
pub const UNKNOWN_PLACE: &str = "Unknown location";

/// Event type used when the feed omits one.
pub const DEFAULT_EVENT_TYPE: &str = "earthquake";

/// Top-level GeoJSON document from a summary feed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    /// Earthquake features
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Decode a response body.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Parse`] if the body is not JSON or lacks the
    /// feature list.
    pub fn from_slice(body: &[u8]) -> Result<Self, FeedError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Normalize every feature into an [`Event`].
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Parse`] if any feature fails validation.
    pub fn into_events(self) -> Result<Vec<Event>, FeedError> {
        self.features.into_iter().map(Event::try_from).collect()
    }
}

/// A single feed feature.
#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    /// Unique event ID
    pub id: String,

    /// Point geometry
    pub geometry: Geometry,

    /// Event properties
    #[serde(default)]
    pub properties: Properties,
}

/// Point geometry of a feature.
#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    /// Coordinates: [longitude, latitude, depth_km]
    pub coordinates: Vec<f64>,
}

/// The subset of feature properties the dashboard uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Properties {
    /// Magnitude value
    pub mag: Option<f64>,

    /// Human-readable place description
    pub place: Option<String>,

    /// Event time (ms since epoch)
    pub time: Option<i64>,

    /// Event page URL
    pub url: Option<String>,

    /// Event type (earthquake, quarry blast, etc.)
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

/// One normalized earthquake record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub magnitude: f64,
    pub place: String,
    /// Event time (ms since epoch)
    pub timestamp: i64,
    pub detail_url: String,
    pub depth_km: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub event_type: String,
}

impl Event {
    /// Event time as a `DateTime<Utc>`.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

impl TryFrom<Feature> for Event {
    type Error = FeedError;

    fn try_from(f: Feature) -> Result<Self, Self::Error> {
        if f.id.is_empty() {
            return Err(FeedError::Parse("feature with empty id".into()));
        }
        let &[longitude, latitude, depth_km] = f.geometry.coordinates.as_slice() else {
            return Err(FeedError::Parse(format!(
                "feature {}: expected 3 coordinates, got {}",
                f.id,
                f.geometry.coordinates.len()
            )));
        };

        let p = f.properties;
        Ok(Self {
            id: f.id,
            magnitude: p.mag.unwrap_or(0.0),
            place: p.place.unwrap_or_else(|| UNKNOWN_PLACE.to_string()),
            timestamp: p.time.unwrap_or(0),
            detail_url: p.url.unwrap_or_default(),
            depth_km,
            latitude,
            longitude,
            event_type: p
                .event_type
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
        })
    }
}
