//! Filter criteria and the derivation engine.
//!
//! [`derive`] is a pure function of the raw event list and the criteria; the
//! dashboard calls it on every read and only memoizes the result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::Event;

/// Default lower magnitude bound.
pub const DEFAULT_MIN_MAGNITUDE: f64 = 0.0;

/// Default upper magnitude bound.
pub const DEFAULT_MAX_MAGNITUDE: f64 = 10.0;

/// Which attribute drives marker color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Severity,
    Depth,
}

impl std::str::FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "severity" => Ok(Self::Severity),
            "depth" => Ok(Self::Depth),
            _ => Err(format!("unknown color mode: {s} (expected: severity, depth)")),
        }
    }
}

/// User-chosen filter and display configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub min_magnitude: f64,
    pub max_magnitude: f64,
    pub location_query: String,
    pub color_mode: ColorMode,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            min_magnitude: DEFAULT_MIN_MAGNITUDE,
            max_magnitude: DEFAULT_MAX_MAGNITUDE,
            location_query: String::new(),
            color_mode: ColorMode::Severity,
        }
    }
}

impl FilterCriteria {
    /// Restore the defaults.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Check if an event passes the magnitude range and location query.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.check_magnitude(event) && self.check_location(event)
    }

    fn check_magnitude(&self, event: &Event) -> bool {
        self.min_magnitude <= event.magnitude && event.magnitude <= self.max_magnitude
    }

    fn check_location(&self, event: &Event) -> bool {
        let query = self.location_query.trim();
        if query.is_empty() {
            return true;
        }
        event.place.to_lowercase().contains(&query.to_lowercase())
    }
}

/// A partial criteria change; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaUpdate {
    pub min_magnitude: Option<f64>,
    pub max_magnitude: Option<f64>,
    pub location_query: Option<String>,
    pub color_mode: Option<ColorMode>,
}

/// Summary numbers for the sidebar header.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Size of the whole feed, not the filtered list
    pub count: usize,
    pub filtered_count: usize,
    /// Largest magnitude in the whole feed, 0 when empty
    pub max_magnitude: f64,
}

/// Output of [`derive`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DerivedView {
    pub filtered: Vec<Event>,
    pub stats: Stats,
}

/// Apply `criteria` to `raw` and compute stats over the unfiltered list.
///
/// Filtered order matches input order.
#[must_use]
pub fn derive(raw: &[Event], criteria: &FilterCriteria) -> DerivedView {
    let filtered: Vec<Event> = raw
        .iter()
        .filter(|e| criteria.matches(e))
        .cloned()
        .collect();

    let max_magnitude = raw
        .iter()
        .map(|e| e.magnitude)
        .filter(|m| !m.is_nan())
        .reduce(f64::max)
        .unwrap_or(0.0);

    DerivedView {
        stats: Stats {
            count: raw.len(),
            filtered_count: filtered.len(),
            max_magnitude,
        },
        filtered,
    }
}

/// Single-slot memo for [`derive`], keyed on the events revision and the
/// criteria value.
#[derive(Debug, Default)]
pub struct DerivedCache {
    slot: Option<(u64, FilterCriteria, Arc<DerivedView>)>,
}

impl DerivedCache {
    /// Return the cached view if the key matches, otherwise derive and store.
    pub fn get_or_derive(
        &mut self,
        revision: u64,
        raw: &[Event],
        criteria: &FilterCriteria,
    ) -> Arc<DerivedView> {
        if let Some((rev, cached_criteria, view)) = &self.slot {
            if *rev == revision && cached_criteria == criteria {
                return Arc::clone(view);
            }
        }

        let view = Arc::new(derive(raw, criteria));
        self.slot = Some((revision, criteria.clone(), Arc::clone(&view)));
        view
    }
}
