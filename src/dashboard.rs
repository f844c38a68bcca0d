//! Dashboard state container.
//!
//! Owns the refresh state (raw events, loading flag, last error, auto-refresh
//! flag) and the filter criteria. All mutation goes through named setters.
//! Every fetch is tagged with a sequence number when it starts; completions
//! for anything other than the latest issued fetch are dropped.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::errors::FeedError;
use crate::filters::{ColorMode, CriteriaUpdate, DerivedCache, DerivedView, FilterCriteria, Stats};
use crate::models::Event;
use crate::style::{color_for, radius_for, ColorToken};

/// Capacity of the change-notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Proof that a fetch was started; hand it back on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct FetchTicket(u64);

/// What happened to a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Events replaced
    Applied,
    /// Error recorded, previous events kept
    Failed,
    /// A newer fetch was issued meanwhile; result ignored
    Superseded,
}

/// Refresh-side state.
#[derive(Debug, Default)]
struct RefreshState {
    raw_events: Arc<Vec<Event>>,
    events_revision: u64,
    is_loading: bool,
    last_error: Option<String>,
    auto_refresh_enabled: bool,
    last_updated: Option<DateTime<Utc>>,
    latest_fetch: u64,
}

/// The single state owner for one running dashboard.
#[derive(Debug)]
pub struct Dashboard {
    refresh: RefreshState,
    criteria: FilterCriteria,
    cache: DerivedCache,
    revision: u64,
    changes: broadcast::Sender<u64>,
}

impl Dashboard {
    /// Create an empty dashboard with default criteria.
    #[must_use]
    pub fn new(auto_refresh_enabled: bool) -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            refresh: RefreshState {
                auto_refresh_enabled,
                ..RefreshState::default()
            },
            criteria: FilterCriteria::default(),
            cache: DerivedCache::default(),
            revision: 0,
            changes,
        }
    }

    /// Subscribe to change notifications; each message is the new revision.
    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Monotonic counter bumped on every state change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
        // No subscribers is fine
        let _ = self.changes.send(self.revision);
    }

    // ---- refresh state -----------------------------------------------------

    /// Mark a fetch as started: loading on, previous error cleared.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.refresh.latest_fetch += 1;
        self.refresh.is_loading = true;
        self.refresh.last_error = None;
        self.touch();
        debug!(seq = self.refresh.latest_fetch, "fetch started");
        FetchTicket(self.refresh.latest_fetch)
    }

    /// Apply the result of the fetch identified by `ticket`.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Event>, FeedError>,
    ) -> FetchOutcome {
        let FetchTicket(seq) = ticket;
        if seq != self.refresh.latest_fetch {
            debug!(seq, latest = self.refresh.latest_fetch, "discarding superseded fetch");
            return FetchOutcome::Superseded;
        }

        self.refresh.is_loading = false;
        let outcome = match result {
            Ok(events) => {
                info!("loaded {} events", events.len());
                self.refresh.raw_events = Arc::new(events);
                self.refresh.events_revision += 1;
                self.refresh.last_updated = Some(Utc::now());
                FetchOutcome::Applied
            }
            Err(e) => {
                warn!("fetch failed, keeping previous events: {e}");
                self.refresh.last_error = Some(e.to_string());
                FetchOutcome::Failed
            }
        };
        self.touch();
        outcome
    }

    /// Current raw event list.
    #[must_use]
    pub fn raw_events(&self) -> Arc<Vec<Event>> {
        Arc::clone(&self.refresh.raw_events)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.refresh.is_loading
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.refresh.last_error.as_deref()
    }

    #[must_use]
    pub fn auto_refresh_enabled(&self) -> bool {
        self.refresh.auto_refresh_enabled
    }

    /// Record the auto-refresh flag. Returns `true` if it changed.
    ///
    /// The timer itself belongs to the scheduler.
    pub fn set_auto_refresh(&mut self, enabled: bool) -> bool {
        if self.refresh.auto_refresh_enabled == enabled {
            return false;
        }
        self.refresh.auto_refresh_enabled = enabled;
        self.touch();
        true
    }

    // ---- criteria ----------------------------------------------------------

    #[must_use]
    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn set_min_magnitude(&mut self, value: f64) {
        self.criteria.min_magnitude = value;
        self.touch();
    }

    pub fn set_max_magnitude(&mut self, value: f64) {
        self.criteria.max_magnitude = value;
        self.touch();
    }

    pub fn set_location_query(&mut self, query: impl Into<String>) {
        self.criteria.location_query = query.into();
        self.touch();
    }

    pub fn set_color_mode(&mut self, mode: ColorMode) {
        self.criteria.color_mode = mode;
        self.touch();
    }

    /// Apply every field present in `update`.
    pub fn apply_update(&mut self, update: CriteriaUpdate) {
        if let Some(v) = update.min_magnitude {
            self.set_min_magnitude(v);
        }
        if let Some(v) = update.max_magnitude {
            self.set_max_magnitude(v);
        }
        if let Some(q) = update.location_query {
            self.set_location_query(q);
        }
        if let Some(m) = update.color_mode {
            self.set_color_mode(m);
        }
    }

    pub fn reset_filters(&mut self) {
        self.criteria.reset();
        self.touch();
    }

    // ---- derived -----------------------------------------------------------

    /// Filtered list and stats for the current events and criteria.
    pub fn derived(&mut self) -> Arc<DerivedView> {
        let raw = self.raw_events();
        self.cache
            .get_or_derive(self.refresh.events_revision, &raw, &self.criteria)
    }

    /// Everything the renderer needs for one render cycle.
    pub fn view(&mut self) -> ViewModel {
        let derived = self.derived();
        let mode = self.criteria.color_mode;

        let events = derived
            .filtered
            .iter()
            .map(|e| {
                let color = color_for(e, mode);
                StyledEvent {
                    event: e.clone(),
                    color,
                    color_hex: color.hex(),
                    radius: radius_for(e.magnitude),
                }
            })
            .collect();

        ViewModel {
            revision: self.revision(),
            events,
            stats: derived.stats,
            is_loading: self.is_loading(),
            last_error: self.last_error().map(str::to_owned),
            auto_refresh_enabled: self.auto_refresh_enabled(),
            last_updated: self.refresh.last_updated,
            criteria: self.criteria().clone(),
        }
    }
}

/// An event with its display attributes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyledEvent {
    #[serde(flatten)]
    pub event: Event,
    pub color: ColorToken,
    pub color_hex: &'static str,
    pub radius: f64,
}

/// Per-render snapshot handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewModel {
    pub revision: u64,
    pub events: Vec<StyledEvent>,
    pub stats: Stats,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub auto_refresh_enabled: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub criteria: FilterCriteria,
}

/// Shared handle to the one dashboard instance.
///
/// Locks are only ever held for synchronous state updates, never across an
/// `.await`.
#[derive(Debug, Clone)]
pub struct SharedDashboard(Arc<RwLock<Dashboard>>);

impl SharedDashboard {
    #[must_use]
    pub fn new(dashboard: Dashboard) -> Self {
        Self(Arc::new(RwLock::new(dashboard)))
    }

    /// Shared read access.
    pub fn read(&self) -> RwLockReadGuard<'_, Dashboard> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, Dashboard> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}
