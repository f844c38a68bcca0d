//! Refresh scheduler: decides when the feed is fetched.
//!
//! One fetch fires immediately on start. While auto-refresh is on, an
//! [`AutoRefreshTimer`] fires another fetch every period, first tick one full
//! period after the timer was armed. Manual refreshes go out immediately.
//! Fetches are not serialized; the dashboard's sequence guard decides which
//! result sticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::client::FeedSource;
use crate::dashboard::{FetchTicket, SharedDashboard};

/// Default auto-refresh period (two minutes).
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_millis(120_000);

/// Run one fetch that has already been issued a ticket.
async fn run_fetch<S: FeedSource>(source: Arc<S>, dashboard: SharedDashboard, ticket: FetchTicket) {
    let result = source.fetch_events().await;
    let outcome = dashboard.write().complete_fetch(ticket, result);
    debug!(?outcome, "fetch finished");
}

/// Issue a ticket now and run the fetch in the background.
fn spawn_fetch<S: FeedSource>(source: &Arc<S>, dashboard: &SharedDashboard) -> JoinHandle<()> {
    let ticket = dashboard.write().begin_fetch();
    tokio::spawn(run_fetch(Arc::clone(source), dashboard.clone(), ticket))
}

/// A running periodic refresh. Dropping it stops the ticks.
///
/// The active flag is flipped under the dashboard lock, and each tick checks
/// it under that same lock before issuing a fetch, so once the drop returns
/// no tick of this instance can start another fetch.
#[derive(Debug)]
pub struct AutoRefreshTimer {
    handle: JoinHandle<()>,
    active: Arc<AtomicBool>,
    dashboard: SharedDashboard,
}

impl AutoRefreshTimer {
    fn start<S: FeedSource>(source: Arc<S>, dashboard: SharedDashboard, period: Duration) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let task_active = Arc::clone(&active);
        let task_dashboard = dashboard.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let ticket = {
                    let mut d = task_dashboard.write();
                    if !task_active.load(Ordering::Acquire) {
                        break;
                    }
                    d.begin_fetch()
                };
                debug!("auto-refresh tick");
                tokio::spawn(run_fetch(Arc::clone(&source), task_dashboard.clone(), ticket));
            }
        });

        info!("auto-refresh every {}s", period.as_secs());
        Self {
            handle,
            active,
            dashboard,
        }
    }
}

impl Drop for AutoRefreshTimer {
    fn drop(&mut self) {
        {
            let _guard = self.dashboard.write();
            self.active.store(false, Ordering::Release);
        }
        self.handle.abort();
        info!("auto-refresh stopped");
    }
}

/// Owns the "when to fetch" policy for one dashboard.
#[derive(Debug)]
pub struct RefreshScheduler<S> {
    source: Arc<S>,
    dashboard: SharedDashboard,
    period: Duration,
    timer: Mutex<Option<AutoRefreshTimer>>,
}

impl<S: FeedSource> RefreshScheduler<S> {
    #[must_use]
    pub fn new(source: S, dashboard: SharedDashboard, period: Duration) -> Self {
        Self {
            source: Arc::new(source),
            dashboard,
            period,
            timer: Mutex::new(None),
        }
    }

    fn timer_slot(&self) -> MutexGuard<'_, Option<AutoRefreshTimer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch once right away and arm the timer if auto-refresh is on.
    ///
    /// The returned handle resolves when the initial fetch completes.
    pub fn start(&self) -> JoinHandle<()> {
        let initial = spawn_fetch(&self.source, &self.dashboard);
        let mut slot = self.timer_slot();
        self.sync_timer(&mut slot);
        initial
    }

    /// Out-of-band fetch, independent of the timer.
    pub fn manual_refresh(&self) -> JoinHandle<()> {
        info!("manual refresh");
        spawn_fetch(&self.source, &self.dashboard)
    }

    /// Flip auto-refresh and start or stop the timer to match.
    ///
    /// Setting the current value again leaves the running timer alone.
    pub fn set_auto_refresh(&self, enabled: bool) {
        let mut slot = self.timer_slot();
        self.dashboard.write().set_auto_refresh(enabled);
        self.sync_timer(&mut slot);
    }

    /// Whether a timer is currently armed.
    #[must_use]
    pub fn timer_running(&self) -> bool {
        self.timer_slot().is_some()
    }

    /// Cancel the timer. In-flight fetches still complete.
    pub fn shutdown(&self) {
        self.timer_slot().take();
    }

    fn sync_timer(&self, slot: &mut Option<AutoRefreshTimer>) {
        let enabled = self.dashboard.read().auto_refresh_enabled();
        match (enabled, slot.is_some()) {
            (true, false) => {
                *slot = Some(AutoRefreshTimer::start(
                    Arc::clone(&self.source),
                    self.dashboard.clone(),
                    self.period,
                ));
            }
            (false, true) => {
                *slot = None;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::dashboard::Dashboard;
    use crate::errors::FeedError;
    use crate::models::tests::event;
    use crate::models::Event;

    const PERIOD: Duration = DEFAULT_REFRESH_PERIOD;

    /// Counts calls and always succeeds with a single event.
    #[derive(Default)]
    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FeedSource for CountingSource {
        async fn fetch_events(&self) -> Result<Vec<Event>, FeedError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![event(&format!("ev{n}"), 3.0, "somewhere")])
        }
    }

    /// Replays scripted (delay, result) pairs in call order.
    struct ScriptedSource {
        script: Mutex<VecDeque<(Duration, Result<Vec<Event>, FeedError>)>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<(Duration, Result<Vec<Event>, FeedError>)>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn fetch_events(&self) -> Result<Vec<Event>, FeedError> {
            let (delay, result) = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted");
            tokio::time::sleep(delay).await;
            result
        }
    }

    fn counting(auto: bool) -> (RefreshScheduler<CountingSource>, Arc<AtomicUsize>, SharedDashboard) {
        let source = CountingSource::default();
        let calls = Arc::clone(&source.calls);
        let dashboard = SharedDashboard::new(Dashboard::new(auto));
        let scheduler = RefreshScheduler::new(source, dashboard.clone(), PERIOD);
        (scheduler, calls, dashboard)
    }

    async fn sleep_secs(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fetches_once_without_auto_refresh() {
        let (scheduler, calls, dashboard) = counting(false);

        scheduler.start().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dashboard.read().raw_events().len(), 1);
        assert!(!scheduler.timer_running());

        sleep_secs(600).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_full_period() {
        let (scheduler, calls, _dashboard) = counting(true);

        scheduler.start().await.unwrap();
        assert!(scheduler.timer_running());

        sleep_secs(119).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        sleep_secs(2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        sleep_secs(120).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_stops_ticks() {
        let (scheduler, calls, dashboard) = counting(true);
        scheduler.start().await.unwrap();

        scheduler.set_auto_refresh(false);
        assert!(!scheduler.timer_running());
        assert!(!dashboard.read().auto_refresh_enabled());

        sleep_secs(1200).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_off_on_keeps_single_timer() {
        let (scheduler, calls, _dashboard) = counting(true);
        scheduler.start().await.unwrap();

        sleep_secs(30).await;
        scheduler.set_auto_refresh(false);
        scheduler.set_auto_refresh(true);
        scheduler.set_auto_refresh(true);
        assert!(scheduler.timer_running());

        // Old timer would have fired at 120s; the new one fires at 150s.
        sleep_secs(100).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        sleep_secs(21).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        sleep_secs(120).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_is_independent_of_timer() {
        let (scheduler, calls, _dashboard) = counting(false);
        scheduler.start().await.unwrap();

        scheduler.manual_refresh().await.unwrap();
        scheduler.manual_refresh().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_and_drop_cancel_timer() {
        let (scheduler, calls, _dashboard) = counting(true);
        scheduler.start().await.unwrap();
        scheduler.shutdown();
        sleep_secs(600).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (scheduler, calls, _dashboard) = counting(true);
        scheduler.start().await.unwrap();
        drop(scheduler);
        sleep_secs(600).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_success_keeps_events() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(vec![event("a", 4.0, "Chile"), event("b", 1.0, "Peru")])),
            (Duration::ZERO, Err(FeedError::Http { status: 500, message: "boom".into() })),
        ]);
        let dashboard = SharedDashboard::new(Dashboard::new(false));
        let scheduler = RefreshScheduler::new(source, dashboard.clone(), PERIOD);

        scheduler.start().await.unwrap();
        scheduler.manual_refresh().await.unwrap();

        let d = dashboard.read();
        assert!(d.last_error().unwrap().contains("HTTP 500"));
        assert_eq!(d.raw_events().len(), 2);
        assert!(!d.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_older_fetch_does_not_overwrite_newer() {
        let source = ScriptedSource::new(vec![
            (Duration::from_secs(10), Ok(vec![event("old", 1.0, "x")])),
            (Duration::from_secs(1), Ok(vec![event("new", 2.0, "y")])),
        ]);
        let dashboard = SharedDashboard::new(Dashboard::new(false));
        let scheduler = RefreshScheduler::new(source, dashboard.clone(), PERIOD);

        let older = scheduler.start();
        let newer = scheduler.manual_refresh();

        newer.await.unwrap();
        assert_eq!(dashboard.read().raw_events()[0].id, "new");
        assert!(!dashboard.read().is_loading());

        older.await.unwrap();
        assert_eq!(dashboard.read().raw_events()[0].id, "new");
    }
}
