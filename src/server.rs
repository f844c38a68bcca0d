//! Local binding server for the map UI.
//!
//! The browser page is a pass-through renderer: it reads the view model from
//! `/api/view`, sends setter calls back, and re-reads whenever `/stream`
//! announces a new revision. All state lives in the one [`Dashboard`].

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{
        Html,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::client::{FeedSource, FeedType, UsgsClient};
use crate::dashboard::{Dashboard, SharedDashboard, ViewModel};
use crate::filters::CriteriaUpdate;
use crate::scheduler::RefreshScheduler;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub port: u16,
    pub host: String,
    pub base_url: String,
    pub feed_type: FeedType,
    pub refresh_period: Duration,
    pub auto_refresh: bool,
}

/// Shared application state.
pub struct AppState<S> {
    dashboard: SharedDashboard,
    scheduler: Arc<RefreshScheduler<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            dashboard: self.dashboard.clone(),
            scheduler: Arc::clone(&self.scheduler),
        }
    }
}

impl<S: FeedSource> AppState<S> {
    #[must_use]
    pub fn new(dashboard: SharedDashboard, scheduler: Arc<RefreshScheduler<S>>) -> Self {
        Self {
            dashboard,
            scheduler,
        }
    }
}

/// Body of `POST /api/auto-refresh`.
#[derive(Debug, Deserialize)]
pub struct AutoRefreshRequest {
    pub enabled: bool,
}

/// Create the Axum router with all routes.
pub fn create_router<S: FeedSource>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/view", get(view_handler::<S>))
        .route("/api/criteria", post(criteria_handler::<S>))
        .route("/api/criteria/reset", post(reset_handler::<S>))
        .route("/api/refresh", post(refresh_handler::<S>))
        .route("/api/auto-refresh", post(auto_refresh_handler::<S>))
        .route("/stream", get(sse_handler::<S>))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the dashboard and serve it until Ctrl+C.
pub async fn run_server(config: ServeConfig) -> anyhow::Result<()> {
    let client = UsgsClient::with_base_url(&config.base_url, config.feed_type)?;
    tracing::info!("polling {}", client.url());

    let dashboard = SharedDashboard::new(Dashboard::new(config.auto_refresh));
    let scheduler = Arc::new(RefreshScheduler::new(
        client,
        dashboard.clone(),
        config.refresh_period,
    ));
    // The initial fetch reports through the dashboard; no need to await it
    drop(scheduler.start());

    let app = create_router(AppState::new(dashboard, Arc::clone(&scheduler)));

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("🌍 quakewatch UI starting at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Main page handler - serves the HTML UI.
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Current view model.
async fn view_handler<S: FeedSource>(State(state): State<AppState<S>>) -> Json<ViewModel> {
    Json(state.dashboard.write().view())
}

/// Partial criteria update.
async fn criteria_handler<S: FeedSource>(
    State(state): State<AppState<S>>,
    Json(update): Json<CriteriaUpdate>,
) -> Json<ViewModel> {
    let mut dashboard = state.dashboard.write();
    dashboard.apply_update(update);
    Json(dashboard.view())
}

/// Restore default criteria.
async fn reset_handler<S: FeedSource>(State(state): State<AppState<S>>) -> Json<ViewModel> {
    let mut dashboard = state.dashboard.write();
    dashboard.reset_filters();
    Json(dashboard.view())
}

/// Manual refresh; the result arrives through `/stream`.
async fn refresh_handler<S: FeedSource>(State(state): State<AppState<S>>) -> StatusCode {
    drop(state.scheduler.manual_refresh());
    StatusCode::ACCEPTED
}

/// Toggle auto-refresh.
async fn auto_refresh_handler<S: FeedSource>(
    State(state): State<AppState<S>>,
    Json(req): Json<AutoRefreshRequest>,
) -> Json<ViewModel> {
    state.scheduler.set_auto_refresh(req.enabled);
    tracing::info!(
        timer_running = state.scheduler.timer_running(),
        "auto-refresh set to {}",
        req.enabled
    );
    Json(state.dashboard.write().view())
}

/// SSE stream of state revisions.
async fn sse_handler<S: FeedSource>(
    State(state): State<AppState<S>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.dashboard.read().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(revision) => Some(Ok(Event::default().event("update").data(revision.to_string()))),
        // Lagged receivers just wait for the next revision
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// HTML Template (embedded for single-binary deployment)
// ============================================================================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>quakewatch</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>
  body { margin: 0; display: flex; height: 100vh; font-family: -apple-system, BlinkMacSystemFont, sans-serif; background: #0f0f12; color: #fafafa; }
  #sidebar { width: 340px; display: flex; flex-direction: column; border-right: 1px solid #27272a; }
  #controls { padding: 12px; display: grid; gap: 8px; border-bottom: 1px solid #27272a; }
  #controls label { font-size: 12px; color: #a1a1aa; display: flex; justify-content: space-between; align-items: center; gap: 8px; }
  #status { font-size: 12px; padding: 6px 12px; color: #a1a1aa; }
  #error { color: #ef4444; font-size: 12px; padding: 0 12px; }
  #list { overflow-y: auto; flex: 1; }
  .item { padding: 8px 12px; border-bottom: 1px solid #18181b; cursor: pointer; font-size: 13px; }
  .item:hover { background: #18181b; }
  .mag { font-weight: 700; display: inline-block; width: 44px; }
  #map { flex: 1; }
  button { background: #27272a; color: #fafafa; border: 1px solid #3f3f46; border-radius: 6px; padding: 4px 10px; cursor: pointer; }
</style>
</head>
<body>
<div id="sidebar">
  <div id="controls">
    <label>Min magnitude <input id="min" type="number" step="0.1" min="0" max="10"></label>
    <label>Max magnitude <input id="max" type="number" step="0.1" min="0" max="10"></label>
    <label>Location <input id="query" type="text" placeholder="e.g. Alaska"></label>
    <label>Color by <select id="mode"><option value="severity">Severity</option><option value="depth">Depth</option></select></label>
    <label>Auto-refresh <input id="auto" type="checkbox"></label>
    <div><button id="refresh">Refresh</button> <button id="reset">Reset filters</button></div>
  </div>
  <div id="status"></div>
  <div id="error"></div>
  <div id="list"></div>
</div>
<div id="map"></div>
<script>
const map = L.map('map').setView([20, 0], 2);
L.tileLayer('https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png').addTo(map);
const layer = L.layerGroup().addTo(map);
const $ = (id) => document.getElementById(id);

async function post(path, body) {
  const res = await fetch(path, { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: body ? JSON.stringify(body) : undefined });
  if (res.status === 200) render(await res.json());
}

function render(view) {
  const c = view.criteria;
  if (document.activeElement !== $('min')) $('min').value = c.minMagnitude;
  if (document.activeElement !== $('max')) $('max').value = c.maxMagnitude;
  if (document.activeElement !== $('query')) $('query').value = c.locationQuery;
  $('mode').value = c.colorMode;
  $('auto').checked = view.autoRefreshEnabled;

  const updated = view.lastUpdated ? new Date(view.lastUpdated).toLocaleTimeString() : 'never';
  $('status').textContent = view.isLoading ? 'Loading…' :
    `${view.stats.count} events (${view.stats.filteredCount} shown) · max M${view.stats.maxMagnitude.toFixed(1)} · updated ${updated}`;
  $('error').textContent = view.lastError || '';

  layer.clearLayers();
  const list = $('list');
  list.innerHTML = '';
  const sorted = [...view.events].sort((a, b) => b.timestamp - a.timestamp);
  for (const ev of sorted) {
    const marker = L.circleMarker([ev.latitude, ev.longitude], {
      radius: ev.radius, fillColor: ev.colorHex, color: 'rgba(255,255,255,0.6)', weight: 1, fillOpacity: 0.8
    }).bindPopup(`<b>M${ev.magnitude.toFixed(1)}</b> ${escapeHtml(ev.place)}<br>${new Date(ev.timestamp).toUTCString()}<br>Depth ${ev.depthKm.toFixed(1)} km<br><a href="${escapeHtml(safeUrl(ev.detailUrl))}" target="_blank" rel="noopener">Details</a>`);
    layer.addLayer(marker);
    const item = document.createElement('div');
    item.className = 'item';
    const mag = document.createElement('span');
    mag.className = 'mag';
    mag.style.color = ev.colorHex;
    mag.textContent = `M${ev.magnitude.toFixed(1)}`;
    item.append(mag, document.createTextNode(ev.place));
    item.onclick = () => { map.setView([ev.latitude, ev.longitude], 6); marker.openPopup(); };
    list.appendChild(item);
  }
}

function escapeHtml(s) {
  return String(s).replace(/[&<>"']/g, (c) =>
    ({ '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;', "'": '&#39;' })[c]);
}

function safeUrl(u) {
  return /^https?:\/\//i.test(u) ? u : '#';
}

function magnitudeUpdate(key, value) {
  const v = parseFloat(value);
  if (!Number.isNaN(v)) post('/api/criteria', { [key]: v });
}

async function load() { render(await (await fetch('/api/view')).json()); }

$('min').onchange = (e) => magnitudeUpdate('minMagnitude', e.target.value);
$('max').onchange = (e) => magnitudeUpdate('maxMagnitude', e.target.value);
$('query').oninput = (e) => post('/api/criteria', { locationQuery: e.target.value });
$('mode').onchange = (e) => post('/api/criteria', { colorMode: e.target.value });
$('auto').onchange = (e) => post('/api/auto-refresh', { enabled: e.target.checked });
$('refresh').onclick = () => post('/api/refresh');
$('reset').onclick = () => post('/api/criteria/reset');

new EventSource('/stream').addEventListener('update', load);
load();
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::errors::FeedError;
    use crate::models::Event;
    use crate::models::tests::event;
    use crate::scheduler::DEFAULT_REFRESH_PERIOD;

    struct StaticSource;

    #[async_trait]
    impl FeedSource for StaticSource {
        async fn fetch_events(&self) -> Result<Vec<Event>, FeedError> {
            Ok(vec![
                event("a", 5.2, "Tokyo, Japan"),
                event("b", 2.1, "Reno, NV"),
            ])
        }
    }

    async fn start_app(auto_refresh: bool) -> (SocketAddr, Arc<RefreshScheduler<StaticSource>>) {
        let dashboard = SharedDashboard::new(Dashboard::new(auto_refresh));
        let scheduler = Arc::new(RefreshScheduler::new(
            StaticSource,
            dashboard.clone(),
            DEFAULT_REFRESH_PERIOD,
        ));
        scheduler.start().await.unwrap();

        let app = create_router(AppState::new(dashboard, Arc::clone(&scheduler)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, scheduler)
    }

    async fn post_json(addr: SocketAddr, path: &str, body: Value) -> Value {
        reqwest::Client::new()
            .post(format!("http://{addr}{path}"))
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_view_reports_loaded_events() {
        let (addr, _scheduler) = start_app(false).await;

        let view: Value = reqwest::get(format!("http://{addr}/api/view"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(view["stats"]["count"], 2);
        assert_eq!(view["events"].as_array().unwrap().len(), 2);
        assert_eq!(view["isLoading"], false);
        assert_eq!(view["lastError"], Value::Null);
        assert_eq!(view["autoRefreshEnabled"], false);
    }

    #[tokio::test]
    async fn test_criteria_update_and_reset() {
        let (addr, _scheduler) = start_app(false).await;

        let view = post_json(addr, "/api/criteria", json!({"minMagnitude": 3.0})).await;
        assert_eq!(view["events"].as_array().unwrap().len(), 1);
        assert_eq!(view["events"][0]["id"], "a");
        assert_eq!(view["stats"]["count"], 2);

        let view = post_json(addr, "/api/criteria", json!({"colorMode": "depth"})).await;
        assert_eq!(view["criteria"]["minMagnitude"], 3.0);
        assert_eq!(view["events"][0]["color"], "shallow");

        let view = post_json(addr, "/api/criteria/reset", Value::Null).await;
        assert_eq!(
            view["criteria"],
            json!({"minMagnitude": 0.0, "maxMagnitude": 10.0, "locationQuery": "", "colorMode": "severity"})
        );
    }

    #[tokio::test]
    async fn test_auto_refresh_toggle_drives_timer() {
        let (addr, scheduler) = start_app(true).await;
        assert!(scheduler.timer_running());

        let view = post_json(addr, "/api/auto-refresh", json!({"enabled": false})).await;
        assert_eq!(view["autoRefreshEnabled"], false);
        assert!(!scheduler.timer_running());

        post_json(addr, "/api/auto-refresh", json!({"enabled": true})).await;
        assert!(scheduler.timer_running());
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_stream_announces_criteria_change() {
        let (addr, _scheduler) = start_app(false).await;

        let mut stream = reqwest::get(format!("http://{addr}/stream")).await.unwrap();
        assert_eq!(stream.status(), reqwest::StatusCode::OK);

        let view = post_json(addr, "/api/criteria", json!({"locationQuery": "japan"})).await;
        let expected = format!("event: update\ndata: {}\n", view["revision"]);

        let received = tokio::time::timeout(Duration::from_secs(5), async move {
            let mut received = String::new();
            while !received.contains(&expected) {
                let chunk = stream.chunk().await.unwrap().expect("stream closed");
                received.push_str(&String::from_utf8_lossy(&chunk));
            }
            received
        })
        .await
        .expect("no update frame within timeout");

        assert!(received.starts_with("event: update\n"), "got {received:?}");
    }

    #[test]
    fn test_page_escapes_feed_text() {
        assert!(INDEX_HTML.contains("function escapeHtml"));
        assert!(INDEX_HTML.contains("${escapeHtml(ev.place)}"));
        assert!(INDEX_HTML.contains("${escapeHtml(safeUrl(ev.detailUrl))}"));
        assert!(!INDEX_HTML.contains("item.innerHTML"));
    }

    #[test]
    fn test_page_skips_empty_magnitude_fields() {
        assert!(!INDEX_HTML.contains("parseFloat(e.target.value) || 0"));
        assert!(INDEX_HTML.contains("if (!Number.isNaN(v))"));
    }

    #[tokio::test]
    async fn test_manual_refresh_accepted_and_health() {
        let (addr, _scheduler) = start_app(false).await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("http://{addr}/api/refresh"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);

        let body = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "OK");
    }
}
