// src/api.rs
//! Read-mostly JSON surface over the dashboard state.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::alerts::AlertView;
use crate::dashboard::{Dashboard, ListQuery};
use crate::entity::Entity;
use crate::feeds::{Cadence, FeedSnapshot, ViewMode};

#[derive(Clone)]
pub struct AppState {
    dashboard: Arc<Dashboard>,
}

impl AppState {
    pub fn new(dashboard: Arc<Dashboard>) -> Self {
        Self { dashboard }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/feeds", get(feeds))
        .route("/feeds/{name}", get(feed))
        .route("/feeds/{name}/refetch", post(refetch))
        .route("/refresh", post(refresh))
        .route("/view", get(current_view))
        .route("/view/{mode}", post(set_view))
        .route("/cadence/{secs}", post(set_cadence))
        .route("/alerts", get(alerts))
        .route("/alerts/{id}/dismiss", post(dismiss))
        .route("/alerts/dismiss-all", post(dismiss_all))
        .route("/alerts/snooze", post(snooze))
        .route("/correlation/{ticker}", get(correlation))
        .route("/list", get(list))
        .route("/history", get(history).delete(clear_history))
        .route("/watchlist", get(watchlist))
        .route("/watchlist/{ticker}", post(watch).delete(unwatch))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn feeds(State(state): State<AppState>) -> Json<Vec<FeedSnapshot>> {
    Json(state.dashboard.snapshots())
}

async fn feed(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FeedSnapshot>, StatusCode> {
    state
        .dashboard
        .snapshot(&name)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn refetch(State(state): State<AppState>, Path(name): Path<String>) -> StatusCode {
    if state.dashboard.refetch(&name) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn refresh(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let issued = state.dashboard.refresh_all();
    (StatusCode::ACCEPTED, Json(json!({ "issued": issued })))
}

#[derive(Serialize)]
struct ViewOut {
    view: ViewMode,
    active: Vec<String>,
}

fn view_out(d: &Dashboard) -> ViewOut {
    ViewOut {
        view: d.view(),
        active: d.scheduler().active_feeds(),
    }
}

async fn current_view(State(state): State<AppState>) -> Json<ViewOut> {
    Json(view_out(&state.dashboard))
}

async fn set_view(
    State(state): State<AppState>,
    Path(mode): Path<String>,
) -> Result<Json<ViewOut>, (StatusCode, String)> {
    let view: ViewMode = mode
        .parse()
        .map_err(|e: anyhow::Error| (StatusCode::BAD_REQUEST, e.to_string()))?;
    state.dashboard.set_view(view);
    Ok(Json(view_out(&state.dashboard)))
}

#[derive(Serialize)]
struct CadenceOut {
    /// Shared live period; null in default mode.
    live_secs: Option<u64>,
    active: Vec<String>,
}

/// `0` restores the per-feed defaults.
async fn set_cadence(State(state): State<AppState>, Path(secs): Path<u64>) -> Json<CadenceOut> {
    let d = &state.dashboard;
    let live_secs = match d.set_live_secs(secs) {
        Cadence::Live(p) => Some(p.as_secs()),
        Cadence::Default => None,
    };
    Json(CadenceOut {
        live_secs,
        active: d.scheduler().active_feeds(),
    })
}

#[derive(Deserialize)]
struct AlertsQuery {
    #[serde(default)]
    expanded: bool,
}

async fn alerts(State(state): State<AppState>, Query(q): Query<AlertsQuery>) -> Json<AlertView> {
    Json(state.dashboard.alerts().view(q.expanded))
}

async fn dismiss(State(state): State<AppState>, Path(id): Path<u64>) -> StatusCode {
    match state.dashboard.alerts().dismiss(id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn dismiss_all(State(state): State<AppState>) -> Json<Value> {
    let dismissed = state.dashboard.alerts().dismiss_all();
    Json(json!({ "dismissed": dismissed }))
}

async fn snooze(State(state): State<AppState>) -> Json<AlertView> {
    let alerts = state.dashboard.alerts();
    alerts.snooze();
    Json(alerts.view(false))
}

#[derive(Deserialize)]
struct CorrelationQuery {
    #[serde(default)]
    feed: Option<String>,
}

#[derive(Serialize)]
struct CorrelationOut {
    ticker: String,
    agreement: usize,
    /// Other feeds reporting the ticker; null without multi-feed agreement.
    feeds: Option<Vec<String>>,
}

async fn correlation(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(q): Query<CorrelationQuery>,
) -> Json<CorrelationOut> {
    let d = &state.dashboard;
    Json(CorrelationOut {
        feeds: d.correlation(&ticker, q.feed.as_deref()),
        agreement: d.correlation_agreement(&ticker),
        ticker: ticker.trim().to_ascii_uppercase(),
    })
}

async fn list(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Entity>>, StatusCode> {
    state
        .dashboard
        .list(&q)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    tracing::warn!("storage error: {e:#}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

async fn history(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.dashboard.search_history().await)
}

async fn clear_history(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    state
        .dashboard
        .clear_search_history()
        .await
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn watchlist(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.dashboard.watchlist().await)
}

async fn watch(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let added = state.dashboard.watch(&ticker).await.map_err(internal)?;
    Ok(Json(json!({ "added": added })))
}

async fn unwatch(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let removed = state.dashboard.unwatch(&ticker).await.map_err(internal)?;
    Ok(Json(json!({ "removed": removed })))
}
