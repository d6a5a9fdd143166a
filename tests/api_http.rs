// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::Router;
use http::{Request, StatusCode};
use pulse_feeds::alerts::AlertConfig;
use pulse_feeds::api::{self, AppState};
use pulse_feeds::feeds::{
    FeedDescriptor, FeedSource, StaticSource, MARKET_PULSE, MOMENTUM_SCANNER, MOVERS,
};
use pulse_feeds::{Cadence, Dashboard, FeedRegistry, ViewMode};
use serde_json::{json, Value};
use tower::ServiceExt as _; // for `oneshot`

const BODY_LIMIT: usize = 1024 * 1024;

fn feed(name: &str, payload: Value) -> FeedDescriptor {
    let src: Arc<dyn FeedSource> = Arc::new(StaticSource::new(name, payload));
    FeedDescriptor::new(name, src).every(Duration::from_secs(30))
}

/// Dashboard over in-memory feeds, with every snapshot already fetched.
async fn test_app() -> (Router, Arc<Dashboard>) {
    let reg = FeedRegistry::new()
        .register(feed(
            MOVERS,
            json!({"movers": [{"ticker": "NVDA", "change_percent": 8.0}]}),
        ))
        .register(
            feed(
                MARKET_PULSE,
                json!({"stocks": [
                    {"ticker": "AAA", "score": 10.0},
                    {"ticker": "BBB", "score": 30.0},
                    {"ticker": "CCC", "score": 20.0}
                ]}),
            )
            .active_in(&[ViewMode::Momentum, ViewMode::Scanner]),
        )
        .register(
            feed(MOMENTUM_SCANNER, json!({"opportunities": [{"symbol": "BBB"}]}))
                .active_in(&[ViewMode::Momentum, ViewMode::Scanner]),
        );
    let dash = Arc::new(Dashboard::new(reg, ViewMode::Momentum, AlertConfig::default()));
    for h in dash.scheduler().refetch_all() {
        h.await.unwrap();
    }
    dash.rebuild_correlation();
    (api::router(AppState::new(dash.clone())), dash)
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, v)
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = test_app().await;
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn feeds_expose_snapshots() {
    let (app, _) = test_app().await;

    let (status, all) = send(app.clone(), "GET", "/feeds").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (status, one) = send(app.clone(), "GET", "/feeds/movers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["feed"], "movers");
    assert_eq!(one["error"], false);
    assert!(one["payload"]["movers"].is_array());

    let (status, _) = send(app.clone(), "GET", "/feeds/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app.clone(), "POST", "/feeds/movers/refetch").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = send(app.clone(), "POST", "/feeds/nope/refetch").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(app, "POST", "/refresh").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["issued"], 3);
}

#[tokio::test]
async fn view_switch_validates_mode() {
    let (app, dash) = test_app().await;

    let (status, body) = send(app.clone(), "POST", "/view/news").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["view"], "news");
    assert_eq!(dash.view(), ViewMode::News);

    let (status, _) = send(app, "POST", "/view/charts").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(dash.view(), ViewMode::News);
    dash.shutdown();
}

#[tokio::test]
async fn list_filters_and_sorts() {
    let (app, _) = test_app().await;

    let (status, rows) = send(app.clone(), "GET", "/list?min_score=15").await;
    assert_eq!(status, StatusCode::OK);
    let tickers: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["ticker"].as_str().unwrap())
        .collect();
    assert_eq!(tickers, vec!["BBB", "CCC"]);

    let (_, rows) = send(app.clone(), "GET", "/list?search=aaa&min_score=50").await;
    assert_eq!(rows[0]["ticker"], "AAA");
    assert_eq!(rows.as_array().unwrap().len(), 1);

    let (status, _) = send(app, "GET", "/list?feed=missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn correlation_reports_other_feeds() {
    let (app, _) = test_app().await;

    let (_, hit) = send(app.clone(), "GET", "/correlation/bbb?feed=market_pulse").await;
    assert_eq!(hit["ticker"], "BBB");
    assert_eq!(hit["agreement"], 2);
    assert_eq!(hit["feeds"], json!(["momentum_scanner"]));

    let (_, miss) = send(app, "GET", "/correlation/AAA").await;
    assert_eq!(miss["feeds"], Value::Null);
    assert_eq!(miss["agreement"], 0);
}

#[tokio::test]
async fn alert_actions() {
    let (app, dash) = test_app().await;
    let created = dash
        .alerts()
        .apply(&dash.scheduler().entities(MOVERS))
        .created;
    assert_eq!(created.len(), 1);

    let (_, view) = send(app.clone(), "GET", "/alerts").await;
    assert_eq!(view["shown"][0]["entity"]["ticker"], "NVDA");
    assert_eq!(view["overflow"], 0);

    let uri = format!("/alerts/{}/dismiss", created[0]);
    let (status, _) = send(app.clone(), "POST", &uri).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(app.clone(), "POST", &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(app.clone(), "POST", "/alerts/dismiss-all").await;
    assert_eq!(body["dismissed"], 0);

    let (_, snoozed) = send(app.clone(), "POST", "/alerts/snooze").await;
    assert_eq!(snoozed["snoozed"], true);
    let left = snoozed["snooze_remaining_secs"].as_u64().unwrap();
    assert!((599..=600).contains(&left));

    let (_, view) = send(app, "GET", "/alerts?expanded=true").await;
    assert!(view["shown"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cadence_switch_and_reset() {
    let (app, dash) = test_app().await;

    let (status, body) = send(app.clone(), "POST", "/cadence/5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["live_secs"], 5);
    assert_eq!(dash.cadence(), Cadence::Live(Duration::from_secs(5)));
    assert!(body["active"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f == MOVERS));

    let (_, body) = send(app.clone(), "POST", "/cadence/0").await;
    assert_eq!(body["live_secs"], Value::Null);
    assert_eq!(dash.cadence(), Cadence::Default);

    let (status, _) = send(app, "POST", "/cadence/fast").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    dash.shutdown();
}
