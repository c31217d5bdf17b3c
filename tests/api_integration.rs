#![cfg(feature = "api")]

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::util::ServiceExt;

use common::small_config;
use profile_steer::api::{AppState, router};
use profile_steer::config::BackendKind;
use profile_steer::scenario;

const PROFILE_KEYS: &[&str] = &[
    "interval",
    "time_hr",
    "target_w",
    "aggregate_w",
    "difference_w",
    "base_w",
];

fn state() -> Arc<AppState> {
    let mut cfg = small_config(BackendKind::Differential);
    cfg.privacy.noise_scale = 0.0;
    let outcome = scenario::run(&cfg).unwrap();
    Arc::new(AppState::from(outcome))
}

async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let resp = router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn state_reflects_the_run() {
    let state = state();
    let rounds = state.outcome.rounds.len();
    let (status, json) = get(state, "/state").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["backend"], "differential");
    assert_eq!(json["horizon"]["intervals"], 24);
    assert_eq!(json["report"]["rounds"], rounds);
    assert_eq!(json["latest_round"]["iteration"], rounds - 1);
}

#[tokio::test]
async fn profile_points_have_stable_schema() {
    let (status, json) = get(state(), "/profile").await;
    assert_eq!(status, StatusCode::OK);

    let points = json.as_array().unwrap();
    assert_eq!(points.len(), 24);
    for point in points {
        let obj = point.as_object().unwrap();
        assert_eq!(obj.len(), PROFILE_KEYS.len());
        for key in PROFILE_KEYS {
            assert!(obj.contains_key(*key), "missing {key}");
        }
    }
}

#[tokio::test]
async fn rounds_range_filters_and_rejects_inverted_range() {
    let state = state();
    let (status, json) = get(Arc::clone(&state), "/rounds?from=0&to=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, _) = get(state, "/rounds?from=5&to=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (status, _) = get(state(), "/devices").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
