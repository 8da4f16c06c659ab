//! Integration tests for the fissure gateway endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Long-poll tests spawn the request, wait until
//! it is registered as a waiter, then publish a new snapshot.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use fissure_api::router::build_router;
use fissure_api::{ServerError, bind, spawn_gateway};
use fissure_api::state::AppState;
use fissure_core::FissureService;
use fissure_core::config::{HttpConfig, LongPollConfig};
use fissure_types::Fissure;
use serde_json::Value;
use tower::ServiceExt;

fn make_test_state() -> Arc<AppState> {
    let service = Arc::new(FissureService::new(Duration::from_secs(1)));
    service.apply_new_snapshot(vec![
        Fissure::new("s1", "Survival", false),
        Fissure::new("e1", "Exterminate", false),
        Fissure::new("s2", "Survival", true),
    ]);
    let limits = LongPollConfig {
        max_mission_types: 3,
        max_known_ids: 4,
        ..LongPollConfig::default()
    };
    Arc::new(AppState::new(service, limits))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_for_waiters(state: &AppState, expected: usize) {
    for _ in 0..1000 {
        if state.service.active_waiter_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(state.service.active_waiter_count(), expected);
}

fn ids(json: &Value) -> Vec<&str> {
    json["ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_current_returns_all_without_filters() {
    let router = build_router(make_test_state());

    let response = router.oneshot(get("/fissures/current")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["resolution"], "immediate");
    assert_eq!(json["count"], 3);
    assert_eq!(ids(&json), vec!["e1", "s1", "s2"]);
    assert_eq!(json["fissures"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_current_filters_by_mission_type_and_hard() {
    let state = make_test_state();

    let response = build_router(Arc::clone(&state))
        .oneshot(get("/fissures/current?missionTypes=survival"))
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(ids(&json), vec!["s1", "s2"]);

    let response = build_router(Arc::clone(&state))
        .oneshot(get("/fissures/current?missionTypes=Survival&isHard=true"))
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(ids(&json), vec!["s2"]);
    assert_eq!(json["fissures"][0]["isHard"], true);

    let response = build_router(state)
        .oneshot(get("/fissures/current?missionType=Exterminate,Survival&isHard=false"))
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(ids(&json), vec!["e1", "s1"]);
}

#[tokio::test]
async fn test_invalid_is_hard_is_bad_request() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(get("/fissures?isHard=maybe"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 400);
    assert!(json["error"].as_str().unwrap().contains("isHard"));
}

#[tokio::test]
async fn test_too_many_mission_types_is_bad_request() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(get("/fissures?missionTypes=a,b,c,d"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_too_many_known_ids_is_bad_request() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(get("/fissures?knownIds=a,b,c,d,e"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_first_poll_answers_immediately() {
    let state = make_test_state();

    let response = build_router(Arc::clone(&state))
        .oneshot(get("/fissures?missionTypes=Survival"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["resolution"], "immediate");
    assert_eq!(ids(&json), vec!["s1", "s2"]);
    assert_eq!(state.service.active_waiter_count(), 0);
}

#[tokio::test]
async fn test_stale_known_ids_answer_immediately() {
    let state = make_test_state();

    let response = build_router(Arc::clone(&state))
        .oneshot(get("/fissures?missionTypes=Survival&knownIds=s1"))
        .await
        .unwrap();

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["resolution"], "immediate");
    assert_eq!(json["count"], 2);
    assert_eq!(state.service.active_waiter_count(), 0);
}

#[tokio::test]
async fn test_long_poll_resolves_when_result_changes() {
    let state = make_test_state();
    let router = build_router(Arc::clone(&state));

    let pending = tokio::spawn(
        router.oneshot(get("/fissures?missionTypes=Exterminate&knownIds=e1&timeout=60")),
    );
    wait_for_waiters(&state, 1).await;

    // A change to another mission type leaves the waiter alone.
    state.service.apply_new_snapshot(vec![
        Fissure::new("s9", "Survival", false),
        Fissure::new("e1", "Exterminate", false),
    ]);
    assert_eq!(state.service.active_waiter_count(), 1);

    state.service.apply_new_snapshot(vec![
        Fissure::new("e1", "Exterminate", false),
        Fissure::new("e2", "Exterminate", false),
    ]);

    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["resolution"], "changed");
    assert_eq!(ids(&json), vec!["e1", "e2"]);
    assert_eq!(state.service.active_waiter_count(), 0);
}

#[tokio::test]
async fn test_empty_known_ids_waits_for_first_match() {
    let state = make_test_state();
    let router = build_router(Arc::clone(&state));

    let pending = tokio::spawn(router.oneshot(get("/fissures?missionTypes=Defense&knownIds=")));
    wait_for_waiters(&state, 1).await;

    state
        .service
        .apply_new_snapshot(vec![Fissure::new("d1", "Defense", false)]);

    let response = pending.await.unwrap().unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["resolution"], "changed");
    assert_eq!(ids(&json), vec!["d1"]);
}

#[tokio::test(start_paused = true)]
async fn test_long_poll_times_out_with_current_view() {
    let state = make_test_state();
    let router = build_router(Arc::clone(&state));

    let response = router
        .oneshot(get("/fissures?missionTypes=Survival&knownIds=s1,s2&timeout=5"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["resolution"], "timeout");
    assert_eq!(ids(&json), vec!["s1", "s2"]);
    assert_eq!(state.service.active_waiter_count(), 0);
}

#[tokio::test]
async fn test_client_disconnect_cancels_waiter() {
    let state = make_test_state();
    let router = build_router(Arc::clone(&state));

    let pending = tokio::spawn(router.oneshot(get("/fissures?knownIds=e1,s1,s2&timeout=60")));
    wait_for_waiters(&state, 1).await;

    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());
    assert_eq!(state.service.active_waiter_count(), 0);
    assert_eq!(state.service.status().active_filters, 0);
}

#[tokio::test]
async fn test_status_reports_counters() {
    let state = make_test_state();
    let router = build_router(Arc::clone(&state));

    let pending = tokio::spawn(
        build_router(Arc::clone(&state))
            .oneshot(get("/fissures?missionTypes=Survival&knownIds=s1,s2&timeout=60")),
    );
    wait_for_waiters(&state, 1).await;

    let response = router.oneshot(get("/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["snapshot_epoch"], 1);
    assert_eq!(json["records"], 3);
    assert_eq!(json["active_waiters"], 1);
    assert_eq!(json["active_filters"], 1);
    assert_eq!(json["filter_keys"][0], "types={\"survival\"};hard=*");
    assert!(json["last_updated"].is_string());

    pending.abort();
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(
            Request::get("/fissures/current")
                .header("Origin", "https://dashboard.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_cors_preflight_is_cached_for_an_hour() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(
            Request::options("/fissures")
                .header("Origin", "https://dashboard.example")
                .header("Access-Control-Request-Method", "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-max-age").unwrap(),
        "3600"
    );
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let router = build_router(make_test_state());

    let response = router.oneshot(get("/nonexistent")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_repeated_parameter_is_json_bad_request() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(get("/fissures?missionTypes=Survival&missionTypes=Defense"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 400);
    assert!(json["error"].as_str().unwrap().contains("missionTypes"));
}

#[tokio::test]
async fn test_gateway_binds_and_stops_on_shutdown() {
    let config = HttpConfig {
        host: String::from("127.0.0.1"),
        port: 0,
    };
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = spawn_gateway(&config, make_test_state(), async move {
        let _ = rx.await;
    })
    .await
    .unwrap();

    tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_gateway_rejects_invalid_address() {
    let config = HttpConfig {
        host: String::from("not an address"),
        port: 8080,
    };

    let result = bind(&config).await;

    assert!(matches!(result, Err(ServerError::Bind(_))));
}
