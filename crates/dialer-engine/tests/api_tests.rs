//! HTTP surface exercised through the router without a socket

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{create_test_dialer, hours_ago, lead, TestDialer};
use dialer_engine::api::create_router;

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn app_with_seed() -> (TestDialer, Router) {
    let dialer = create_test_dialer().await;
    let app = create_router(dialer.engine.clone());
    let (status, body) = send(&app, Method::POST, "/seed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lists_inserted"], 5);
    assert_eq!(body["dispositions_inserted"], 9);
    (dialer, app)
}

#[tokio::test]
async fn test_health_reports_database() {
    let dialer = create_test_dialer().await;
    let app = create_router(dialer.engine.clone());

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn test_call_flow_over_http() {
    let (dialer, app) = app_with_seed().await;
    dialer.records.insert(lead("web-lead", Some("+15550300001"), hours_ago(1)));

    let (status, list) = send(
        &app,
        Method::POST,
        "/lists",
        Some(json!({ "name": "Web Leads", "list_type": "STATIC", "cadence_hours": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let list_id = list["id"].as_str().unwrap().to_string();

    let (status, added) = send(
        &app,
        Method::POST,
        &format!("/lists/{}/items", list_id),
        Some(json!({ "record_ids": ["web-lead"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(added["added"].as_array().unwrap().len(), 1);

    let (status, next) = send(
        &app,
        Method::POST,
        &format!("/lists/{}/next", list_id),
        Some(json!({ "agent_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(next["item"]["status"], "IN_PROGRESS");
    let item_id = next["item"]["id"].as_str().unwrap().to_string();

    let (status, outcome) = send(
        &app,
        Method::POST,
        &format!("/items/{}/disposition", item_id),
        Some(json!({ "code": "NO_ANSWER", "agent_id": "alice", "talk_time_ms": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["item"]["status"], "PENDING");
    assert_eq!(outcome["actions"][0]["action"], "requeued");

    let (status, calls) = send(&app, Method::GET, &format!("/items/{}/calls", item_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(calls.as_array().unwrap().len(), 1);
    assert_eq!(calls[0]["outcome"], "NO_ANSWER");

    let (status, empty) = send(
        &app,
        Method::POST,
        &format!("/lists/{}/next", list_id),
        Some(json!({ "agent_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(empty["item"].is_null());

    let (status, dashboard) = send(&app, Method::GET, &format!("/dashboard/{}", list_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["calls_last_24h"], 1);
}

#[tokio::test]
async fn test_errors_map_to_status_codes() {
    let (_dialer, app) = app_with_seed().await;

    let (status, body) = send(&app, Method::GET, "/items/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, body) = send(
        &app,
        Method::POST,
        "/lists",
        Some(json!({ "name": "No Filter", "list_type": "DYNAMIC" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION");

    let (status, lists) = send(&app, Method::GET, "/lists", None).await;
    assert_eq!(status, StatusCode::OK);
    let static_id = lists
        .as_array()
        .unwrap()
        .iter()
        .find(|l| l["name"] == "Reactivation")
        .and_then(|l| l["id"].as_str())
        .unwrap()
        .to_string();

    let (status, _) = send(&app, Method::POST, &format!("/lists/{}/refresh", static_id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::POST, &format!("/lists/{}/items", static_id), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_disposition_catalog_routes() {
    let (_dialer, app) = app_with_seed().await;

    let (status, catalog) = send(&app, Method::GET, "/dispositions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(catalog.as_array().unwrap().len(), 9);

    let (status, created) = send(
        &app,
        Method::POST,
        "/dispositions",
        Some(json!({ "code": "LANGUAGE_BARRIER", "name": "Language Barrier", "sort_order": 95 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::POST, &format!("/dispositions/{}/deactivate", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/dispositions",
        Some(json!({ "code": "NO_ANSWER", "name": "Duplicate" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_routes() {
    let dialer = create_test_dialer().await;
    let app = create_router(dialer.engine.clone());

    let (status, session) = send(&app, Method::POST, "/sessions", Some(json!({ "user_id": "alice" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["dialer_mode"], "PREVIEW");
    let id = session["id"].as_str().unwrap().to_string();

    let (status, active) = send(&app, Method::GET, "/sessions?user_id=alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["session"]["id"], id.as_str());

    let (status, paused) = send(&app, Method::POST, &format!("/sessions/{}/pause", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!paused["paused_at"].is_null());

    let (status, stats) = send(
        &app,
        Method::POST,
        &format!("/sessions/{}/stats", id),
        Some(json!({ "connected": true, "talk_time_ms": 1000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_calls"], 1);

    let (status, ended) = send(&app, Method::POST, &format!("/sessions/{}/end", id), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["termination_reason"], "agent_logout");

    let (status, _) = send(&app, Method::POST, &format!("/sessions/{}/end", id), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, none) = send(&app, Method::GET, "/sessions?user_id=alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(none["session"].is_null());
}
