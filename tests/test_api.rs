//! Integration tests against the REST API surface (§6), driven straight
//! through the axum `Router` via `tower::ServiceExt::oneshot` — the same
//! approach the teacher's `axum_channel` tests use for its handlers, just
//! without a real `TcpListener`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt as _;
use tower::ServiceExt as _;

use tgmonitor::api::{build_router, ApiState};
use tgmonitor::auth::UserStore;
use tgmonitor::domain::Role;
use tgmonitor::ingest::transport::StubTransport;
use tgmonitor::store::Store;
use tgmonitor::validate::prober::Prober;
use tgmonitor::validate::{CircuitBreaker, TaskRegistry};

fn test_state(tmp: &tempfile::TempDir, guest_mode: bool) -> ApiState {
    let store = Store::open(&tmp.path().join("tg.db")).unwrap();
    let users = UserStore::new(tmp.path().join("users.json"));
    users.create("admin", "adminpw", "Admin", "", Role::Admin).unwrap();
    users.create("alice", "alicepw", "Alice", "", Role::User).unwrap();

    let transport = Arc::new(StubTransport {
        ok_channels: vec!["good_channel".to_string()],
        monitored_channels: vec![],
    });

    ApiState::new(
        store,
        users,
        Arc::new(TaskRegistry::new()),
        Arc::new(CircuitBreaker::new()),
        Arc::new(Prober::Stub(|_, _| tgmonitor::validate::prober::ProbeOutcome {
            is_valid: true,
            status_code: Some(200),
            response_time: Some(0.01),
            reason: None,
        })),
        transport,
        "test-secret".to_string(),
        guest_mode,
        tmp.path().join(".env"),
    )
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(router: &axum::Router, username: &str, password: &str) -> String {
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "username": username, "password": password }).to_string()))
        .unwrap();
    let response = router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn login_then_me_round_trips_identity() {
    let tmp = tempfile::tempdir().unwrap();
    let router = build_router(test_state(&tmp, false));

    let token = login(&router, "alice", "alicepw").await;

    let req = Request::builder()
        .uri("/api/auth/me")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let tmp = tempfile::tempdir().unwrap();
    let router = build_router(test_state(&tmp, false));

    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "username": "alice", "password": "wrong" }).to_string()))
        .unwrap();
    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn messages_without_bearer_token_is_unauthorized_when_guest_mode_disabled() {
    let tmp = tempfile::tempdir().unwrap();
    let router = build_router(test_state(&tmp, false));

    let req = Request::builder().uri("/api/messages").body(Body::empty()).unwrap();
    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn messages_without_bearer_token_falls_back_to_guest_when_enabled() {
    let tmp = tempfile::tempdir().unwrap();
    let router = build_router(test_state(&tmp, true));

    let req = Request::builder().uri("/api/messages").body(Body::empty()).unwrap();
    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn guest_query_is_coerced_to_last_24_hours_and_clamped_page_size() {
    let tmp = tempfile::tempdir().unwrap();
    let router = build_router(test_state(&tmp, true));

    let req = Request::builder()
        .uri("/api/messages?time_range=all&page_size=5000&query=whatever")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["page_size"].as_i64().unwrap() <= 100);
}

#[tokio::test]
async fn admin_routes_reject_non_admin_users() {
    let tmp = tempfile::tempdir().unwrap();
    let router = build_router(test_state(&tmp, false));
    let token = login(&router, "alice", "alicepw").await;

    let req = Request::builder()
        .uri("/api/admin/channels")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_can_create_list_and_delete_a_channel() {
    let tmp = tempfile::tempdir().unwrap();
    let router = build_router(test_state(&tmp, false));
    let token = login(&router, "admin", "adminpw").await;

    let create = Request::builder()
        .method("POST")
        .uri("/api/admin/channels")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "username": "some_channel" }).to_string()))
        .unwrap();
    let response = router.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = json_body(response).await;
    let id = created["id"].as_i64().unwrap();

    let list = Request::builder()
        .uri("/api/admin/channels")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(list).await.unwrap();
    let channels = json_body(response).await;
    assert_eq!(channels.as_array().unwrap().len(), 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/admin/channels/{id}"))
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn channel_diagnose_uses_stub_transport() {
    let tmp = tempfile::tempdir().unwrap();
    let router = build_router(test_state(&tmp, false));
    let token = login(&router, "admin", "adminpw").await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/admin/channels/diagnose")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "channels": ["good_channel", "bad_channel"] }).to_string()))
        .unwrap();
    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let results = json_body(response).await;
    let results = results.as_array().unwrap();
    assert!(results.iter().any(|r| r["channel"] == "good_channel" && r["ok"] == true));
    assert!(results.iter().any(|r| r["channel"] == "bad_channel" && r["ok"] == false));
}

#[tokio::test]
async fn link_check_lifecycle_start_status_and_cancel() {
    let tmp = tempfile::tempdir().unwrap();
    let router = build_router(test_state(&tmp, false));
    let token = login(&router, "admin", "adminpw").await;

    let start = Request::builder()
        .method("POST")
        .uri("/api/admin/link-check/start")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "period": "today" }).to_string()))
        .unwrap();
    let response = router.clone().oneshot(start).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let cancel = Request::builder()
        .method("DELETE")
        .uri(format!("/api/admin/link-check/tasks/{task_id}"))
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(cancel).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_task_id_status_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let router = build_router(test_state(&tmp, false));
    let token = login(&router, "admin", "adminpw").await;

    let req = Request::builder()
        .uri("/api/admin/link-check/tasks/does-not-exist")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
