//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::config::Config;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::ChallengeConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::MemoryStore;
use tower::ServiceExt;
use uuid::Uuid;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (Router, Arc<AppState<MemoryStore>>) {
    let config = Config {
        challenge: ChallengeConfig {
            min_votes_required: 3,
            ..ChallengeConfig::default()
        },
        ..Config::default()
    };
    let state = Arc::new(AppState::new(MemoryStore::new(), &config).unwrap());
    let app = api::create_app(Arc::clone(&state), get_metrics_handle());
    (app, state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_challenge(app: &Router, reward: i64) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/challenges",
        Some(json!({ "title": "Plank 3 min", "description": "Hold it", "reward": reward })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn submit(app: &Router, challenge_id: &str, user_id: Uuid) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        &format!("/challenges/{challenge_id}/submissions"),
        Some(json!({ "user_id": user_id, "proof_url": "https://proof.example/plank.mp4" })),
    )
    .await
}

async fn vote(app: &Router, submission_id: &str, voter_id: Uuid, approved: bool) -> StatusCode {
    send(
        app,
        "POST",
        &format!("/submissions/{submission_id}/votes"),
        Some(json!({ "voter_id": voter_id, "approved": approved, "review_time_ms": 75_000 })),
    )
    .await
    .0
}

#[tokio::test]
async fn test_health_check() {
    let (app, state) = setup();

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["event_bus"], "open");

    state.shutdown().await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["event_bus"], "closed");
}

#[tokio::test]
async fn test_metrics_endpoint_renders_text() {
    let (app, _state) = setup();
    create_challenge(&app, 10).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_create_and_get_challenge() {
    let (app, _state) = setup();
    let id = create_challenge(&app, 40).await;

    let (status, body) = send(&app, "GET", &format!("/challenges/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reward"], 40);
    assert_eq!(body["status"], "Active");

    let (status, body) = send(&app, "GET", "/challenges", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_challenge_is_bad_request() {
    let (app, _state) = setup();
    let (status, body) = send(
        &app,
        "POST",
        "/challenges",
        Some(json!({ "title": "Free XP", "description": "", "reward": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("reward"));
}

#[tokio::test]
async fn test_ids_are_validated() {
    let (app, _state) = setup();

    let (status, _) = send(&app, "GET", "/challenges/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", &format!("/challenges/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", &format!("/submissions/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_submission_conflicts() {
    let (app, _state) = setup();
    let challenge_id = create_challenge(&app, 10).await;
    let user = Uuid::new_v4();

    let (status, body) = submit(&app, &challenge_id, user).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "Pending");

    let (status, _) = submit(&app, &challenge_id, user).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_deactivated_challenge_rejects_submissions() {
    let (app, _state) = setup();
    let challenge_id = create_challenge(&app, 10).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/challenges/{challenge_id}/deactivate"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Inactive");

    let (status, _) = submit(&app, &challenge_id, Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_self_vote_conflicts() {
    let (app, _state) = setup();
    let challenge_id = create_challenge(&app, 10).await;
    let author = Uuid::new_v4();
    let (_, body) = submit(&app, &challenge_id, author).await;
    let submission_id = body["id"].as_str().unwrap().to_string();

    assert_eq!(vote(&app, &submission_id, author, true).await, StatusCode::CONFLICT);

    let (_, votes) = send(
        &app,
        "GET",
        &format!("/submissions/{submission_id}/votes"),
        None,
    )
    .await;
    assert!(votes.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_quorum_approves_and_credits_xp() {
    let (app, state) = setup();
    let challenge_id = create_challenge(&app, 120).await;
    let author = Uuid::new_v4();
    let (_, body) = submit(&app, &challenge_id, author).await;
    let submission_id = body["id"].as_str().unwrap().to_string();

    for _ in 0..3 {
        assert_eq!(
            vote(&app, &submission_id, Uuid::new_v4(), true).await,
            StatusCode::CREATED
        );
    }
    // Let the re-evaluation workers finish.
    state.service.shutdown().await;

    let (status, body) = send(&app, "GET", &format!("/submissions/{submission_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Approved");
    assert_eq!(body["tally"]["valid_positive"], 3);

    let (status, body) = send(&app, "GET", &format!("/users/{author}/xp"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 120);

    assert_eq!(
        vote(&app, &submission_id, Uuid::new_v4(), false).await,
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn test_sagas_listing_and_unknown_stop() {
    let (app, _state) = setup();

    let (status, body) = send(&app, "GET", "/sagas", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (status, _) = send(
        &app,
        "POST",
        &format!("/sagas/{}/stop", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
