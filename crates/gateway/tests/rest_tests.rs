//! REST surface tests driving the router in-process.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use parley_config::{DatabaseConfig, RealtimeConfig};
use parley_database::entities::CreateUserRequest;
use parley_database::initialize_database;
use parley_database::repos::UserRepository;
use parley_gateway::{create_router, GatewayState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    router: Router,
    users: UserRepository,
}

async fn test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("test.db").display()),
        max_connections: 5,
    };
    let pool = initialize_database(&config).await.unwrap();
    let users = UserRepository::new(pool.clone());
    let state = GatewayState::new(pool, &RealtimeConfig::default());
    TestApp {
        _dir: dir,
        router: create_router(state),
        users,
    }
}

impl TestApp {
    async fn seed_user(&self, subject: &str, username: &str) -> i64 {
        self.users
            .create(&CreateUserRequest {
                subject: subject.to_string(),
                username: username.to_string(),
                avatar_url: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        subject: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(subject) = subject {
            builder = builder.header("x-user-subject", subject);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

#[tokio::test]
async fn health_needs_no_identity() {
    let app = test_app().await;
    let (status, body) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_subject_header_is_unauthorized() {
    let app = test_app().await;
    let (status, _) = app.request("GET", "/api/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request("GET", "/api/chats", Some("auth0|ghost"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn direct_chat_roundtrip() {
    let app = test_app().await;
    let _alice = app.seed_user("auth0|alice", "alice").await;
    let bob = app.seed_user("auth0|bob", "bob").await;

    let (status, chat) = app
        .request(
            "POST",
            "/api/chats",
            Some("auth0|alice"),
            Some(json!({ "user_id": bob })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["is_group"], false);

    // The other side sees the same chat in their list.
    let (status, chats) = app.request("GET", "/api/chats", Some("auth0|bob"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chats.as_array().unwrap().len(), 1);
    assert_eq!(chats[0]["public_id"], chat["public_id"]);
}

#[tokio::test]
async fn group_creation_validates_size() {
    let app = test_app().await;
    let _alice = app.seed_user("auth0|alice", "alice").await;
    let bob = app.seed_user("auth0|bob", "bob").await;

    let (status, _) = app
        .request(
            "POST",
            "/api/chats/group",
            Some("auth0|alice"),
            Some(json!({ "name": "pair", "user_ids": [bob] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn message_send_and_history() {
    let app = test_app().await;
    let _alice = app.seed_user("auth0|alice", "alice").await;
    let bob = app.seed_user("auth0|bob", "bob").await;

    let (_, chat) = app
        .request(
            "POST",
            "/api/chats",
            Some("auth0|alice"),
            Some(json!({ "user_id": bob })),
        )
        .await;
    let chat_id = chat["public_id"].as_str().unwrap().to_string();

    let (status, message) = app
        .request(
            "POST",
            "/api/messages",
            Some("auth0|alice"),
            Some(json!({ "chat_id": chat_id, "content": "hello" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message["content"], "hello");
    assert_eq!(message["sender"]["username"], "alice");

    let (status, history) = app
        .request(
            "GET",
            &format!("/api/messages/{chat_id}"),
            Some("auth0|bob"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);

    // An outsider cannot read the history.
    let _mallory = app.seed_user("auth0|mallory", "mallory").await;
    let (status, _) = app
        .request(
            "GET",
            &format!("/api/messages/{chat_id}"),
            Some("auth0|mallory"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn empty_text_message_is_rejected() {
    let app = test_app().await;
    let _alice = app.seed_user("auth0|alice", "alice").await;
    let bob = app.seed_user("auth0|bob", "bob").await;

    let (_, chat) = app
        .request(
            "POST",
            "/api/chats",
            Some("auth0|alice"),
            Some(json!({ "user_id": bob })),
        )
        .await;
    let chat_id = chat["public_id"].as_str().unwrap();

    let (status, _) = app
        .request(
            "POST",
            "/api/messages",
            Some("auth0|alice"),
            Some(json!({ "chat_id": chat_id, "content": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn notifications_roundtrip() {
    let app = test_app().await;
    let _alice = app.seed_user("auth0|alice", "alice").await;
    let bob = app.seed_user("auth0|bob", "bob").await;

    let (_, chat) = app
        .request(
            "POST",
            "/api/chats",
            Some("auth0|alice"),
            Some(json!({ "user_id": bob })),
        )
        .await;
    let chat_id = chat["public_id"].as_str().unwrap();

    // Bob is not subscribed to the room, so the send leaves him a
    // notification.
    app.request(
        "POST",
        "/api/messages",
        Some("auth0|alice"),
        Some(json!({ "chat_id": chat_id, "content": "ping" })),
    )
    .await;

    let (status, unread) = app
        .request("GET", "/api/notifications", Some("auth0|bob"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unread.as_array().unwrap().len(), 1);

    let (status, cleared) = app
        .request("PUT", "/api/notifications/read", Some("auth0|bob"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["cleared"], 1);

    let (_, unread) = app
        .request("GET", "/api/notifications", Some("auth0|bob"), None)
        .await;
    assert!(unread.as_array().unwrap().is_empty());
}
