use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE},
        Method, Request, StatusCode,
    },
    Router,
};
use dashboard::{
    config::{self, Config},
    database,
    drive::{Container, DrivePreferences, Format, RewardTier, Service},
    login::{self, SessionToken, UserId},
    router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

struct Harness {
    app: Router,
    login: login::Database,
}

impl Harness {
    fn new() -> Self {
        let config = Config {
            server: config::Server::default(),
            database: config::Database {
                path: PathBuf::from(":memory:"),
            },
        };
        let dbs = database(&config).expect("cannot start database");
        let login = dbs.login.clone();
        Self {
            app: router(Arc::new(dbs)),
            login,
        }
    }

    async fn patron(&self, tier: i32) -> (UserId, SessionToken) {
        let user_id = self.login.new_user(RewardTier(tier)).await.unwrap();
        let token = self
            .login
            .new_session(user_id, Duration::from_secs(3600))
            .await
            .unwrap();
        (user_id, token)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn put(&self, token: Option<SessionToken>, body: Value) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(Method::PUT)
            .uri("/api/user/drive")
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(request.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn drive(&self, user_id: UserId) -> (DrivePreferences, i64) {
        let record = self.login.find_user(user_id).await.unwrap().unwrap();
        (record.drive, record.drive_revision)
    }
}

fn body(format: &str, container: &str, enabled: Value, service: &str) -> Value {
    json!({
        "format": format,
        "container": container,
        "enabled": enabled,
        "service": service,
    })
}

fn error(message: &str) -> Value {
    json!({ "error": message })
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    let harness = Harness::new();
    let (_, token) = harness.patron(20).await;
    for method in [Method::GET, Method::POST, Method::DELETE, Method::PATCH] {
        let request = Request::builder()
            .method(method.clone())
            .uri("/api/user/drive")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, response) = harness.send(request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method}");
        assert_eq!(response, error("Method not allowed"));
    }
}

#[tokio::test]
async fn callers_must_be_authenticated() {
    let harness = Harness::new();

    let (status, response) = harness
        .put(None, body("flac", "zip", json!(true), "google"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response, error("Unauthorized"));

    let forged = SessionToken([5; 32]);
    let (status, _) = harness
        .put(Some(forged), body("flac", "zip", json!(true), "google"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/user/drive")
        .body(Body::from("this is not json"))
        .unwrap();
    let (status, _) = harness.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_cookie_is_accepted() {
    let harness = Harness::new();
    let (user_id, token) = harness.patron(3).await;
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/user/drive")
        .header(COOKIE, format!("session={token}"))
        .body(Body::from(
            body("opus", "zip", json!(true), "onedrive").to_string(),
        ))
        .unwrap();
    let (status, response) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({ "ok": true }));
    assert_eq!(harness.drive(user_id).await.0.format, Format::Opus);
}

#[tokio::test]
async fn sessions_of_missing_users_are_not_found() {
    let harness = Harness::new();
    let ghost = UserId([8; 32]);
    let token = harness
        .login
        .new_session(ghost, Duration::from_secs(3600))
        .await
        .unwrap();
    let (status, response) = harness
        .put(Some(token), body("flac", "zip", json!(true), "google"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response, error("User not found"));
}

#[tokio::test]
async fn non_patrons_are_rejected() {
    let harness = Harness::new();
    let (_, token) = harness.patron(0).await;
    let (status, response) = harness
        .put(Some(token), body("flac", "zip", json!(true), "google"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response, error("User is not a patron"));
}

#[tokio::test]
async fn field_rejections() {
    let harness = Harness::new();
    let (user_id, token) = harness.patron(5).await;

    let cases = [
        (body("mp3", "mix", json!("yes"), "dropbox"), "Invalid format"),
        (body("flac", "tar", json!(true), "google"), "Invalid container"),
        (body("flac", "zip", json!(true), "dropbox"), "Invalid service"),
        (body("aac", "aupzip", json!(true), "google"), "Invalid combination"),
        (body("opus", "mix", json!(true), "google"), "Invalid combination"),
        (
            body("flac", "mix", json!(true), "google"),
            "User is not a Better Supporter ($4 tier)",
        ),
        (body("flac", "zip", json!("yes"), "google"), "Invalid enabled state"),
    ];
    for (request, message) in cases {
        let (status, response) = harness.put(Some(token), request.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{request}");
        assert_eq!(response, error(message), "{request}");
    }

    assert_eq!(harness.drive(user_id).await, (DrivePreferences::default(), 0));
}

#[tokio::test]
async fn mixing_needs_better_supporter_or_unlimited() {
    let harness = Harness::new();
    for tier in [20, -1] {
        let (user_id, token) = harness.patron(tier).await;
        let (status, _) = harness
            .put(Some(token), body("flac", "mix", json!(true), "google"))
            .await;
        assert_eq!(status, StatusCode::OK, "tier {tier}");
        assert_eq!(harness.drive(user_id).await.0.container, Container::Mix);
    }
}

#[tokio::test]
async fn aupzip_with_flac_is_stored() {
    let harness = Harness::new();
    let (user_id, token) = harness.patron(1).await;
    let (status, _) = harness
        .put(Some(token), body("flac", "aupzip", json!(false), "google"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(harness.drive(user_id).await.0.container, Container::AupZip);
}

#[tokio::test]
async fn identical_preferences_are_not_written() {
    let harness = Harness::new();
    let (user_id, token) = harness.patron(10).await;

    let (status, response) = harness
        .put(Some(token), body("flac", "zip", json!(false), "google"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({ "ok": true }));
    assert_eq!(harness.drive(user_id).await, (DrivePreferences::default(), 0));
}

#[tokio::test]
async fn changed_preferences_are_written_once() {
    let harness = Harness::new();
    let (user_id, token) = harness.patron(25).await;

    let (status, response) = harness
        .put(Some(token), body("aac", "mix", json!(true), "onedrive"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({ "ok": true }));

    let expected = DrivePreferences {
        format: Format::Aac,
        container: Container::Mix,
        enabled: true,
        service: Service::OneDrive,
    };
    assert_eq!(harness.drive(user_id).await, (expected, 1));

    // Repeating the same request is a no-op.
    harness
        .put(Some(token), body("aac", "mix", json!(true), "onedrive"))
        .await;
    assert_eq!(harness.drive(user_id).await, (expected, 1));
}

#[tokio::test]
async fn tier_is_read_on_every_request() {
    let harness = Harness::new();
    let (user_id, token) = harness.patron(5).await;

    let (status, _) = harness
        .put(Some(token), body("vorbis", "mix", json!(true), "google"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    harness
        .login
        .set_reward_tier(user_id, RewardTier::BETTER_SUPPORTER)
        .await
        .unwrap();
    let (status, _) = harness
        .put(Some(token), body("vorbis", "mix", json!(true), "google"))
        .await;
    assert_eq!(status, StatusCode::OK);
}
