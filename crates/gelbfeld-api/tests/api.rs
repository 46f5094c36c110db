use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use gelbfeld_api::pictures::PictureStore;
use gelbfeld_api::token::JwtTokenService;
use gelbfeld_api::{AppState, AppStateInner, router};
use gelbfeld_db::Database;

struct TestApp {
    app: Router,
    _dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("gelbfeld.db")).unwrap();
        let pictures = PictureStore::new(dir.path().join("pictures")).await.unwrap();
        let state: AppState = Arc::new(AppStateInner {
            db,
            tokens: Box::new(JwtTokenService::new("test-secret", chrono::Duration::days(1))),
            pictures,
        });
        Self {
            app: router(state),
            _dir: dir,
        }
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn send_raw(&self, method: &str, uri: &str, token: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn register(&self, username: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{username}@x.com"),
                    "password": "correct horse"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn friendship_and_round_scenario() {
    let t = TestApp::new().await;
    let ana = t.register("ana").await;
    let bo = t.register("bo").await;

    let (status, rel) = t
        .send("POST", "/friends/requests", Some(&ana), Some(json!({ "target": "bo" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rel["status"], "pending");

    let (_, st) = t.send("GET", "/friends/status/bo", Some(&ana), None).await;
    assert_eq!(st["status"], "pending");

    let (_, incoming) = t.send("GET", "/friends/requests/incoming", Some(&bo), None).await;
    assert_eq!(incoming[0]["username"], "ana");
    let rel_id = incoming[0]["relationship_id"].as_str().unwrap().to_string();

    let (status, _) = t
        .send(
            "POST",
            &format!("/friends/requests/{rel_id}/respond"),
            Some(&bo),
            Some(json!({ "accept": true })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, st) = t.send("GET", "/friends/status/ana", Some(&bo), None).await;
    assert_eq!(st["status"], "accepted");
    let (_, friends) = t.send("GET", "/friends", Some(&ana), None).await;
    assert_eq!(friends[0]["username"], "bo");

    let (status, round) = t
        .send(
            "POST",
            "/rounds",
            Some(&ana),
            Some(json!({
                "name": "Game1",
                "players": [
                    { "type": "user", "identifier": "bo" },
                    { "type": "guest", "name": "Max" }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{round}");
    let round_id = round["id"].as_str().unwrap().to_string();
    assert_eq!(round["players"][1]["username"], "bo");
    let bo_player = round["players"][1]["id"].as_str().unwrap().to_string();

    for expected in 1..=3 {
        let (status, body) = t
            .send(
                "POST",
                &format!("/rounds/{round_id}/players/{bo_player}/points"),
                Some(&bo),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["points"], expected);
    }

    let (status, scores) = t.send("GET", &format!("/rounds/{round_id}/scores"), Some(&ana), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scores["round_name"], "Game1");
    assert_eq!(scores["field_count"], 3);
    assert_eq!(scores["player_count"], 3);
    assert_eq!(scores["scores"][1]["name"], "bo");
    assert_eq!(scores["scores"][1]["points"], 3);
    assert_eq!(scores["scores"][2]["name"], "Max");
    assert_eq!(scores["scores"][2]["points"], 0);
    assert_eq!(scores["scores"][2]["is_guest"], true);

    let (_, check) = t
        .send("GET", &format!("/rounds/{round_id}/consistency"), Some(&ana), None)
        .await;
    assert_eq!(check["consistent"], true);

    let (status, err) = t.send("DELETE", &format!("/rounds/{round_id}"), Some(&bo), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["error_code"], "not_authorized");

    let (status, _) = t.send("DELETE", &format!("/rounds/{round_id}"), Some(&ana), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, err) = t.send("GET", &format!("/rounds/{round_id}/scores"), Some(&ana), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error_code"], "round_not_found");
}

#[tokio::test]
async fn protected_routes_require_valid_token() {
    let t = TestApp::new().await;

    let (status, err) = t.send("GET", "/friends", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error_code"], "unauthenticated");

    let (status, _) = t.send("GET", "/friends", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = t.register("ana").await;
    let (status, me) = t.send("GET", "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "ana");
}

#[tokio::test]
async fn login_errors_are_generic() {
    let t = TestApp::new().await;
    t.register("ana").await;

    let (status, body) = t
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username_or_email": "ANA@x.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ana");

    let (wrong_status, wrong) = t
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username_or_email": "ana", "password": "nope nope" })),
        )
        .await;
    let (missing_status, missing) = t
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username_or_email": "ghost", "password": "correct horse" })),
        )
        .await;
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, missing);
    assert_eq!(wrong["error_code"], "invalid_credentials");
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let t = TestApp::new().await;
    t.register("ana").await;

    let (status, err) = t
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "ANA", "email": "new@x.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error_code"], "username_taken");

    let (status, err) = t
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "other", "email": "ana@x.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error_code"], "email_taken");
}

#[tokio::test]
async fn reverse_request_conflicts_and_rejection_is_replaceable() {
    let t = TestApp::new().await;
    let ana = t.register("ana").await;
    let bo = t.register("bo").await;

    t.send("POST", "/friends/requests", Some(&ana), Some(json!({ "target": "bo" })))
        .await;
    let (status, err) = t
        .send("POST", "/friends/requests", Some(&bo), Some(json!({ "target": "ana" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error_code"], "already_active");

    let (_, incoming) = t.send("GET", "/friends/requests/incoming", Some(&bo), None).await;
    let rel_id = incoming[0]["relationship_id"].as_str().unwrap().to_string();
    t.send(
        "POST",
        &format!("/friends/requests/{rel_id}/respond"),
        Some(&bo),
        Some(json!({ "accept": false })),
    )
    .await;

    let (_, st) = t.send("GET", "/friends/status/bo", Some(&ana), None).await;
    assert_eq!(st["status"], "rejected");

    let (status, _) = t
        .send("POST", "/friends/requests", Some(&bo), Some(json!({ "target": "ana" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, err) = t
        .send("POST", "/friends/requests", Some(&ana), Some(json!({ "target": "ana" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error_code"], "self_request");
}

#[tokio::test]
async fn search_annotates_relationship_status() {
    let t = TestApp::new().await;
    let ana = t.register("ana").await;
    t.register("bob").await;
    t.register("bonnie").await;

    t.send("POST", "/friends/requests", Some(&ana), Some(json!({ "target": "bob" })))
        .await;

    let (status, results) = t.send("GET", "/search?q=BO", Some(&ana), None).await;
    assert_eq!(status, StatusCode::OK);
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["username"], "bob");
    assert_eq!(results[0]["status"], "pending");
    assert_eq!(results[1]["username"], "bonnie");
    assert_eq!(results[1]["status"], "none");
}

#[tokio::test]
async fn profile_bio_and_picture() {
    let t = TestApp::new().await;
    let ana = t.register("ana").await;
    let bo = t.register("bo").await;

    let (status, _) = t
        .send("PUT", "/profile/bio", Some(&ana), Some(json!({ "bio": "Gelbfeld champion" })))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, bio) = t.send("GET", "/profile/bio", Some(&ana), None).await;
    assert_eq!(bio["bio"], "Gelbfeld champion");

    let (status, _) = t.send("GET", "/users/ana/picture", Some(&bo), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let upload = Request::builder()
        .method("PUT")
        .uri("/profile/picture")
        .header(header::AUTHORIZATION, format!("Bearer {ana}"))
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(vec![0x89, b'P', b'N', b'G']))
        .unwrap();
    let response = t.app.clone().oneshot(upload).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let download = Request::builder()
        .uri("/users/ana/picture")
        .header(header::AUTHORIZATION, format!("Bearer {bo}"))
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(download).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], &[0x89, b'P', b'N', b'G']);

    let (_, profile) = t.send("GET", "/users/ana/profile", Some(&bo), None).await;
    assert_eq!(profile["bio"], "Gelbfeld champion");
    assert_eq!(profile["has_picture"], true);

    let bad = Request::builder()
        .method("PUT")
        .uri("/profile/picture")
        .header(header::AUTHORIZATION, format!("Bearer {ana}"))
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let response = t.app.clone().oneshot(bad).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_requests_get_error_codes() {
    let t = TestApp::new().await;
    let ana = t.register("ana").await;

    let (status, err) = t.send("DELETE", "/friends/requests/not-a-uuid", Some(&ana), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error_code"], "invalid_input");
    assert!(!err["error"].as_str().unwrap().contains("UUID"));

    let (status, err) = t.send_raw("POST", "/friends/requests", &ana, "{oops").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error_code"], "invalid_input");

    let (status, err) = t
        .send_raw(
            "POST",
            "/rounds",
            &ana,
            r#"{"name":"Game1","players":[{"type":"robot","name":"R2"}]}"#,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error_code"], "invalid_input");
    assert!(!err["error"].as_str().unwrap().contains("robot"));
}

#[tokio::test]
async fn usernames_differing_only_in_non_ascii_case_cannot_both_register() {
    let t = TestApp::new().await;

    let (status, err) = t
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "Ärger", "email": "a1@x.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error_code"], "invalid_input");

    let (status, _) = t
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "ärger", "email": "a2@x.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
