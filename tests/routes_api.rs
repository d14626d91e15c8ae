#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

use authgate::config::AuthConfig;
use authgate::password;
use authgate::repo::inmem::InMemRepo;
use authgate::repo::ChallengeRepo;
use authgate::routes;
use authgate::service::AuthService;
use authgate::AppState;

fn test_config() -> AuthConfig {
    AuthConfig {
        enabled: true,
        allow_registration: true,
        jwt_secret: "test-secret-must-be-32-bytes-long!!".to_string(),
        token_ttl_secs: 3600,
        captcha_ttl_secs: 300,
        captcha_cooldown_secs: 5,
        captcha_cooldown_max_requests: 3,
        password_min_length: 8,
        password_require_alnum: true,
        lockout_max_failures: 5,
        lockout_lock_minutes: 10,
    }
}

fn setup_state() -> (AppState, Arc<InMemRepo>) {
    std::env::set_var("AUTHGATE_DATA_DIR", tempfile::tempdir().unwrap().path());
    let repo = Arc::new(InMemRepo::new());
    let config = test_config();
    let service = AuthService::new(repo.clone(), config.clone());
    let state = AppState { challenges: repo.clone(), service, config };
    (state, repo)
}

async fn insert_challenge(repo: &InMemRepo, code: &str) -> Uuid {
    let hash = password::hash(code).unwrap();
    repo.create_challenge(&hash, None, Utc::now() + Duration::seconds(300))
        .await
        .unwrap()
        .id
}

#[actix_web::test]
#[serial]
async fn health_and_config_endpoints() {
    let (state, _repo) = setup_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::config),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/health").to_request()).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["status"], "ok");

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/auth/config").to_request()).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["enabled"], true);
    assert_eq!(body["allow_registration"], true);
    assert_eq!(body["password_min_length"], 8);
}

#[actix_web::test]
#[serial]
async fn captcha_endpoint_issues_and_throttles() {
    let (state, _repo) = setup_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::config),
    )
    .await;

    for _ in 0..3 {
        let req = test::TestRequest::get()
            .uri("/api/v1/captcha/image")
            .insert_header(("X-Forwarded-For", "203.0.113.9"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert!(body["image"].as_str().unwrap().starts_with("data:image/svg+xml;base64,"));
        assert_eq!(body["expires_in"], 300);
        assert!(Uuid::parse_str(body["captcha_id"].as_str().unwrap()).is_ok());
    }

    // fourth request in the window from the same address
    let req = test::TestRequest::get()
        .uri("/api/v1/captcha/image")
        .insert_header(("X-Forwarded-For", "203.0.113.9"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429);

    // other addresses keep working
    let req = test::TestRequest::get()
        .uri("/api/v1/captcha/image")
        .insert_header(("X-Forwarded-For", "203.0.113.77"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
#[serial]
async fn register_login_me_flow() {
    let (state, repo) = setup_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::config),
    )
    .await;

    let captcha_id = insert_challenge(&repo, "AB34").await;
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(json!({
            "username": "alice",
            "password": "Passw0rd1",
            "captcha_id": captcha_id,
            "captcha_code": "ab34"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["is_admin"], false);
    assert!(body["token"].as_str().is_some());

    let captcha_id = insert_challenge(&repo, "CD56").await;
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({
            "username": "alice",
            "password": "Passw0rd1",
            "captcha_id": captcha_id,
            "captcha_code": "CD56"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["username"], "alice");

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", "Bearer notatoken"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get().uri("/api/v1/auth/me").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial]
async fn register_rejects_bad_or_spent_captcha() {
    let (state, repo) = setup_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::config),
    )
    .await;

    // wrong answer
    let captcha_id = insert_challenge(&repo, "AB34").await;
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(json!({
            "username": "bob",
            "password": "Passw0rd1",
            "captcha_id": captcha_id,
            "captcha_code": "ZZZZ"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // the wrong answer consumed it; the right answer no longer helps
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(json!({
            "username": "bob",
            "password": "Passw0rd1",
            "captcha_id": captcha_id,
            "captcha_code": "AB34"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // unknown challenge id
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(json!({
            "username": "bob",
            "password": "Passw0rd1",
            "captcha_id": Uuid::new_v4(),
            "captcha_code": "AB34"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
#[serial]
async fn login_failures_escalate_to_lock() {
    let (state, repo) = setup_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::config),
    )
    .await;

    let captcha_id = insert_challenge(&repo, "AB34").await;
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(json!({
            "username": "carol",
            "password": "Passw0rd1",
            "captcha_id": captcha_id,
            "captcha_code": "AB34"
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    for _ in 0..5 {
        let captcha_id = insert_challenge(&repo, "AB34").await;
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({
                "username": "carol",
                "password": "wrong-pass1",
                "captcha_id": captcha_id,
                "captcha_code": "AB34"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }

    // locked now: correct password answers 423 with the remaining window
    let captcha_id = insert_challenge(&repo, "AB34").await;
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({
            "username": "carol",
            "password": "Passw0rd1",
            "captcha_id": captcha_id,
            "captcha_code": "AB34"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 423);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(body["retry_after_secs"].as_u64().unwrap() > 0);
}

#[actix_web::test]
#[serial]
async fn change_password_revokes_old_session() {
    let (state, repo) = setup_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::config),
    )
    .await;

    let captcha_id = insert_challenge(&repo, "AB34").await;
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(json!({
            "username": "erin",
            "password": "Passw0rd1",
            "captcha_id": captcha_id,
            "captcha_code": "AB34"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let old_token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/change-password")
        .insert_header(("Authorization", format!("Bearer {old_token}")))
        .set_json(json!({
            "old_password": "Passw0rd1",
            "new_password": "N3wpassword"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let new_token = body["token"].as_str().unwrap().to_string();

    // pre-change token is revoked, post-change token works
    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", format!("Bearer {old_token}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", format!("Bearer {new_token}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
async fn disabled_mode_answers_config_and_rejects_the_rest() {
    let app = test::init_service(App::new().configure(routes::config_disabled)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/auth/config").to_request()).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["enabled"], false);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({"username": "x", "password": "y"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 503);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/captcha/image").to_request()).await;
    assert_eq!(resp.status(), 503);
}
