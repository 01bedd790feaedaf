//! HTTP-surface integration tests (spec §6), exercised with
//! `actix_web::test` against the in-memory fake store — mirrors the
//! teacher's `test_helpers.rs` isolation philosophy (one fresh store per
//! test) adapted from a rolled-back SQL transaction to a fresh
//! `InMemoryRepository`.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{error::InternalError, test, web, App, HttpResponse};
use serde_json::json;

use notifyhub::cache::{Cache, NoopCache};
use notifyhub::config::{CacheBackend, ProviderRoute, Settings};
use notifyhub::models::{Template, User};
use notifyhub::repository::memory::InMemoryRepository;
use notifyhub::repository::NotificationRepository;
use notifyhub::services::acceptance::AcceptanceService;

fn test_settings(provider_callback_token: Option<String>) -> Settings {
    Settings {
        app_port: 0,
        cors_origins: vec![],
        mongodb_uri: "mongodb://localhost:27017".into(),
        mongodb_db: "test".into(),
        email_provider: ProviderRoute { base_url: String::new(), api_key: String::new() },
        sms_provider: ProviderRoute { base_url: String::new(), api_key: String::new() },
        push_provider: ProviderRoute { base_url: String::new(), api_key: String::new() },
        provider_timeout: Duration::from_secs(5),
        provider_retryable_status_codes: vec![408, 429, 500, 502, 503, 504],
        cache_backend: CacheBackend::None,
        cache_ttl_seconds: 300,
        memcache_host: "localhost".into(),
        memcache_port: 11211,
        memcache_timeout: Duration::from_millis(200),
        provider_callback_token,
    }
}

fn seeded_repo() -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::new());
    repo.seed_user(User {
        id: None,
        user_id: "user_001".into(),
        email: "user001@example.com".into(),
        phone_number: None,
        name: "User One".into(),
    });
    repo.seed_template(Template {
        id: None,
        template_id: "tpl_001".into(),
        name: "welcome".into(),
        subject: "hi".into(),
        body: "hello {{name}}".into(),
    });
    repo
}

macro_rules! build_app {
    ($repo:expr, $settings:expr) => {{
        let repo: Arc<dyn NotificationRepository> = $repo;
        let cache: Arc<dyn Cache> = Arc::new(NoopCache);
        let settings: Settings = $settings;
        let cache_ttl = Duration::from_secs(settings.cache_ttl_seconds);
        let acceptance = web::Data::new(AcceptanceService::new(repo, cache, cache_ttl));
        let settings_data = web::Data::new(settings);
        App::new()
            .app_data(settings_data)
            .app_data(acceptance)
            .app_data(
                web::JsonConfig::default().error_handler(|err, _req| {
                    let message = err.to_string();
                    InternalError::from_response(
                        err,
                        HttpResponse::UnprocessableEntity().json(json!({ "error": message })),
                    )
                    .into()
                }),
            )
            .configure(notifyhub::handlers::configure)
    }};
}

#[actix_web::test]
async fn health_reports_ok() {
    let app = test::init_service(build_app!(seeded_repo(), test_settings(None))).await;
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn create_notification_accepts_known_user_and_template() {
    let app = test::init_service(build_app!(seeded_repo(), test_settings(None))).await;
    let req = test::TestRequest::post()
        .uri("/api/notifications")
        .set_json(json!({
            "idempotency_key": "11111111-1111-1111-1111-111111111111",
            "user_id": "user_001",
            "template_id": "tpl_001",
            "template_params": { "name": "Ada" },
            "channels": ["EMAIL"],
            "priority": "NORMAL",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["notification_id"].is_string());
}

#[actix_web::test]
async fn create_notification_rejects_unknown_user_with_404() {
    let app = test::init_service(build_app!(seeded_repo(), test_settings(None))).await;
    let req = test::TestRequest::post()
        .uri("/api/notifications")
        .set_json(json!({
            "idempotency_key": "22222222-2222-2222-2222-222222222222",
            "user_id": "ghost",
            "template_id": "tpl_001",
            "template_params": {},
            "channels": ["EMAIL"],
            "priority": "NORMAL",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn create_notification_rejects_malformed_body_with_422() {
    let app = test::init_service(build_app!(seeded_repo(), test_settings(None))).await;
    let req = test::TestRequest::post()
        .uri("/api/notifications")
        .set_json(json!({
            "idempotency_key": "33333333-3333-3333-3333-333333333333",
            "user_id": "user_001",
            "template_id": "tpl_001",
            "template_params": {},
            "channels": ["CARRIER_PIGEON"],
            "priority": "NORMAL",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
}

#[actix_web::test]
async fn get_status_for_unknown_id_is_404() {
    let app = test::init_service(build_app!(seeded_repo(), test_settings(None))).await;
    let req = test::TestRequest::get()
        .uri("/api/notifications/000000000000000000000000")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn full_round_trip_create_then_read_then_mark_read() {
    let repo = seeded_repo();
    let app = test::init_service(build_app!(repo.clone(), test_settings(None))).await;

    let create_req = test::TestRequest::post()
        .uri("/api/notifications")
        .set_json(json!({
            "idempotency_key": "44444444-4444-4444-4444-444444444444",
            "user_id": "user_001",
            "template_id": "tpl_001",
            "template_params": {},
            "channels": ["EMAIL", "SMS"],
            "priority": "HIGH",
        }))
        .to_request();
    let create_resp = test::call_service(&app, create_req).await;
    assert_eq!(create_resp.status(), 201);
    let created: serde_json::Value = test::read_body_json(create_resp).await;
    let id = created["notification_id"].as_str().unwrap().to_string();

    let status_req = test::TestRequest::get().uri(&format!("/api/notifications/{id}")).to_request();
    let status_resp = test::call_service(&app, status_req).await;
    assert_eq!(status_resp.status(), 200);
    let status: serde_json::Value = test::read_body_json(status_resp).await;
    assert_eq!(status["overall_status"], "QUEUED");
    assert_eq!(status["channels"].as_array().unwrap().len(), 2);

    let read_req = test::TestRequest::post()
        .uri(&format!("/api/notifications/{id}/read"))
        .set_json(json!({ "channel": "EMAIL" }))
        .to_request();
    let read_resp = test::call_service(&app, read_req).await;
    assert_eq!(read_resp.status(), 200);
    let after_read: serde_json::Value = test::read_body_json(read_resp).await;
    let email_channel = after_read["channels"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["channel"] == "EMAIL")
        .unwrap();
    assert_eq!(email_channel["status"], "READ");
}

#[actix_web::test]
async fn receipt_without_token_header_is_unauthorized_when_configured() {
    let repo = seeded_repo();
    let app = test::init_service(build_app!(repo.clone(), test_settings(Some("secret-token".into())))).await;

    let create_req = test::TestRequest::post()
        .uri("/api/notifications")
        .set_json(json!({
            "idempotency_key": "55555555-5555-5555-5555-555555555555",
            "user_id": "user_001",
            "template_id": "tpl_001",
            "template_params": {},
            "channels": ["EMAIL"],
            "priority": "LOW",
        }))
        .to_request();
    let create_resp = test::call_service(&app, create_req).await;
    let created: serde_json::Value = test::read_body_json(create_resp).await;
    let id = created["notification_id"].as_str().unwrap().to_string();

    let receipt_req = test::TestRequest::post()
        .uri(&format!("/api/notifications/{id}/receipt"))
        .set_json(json!({ "channel": "EMAIL", "event": "DELIVERED" }))
        .to_request();
    let receipt_resp = test::call_service(&app, receipt_req).await;
    assert_eq!(receipt_resp.status(), 401);
}

#[actix_web::test]
async fn receipt_with_matching_token_header_succeeds() {
    let repo = seeded_repo();
    let app = test::init_service(build_app!(repo.clone(), test_settings(Some("secret-token".into())))).await;

    let create_req = test::TestRequest::post()
        .uri("/api/notifications")
        .set_json(json!({
            "idempotency_key": "66666666-6666-6666-6666-666666666666",
            "user_id": "user_001",
            "template_id": "tpl_001",
            "template_params": {},
            "channels": ["EMAIL"],
            "priority": "LOW",
        }))
        .to_request();
    let create_resp = test::call_service(&app, create_req).await;
    let created: serde_json::Value = test::read_body_json(create_resp).await;
    let id = created["notification_id"].as_str().unwrap().to_string();

    let receipt_req = test::TestRequest::post()
        .uri(&format!("/api/notifications/{id}/receipt"))
        .insert_header(("X-Provider-Token", "secret-token"))
        .set_json(json!({ "channel": "EMAIL", "event": "DELIVERED" }))
        .to_request();
    let receipt_resp = test::call_service(&app, receipt_req).await;
    assert_eq!(receipt_resp.status(), 200);
}
