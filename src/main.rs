//! API process bootstrap (C5's HTTP surface, spec §6).
//!
//! Mirrors the teacher's `main.rs` role: load `.env`/environment config,
//! open the store connection, assemble the process-wide collaborators
//! (repository, cache, service) behind `web::Data`, wire CORS and tracing
//! middleware, and start `HttpServer`. Process bootstrap, config loading,
//! and index-creation ceremony are exactly the "external collaborator"
//! concerns spec §1 scopes out of the core, but the binary still needs
//! them to run, so they live here rather than in the core modules.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{error::InternalError, http::header, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use tracing_actix_web::TracingLogger;

use notifyhub::cache;
use notifyhub::config::Settings;
use notifyhub::db::Db;
use notifyhub::repository::mongo::MongoNotificationRepository;
use notifyhub::repository::NotificationRepository;
use notifyhub::services::acceptance::AcceptanceService;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env();
    let app_port = settings.app_port;
    let cors_origins = settings.cors_origins.clone();
    let cache_ttl = std::time::Duration::from_secs(settings.cache_ttl_seconds);

    let db = Db::connect(&settings)
        .await
        .context("failed to connect to MongoDB")?;

    let repo: Arc<dyn NotificationRepository> = Arc::new(MongoNotificationRepository::new(&db));
    repo.ensure_indexes().await.context("failed to create indexes")?;

    let cache = cache::build(&settings);
    let acceptance = web::Data::new(AcceptanceService::new(repo, cache, cache_ttl));
    let settings_data = web::Data::new(settings);

    tracing::info!(port = app_port, "starting notifyhub API");

    HttpServer::new(move || {
        let cors = build_cors(&cors_origins);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(cors)
            .app_data(settings_data.clone())
            .app_data(acceptance.clone())
            .app_data(
                web::JsonConfig::default().error_handler(|err, _req| {
                    let message = err.to_string();
                    InternalError::from_response(
                        err,
                        HttpResponse::UnprocessableEntity().json(serde_json::json!({ "error": message })),
                    )
                    .into()
                }),
            )
            .configure(notifyhub::handlers::configure)
    })
    .bind(("0.0.0.0", app_port))?
    .run()
    .await?;

    Ok(())
}

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        return Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();
    }

    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("x-provider-token"),
        ]);
    for origin in origins {
        cors = cors.allowed_origin(origin);
    }
    cors
}
