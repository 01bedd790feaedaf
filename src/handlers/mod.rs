//! HTTP surface: route wiring for the notification API, thin handlers
//! delegating to `AcceptanceService`.

pub mod health;
pub mod notifications;

use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health::health)));
    notifications::configure(cfg);
}
