//! Provider callback authentication (`X-Provider-Token`).
//!
//! Only guards the receipt endpoint, and only when `PROVIDER_CALLBACK_TOKEN`
//! is configured — an unconfigured token means the endpoint is open. Header
//! lookup followed by a constant-time compare against the configured
//! shared secret.

use actix_web::{body::MessageBody, dev::ServiceRequest, dev::ServiceResponse, middleware::Next, web, Error};

use crate::config::Settings;

fn extract_provider_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get("X-Provider-Token")
        .and_then(|h| h.to_str().ok())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub async fn require_provider_token(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let settings = req
        .app_data::<web::Data<Settings>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("settings not found"))?;

    match &settings.provider_callback_token {
        None => next.call(req).await,
        Some(expected) => {
            let provided = extract_provider_token(&req);
            match provided {
                Some(token) if constant_time_eq::constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
                    next.call(req).await
                }
                _ => Err(actix_web::error::ErrorUnauthorized(
                    "missing or invalid X-Provider-Token",
                )),
            }
        }
    }
}
