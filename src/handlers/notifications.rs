//! Notification API handlers.
//!
//! Thin `actix-web` handlers: parse the request, call one
//! `AcceptanceService` method, map the result to a response.
//! `Result<HttpResponse, AppError>` + `?` throughout since `AppError`
//! already centralizes the status-code mapping.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::provider_token::require_provider_token;
use crate::models::{Channel, ChannelState, ChannelStatus, EventKind, NotificationEvent, OverallStatus, Priority};
use crate::services::acceptance::{AcceptanceService, CreateNotificationRequest, NotificationStatus};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/notifications").route(web::post().to(create_notification)));
    cfg.service(web::resource("/api/notifications/{id}").route(web::get().to(get_notification_status)));
    cfg.service(web::resource("/api/notifications/{id}/read").route(web::post().to(mark_read)));
    cfg.service(
        web::resource("/api/notifications/{id}/receipt")
            .wrap(actix_web::middleware::from_fn(require_provider_token))
            .route(web::post().to(apply_receipt)),
    );
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationBody {
    pub idempotency_key: String,
    pub user_id: String,
    pub template_id: String,
    pub template_params: serde_json::Value,
    pub channels: Vec<Channel>,
    pub priority: Priority,
}

#[derive(Debug, Serialize)]
pub struct CreateNotificationResponse {
    pub notification_id: String,
}

pub async fn create_notification(
    svc: web::Data<AcceptanceService>,
    body: web::Json<CreateNotificationBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let id = svc
        .create_notification(CreateNotificationRequest {
            idempotency_key: body.idempotency_key,
            user_id: body.user_id,
            template_id: body.template_id,
            template_params: body.template_params,
            channels: body.channels,
            priority: body.priority,
        })
        .await?;
    Ok(HttpResponse::Created().json(CreateNotificationResponse { notification_id: id }))
}

#[derive(Debug, Serialize)]
pub struct ChannelStateResponse {
    pub channel: Channel,
    pub status: ChannelStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ChannelState> for ChannelStateResponse {
    fn from(c: &ChannelState) -> Self {
        Self {
            channel: c.channel,
            status: c.status,
            attempt_count: c.attempt_count,
            last_error: c.last_error.clone(),
            next_attempt_at: c.next_attempt_at,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationEventResponse {
    pub kind: EventKind,
    pub channel: Option<Channel>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl From<&NotificationEvent> for NotificationEventResponse {
    fn from(e: &NotificationEvent) -> Self {
        Self {
            kind: e.kind,
            channel: e.channel,
            detail: e.detail.clone(),
            at: e.at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationStatusResponse {
    pub notification_id: String,
    pub idempotency_key: String,
    pub user_id: String,
    pub template_id: String,
    pub template_params: serde_json::Value,
    pub priority: Priority,
    pub overall_status: OverallStatus,
    pub channels: Vec<ChannelStateResponse>,
    pub events: Vec<NotificationEventResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn to_response(status: NotificationStatus) -> Result<NotificationStatusResponse, AppError> {
    let n = status.notification;
    let template_params = bson::from_document(n.template_params.clone())
        .map_err(|e| AppError::internal(format!("corrupt template_params: {e}")))?;
    Ok(NotificationStatusResponse {
        notification_id: n.id.expect("persisted notification has an id").to_hex(),
        idempotency_key: n.idempotency_key,
        user_id: n.user_id,
        template_id: n.template_id,
        template_params,
        priority: n.priority,
        overall_status: status.overall_status,
        channels: n.channels.iter().map(ChannelStateResponse::from).collect(),
        events: n.events.iter().map(NotificationEventResponse::from).collect(),
        created_at: n.created_at,
        updated_at: n.updated_at,
    })
}

pub async fn get_notification_status(
    svc: web::Data<AcceptanceService>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let status = svc.get_notification_status(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(to_response(status)?))
}

#[derive(Debug, Deserialize, Default)]
pub struct MarkReadBody {
    pub channel: Option<Channel>,
}

pub async fn mark_read(
    svc: web::Data<AcceptanceService>,
    path: web::Path<String>,
    body: Option<web::Json<MarkReadBody>>,
) -> Result<HttpResponse, AppError> {
    let channel = body.and_then(|b| b.into_inner().channel);
    let status = svc.mark_read(&path.into_inner(), channel).await?;
    Ok(HttpResponse::Ok().json(to_response(status)?))
}

#[derive(Debug, Deserialize)]
pub struct ReceiptBody {
    pub channel: Channel,
    pub event: ChannelStatus,
    #[serde(default)]
    pub provider_message_id: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

pub async fn apply_receipt(
    svc: web::Data<AcceptanceService>,
    path: web::Path<String>,
    body: web::Json<ReceiptBody>,
) -> Result<HttpResponse, AppError> {
    // `provider_message_id` / `occurred_at` are accepted per the provider
    // wire contract (spec §6) but the core has no field to record them
    // against; reconciliation only acts on `channel` + `event`.
    let body = body.into_inner();
    let status = svc.apply_receipt(&path.into_inner(), body.channel, body.event).await?;
    Ok(HttpResponse::Ok().json(to_response(status)?))
}
