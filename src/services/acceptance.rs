//! Acceptance service (C5): idempotent creation, status reads, read marks,
//! and receipt reconciliation.
//!
//! Thin async methods over `Arc<dyn NotificationRepository>` + `Arc<dyn
//! Cache>`, returning `AppError` so the HTTP layer can discriminate status
//! codes (NotFound, Conflict, Validation, ...).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bson::Document;
use chrono::Utc;

use crate::cache::Cache;
use crate::error::AppError;
use crate::models::{Channel, ChannelState, ChannelStatus, EventKind, Notification, NotificationEvent, Priority};
use crate::repository::NotificationRepository;

#[derive(Debug, Clone)]
pub struct CreateNotificationRequest {
    pub idempotency_key: String,
    pub user_id: String,
    pub template_id: String,
    pub template_params: serde_json::Value,
    pub channels: Vec<Channel>,
    pub priority: Priority,
}

#[derive(Debug, Clone)]
pub struct NotificationStatus {
    pub notification: Notification,
    pub overall_status: crate::models::OverallStatus,
}

pub struct AcceptanceService {
    repo: Arc<dyn NotificationRepository>,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
}

impl AcceptanceService {
    pub fn new(repo: Arc<dyn NotificationRepository>, cache: Arc<dyn Cache>, cache_ttl: Duration) -> Self {
        Self { repo, cache, cache_ttl }
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool, AppError> {
        let cache_key = format!("user:{user_id}");
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached.as_slice() == b"1");
        }
        let found = self.repo.find_user(user_id).await.map_err(AppError::from)?.is_some();
        self.cache
            .set(&cache_key, if found { b"1".to_vec() } else { b"0".to_vec() }, self.cache_ttl)
            .await;
        Ok(found)
    }

    async fn template_exists(&self, template_id: &str) -> Result<bool, AppError> {
        let cache_key = format!("template:{template_id}");
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached.as_slice() == b"1");
        }
        let found = self
            .repo
            .find_template(template_id)
            .await
            .map_err(AppError::from)?
            .is_some();
        self.cache
            .set(&cache_key, if found { b"1".to_vec() } else { b"0".to_vec() }, self.cache_ttl)
            .await;
        Ok(found)
    }

    pub async fn create_notification(&self, req: CreateNotificationRequest) -> Result<String, AppError> {
        if req.channels.is_empty() {
            return Err(AppError::Validation("channels must be non-empty".to_string()));
        }
        let unique: HashSet<Channel> = req.channels.iter().copied().collect();
        if unique.len() != req.channels.len() {
            return Err(AppError::Validation("channels must not contain duplicates".to_string()));
        }

        if !self.user_exists(&req.user_id).await? {
            return Err(AppError::NotFound(format!("user {} not found", req.user_id)));
        }
        if !self.template_exists(&req.template_id).await? {
            return Err(AppError::NotFound(format!("template {} not found", req.template_id)));
        }

        let now = Utc::now();
        let template_params: Document = bson::to_document(&req.template_params)
            .map_err(|e| AppError::Validation(format!("invalid template_params: {e}")))?;

        let doc = Notification {
            id: None,
            idempotency_key: req.idempotency_key.clone(),
            user_id: req.user_id.clone(),
            template_id: req.template_id.clone(),
            template_params,
            priority: req.priority,
            channels: req
                .channels
                .iter()
                .copied()
                .map(|c| ChannelState::new_queued(c, now))
                .collect(),
            events: vec![NotificationEvent::new(EventKind::Accepted, None, None)],
            created_at: now,
            updated_at: now,
        };

        match self.repo.insert(doc).await {
            Ok(id) => Ok(id),
            Err(crate::error::RepositoryError::DuplicateKey) => {
                let prior = self
                    .repo
                    .find_by_user_and_idempotency(&req.user_id, &req.idempotency_key)
                    .await
                    .map_err(AppError::from)?;
                match prior {
                    Some(n) => {
                        let id = n.id.expect("persisted notification has an id").to_hex();
                        self.repo
                            .append_event(&id, NotificationEvent::new(EventKind::IdempotencyHit, None, None))
                            .await
                            .map_err(AppError::from)?;
                        Ok(id)
                    }
                    None => Err(AppError::Conflict(
                        "idempotency collision but prior notification could not be located".to_string(),
                    )),
                }
            }
            Err(e) => Err(AppError::from(e)),
        }
    }

    pub async fn get_notification_status(&self, id: &str) -> Result<NotificationStatus, AppError> {
        let notification = self
            .repo
            .find_by_id(id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;
        let overall_status = notification.overall_status();
        Ok(NotificationStatus { notification, overall_status })
    }

    pub async fn mark_read(&self, id: &str, channel: Option<Channel>) -> Result<NotificationStatus, AppError> {
        let now = Utc::now();
        self.repo.set_channel_read(id, channel, now).await.map_err(AppError::from)?;
        self.repo
            .append_event(id, NotificationEvent::new(EventKind::ReadMarked, channel, None))
            .await
            .map_err(AppError::from)?;
        self.get_notification_status(id).await
    }

    pub async fn apply_receipt(
        &self,
        id: &str,
        channel: Channel,
        new_status: ChannelStatus,
    ) -> Result<NotificationStatus, AppError> {
        if !matches!(new_status, ChannelStatus::Delivered | ChannelStatus::Read) {
            return Err(AppError::Validation(
                "receipt event must be DELIVERED or READ".to_string(),
            ));
        }
        let now = Utc::now();
        self.repo
            .apply_receipt(id, channel, new_status, now)
            .await
            .map_err(AppError::from)?;
        self.repo
            .append_event(
                id,
                NotificationEvent::new(EventKind::ProviderReceipt, Some(channel), None),
            )
            .await
            .map_err(AppError::from)?;
        self.get_notification_status(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoopCache;
    use crate::models::{Template, User};
    use crate::repository::memory::InMemoryRepository;

    fn service() -> (AcceptanceService, Arc<InMemoryRepository>) {
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
        let cache: Arc<dyn Cache> = Arc::new(NoopCache);
        (AcceptanceService::new(repo.clone(), cache, Duration::from_secs(300)), repo)
    }

    fn request() -> CreateNotificationRequest {
        CreateNotificationRequest {
            idempotency_key: "key-1".into(),
            user_id: "user_001".into(),
            template_id: "tpl_001".into(),
            template_params: serde_json::json!({ "name": "Ada" }),
            channels: vec![Channel::Email],
            priority: Priority::Normal,
        }
    }

    #[tokio::test]
    async fn rejects_empty_channels() {
        let (svc, _repo) = service();
        let mut req = request();
        req.channels = vec![];
        let err = svc.create_notification(req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_duplicate_channels() {
        let (svc, _repo) = service();
        let mut req = request();
        req.channels = vec![Channel::Email, Channel::Email];
        let err = svc.create_notification(req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_user() {
        let (svc, _repo) = service();
        let mut req = request();
        req.user_id = "ghost".into();
        let err = svc.create_notification(req).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn idempotent_create_returns_same_id_and_keeps_first_channels() {
        let (svc, _repo) = service();
        let first_id = svc.create_notification(request()).await.unwrap();

        let mut second = request();
        second.channels = vec![Channel::Email, Channel::Sms];
        let second_id = svc.create_notification(second).await.unwrap();

        assert_eq!(first_id, second_id);
        let status = svc.get_notification_status(&first_id).await.unwrap();
        assert_eq!(status.notification.channels.len(), 1);
    }

    #[tokio::test]
    async fn mark_read_then_receipt_delivered_is_noop() {
        let (svc, _repo) = service();
        let id = svc.create_notification(request()).await.unwrap();

        svc.mark_read(&id, Some(Channel::Email)).await.unwrap();
        let status = svc
            .apply_receipt(&id, Channel::Email, ChannelStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(status.notification.channels[0].status, ChannelStatus::Read);
    }
}
