//! In-memory fake store used by unit and handler tests.
//!
//! Stands in for MongoDB so the acceptance service, delivery worker, and
//! handlers can be exercised without a live database; each test gets
//! isolation by constructing its own fresh `InMemoryRepository`.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{
    Channel, ChannelStatus, DeliveryAttempt, Notification, NotificationEvent, Priority, Template, User,
};

use super::{ClaimedJob, NotificationRepository, Patch};

#[derive(Default)]
pub struct InMemoryRepository {
    notifications: Mutex<Vec<Notification>>,
    attempts: Mutex<Vec<DeliveryAttempt>>,
    users: Mutex<Vec<User>>,
    templates: Mutex<Vec<Template>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-only seeding hook; the real store treats users/templates as
    /// externally-owned read models.
    pub fn seed_user(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }

    pub fn seed_template(&self, template: Template) {
        self.templates.lock().unwrap().push(template);
    }
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl NotificationRepository for InMemoryRepository {
    async fn ensure_indexes(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn insert(&self, mut doc: Notification) -> Result<String, RepositoryError> {
        let mut notifications = self.notifications.lock().unwrap();
        if notifications
            .iter()
            .any(|n| n.user_id == doc.user_id && n.idempotency_key == doc.idempotency_key)
        {
            return Err(RepositoryError::DuplicateKey);
        }
        let id = fresh_id();
        doc.id = Some(bson::oid::ObjectId::parse_str(&pad_oid(&id)).unwrap());
        notifications.push(doc);
        Ok(notifications.last().unwrap().id.unwrap().to_hex())
    }

    async fn find_by_user_and_idempotency(
        &self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Notification>, RepositoryError> {
        let notifications = self.notifications.lock().unwrap();
        Ok(notifications
            .iter()
            .find(|n| n.user_id == user_id && n.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Notification>, RepositoryError> {
        let Ok(oid) = bson::oid::ObjectId::parse_str(id) else {
            return Ok(None);
        };
        let notifications = self.notifications.lock().unwrap();
        Ok(notifications.iter().find(|n| n.id == Some(oid)).cloned())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.user_id == user_id).cloned())
    }

    async fn find_template(&self, template_id: &str) -> Result<Option<Template>, RepositoryError> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.template_id == template_id)
            .cloned())
    }

    async fn claim_due_channel(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>, RepositoryError> {
        let mut notifications = self.notifications.lock().unwrap();

        for tier in Priority::tiers_by_claim_order() {
            let mut candidates: Vec<usize> = notifications
                .iter()
                .enumerate()
                .filter(|(_, n)| n.priority == tier)
                .filter(|(_, n)| {
                    n.channels.iter().any(|c| {
                        matches!(c.status, ChannelStatus::Queued | ChannelStatus::RetryDue)
                            && c.next_attempt_at.is_some_and(|t| t <= now)
                    })
                })
                .map(|(i, _)| i)
                .collect();

            candidates.sort_by_key(|&i| notifications[i].created_at);

            if let Some(idx) = candidates.into_iter().next() {
                let notification = &mut notifications[idx];
                let channel_idx = notification
                    .channels
                    .iter()
                    .position(|c| {
                        matches!(c.status, ChannelStatus::Queued | ChannelStatus::RetryDue)
                            && c.next_attempt_at.is_some_and(|t| t <= now)
                    })
                    .expect("candidate filter guarantees a matching channel exists");

                let channel_state = &mut notification.channels[channel_idx];
                channel_state.status = ChannelStatus::Sending;
                channel_state.updated_at = now;
                notification.updated_at = now;

                return Ok(Some(ClaimedJob {
                    notification_id: notification.id.unwrap().to_hex(),
                    user_id: notification.user_id.clone(),
                    template_id: notification.template_id.clone(),
                    template_params: bson::from_document(notification.template_params.clone())
                        .unwrap_or(serde_json::Value::Null),
                    priority: notification.priority,
                    channel: channel_state.channel,
                    attempt_count: channel_state.attempt_count,
                }));
            }
        }

        Ok(None)
    }

    async fn record_attempt(&self, attempt: DeliveryAttempt) -> Result<(), RepositoryError> {
        self.attempts.lock().unwrap().push(attempt);
        Ok(())
    }

    async fn update_channel_after_attempt(
        &self,
        id: &str,
        channel: Channel,
        new_status: ChannelStatus,
        attempt_count: u32,
        next_attempt_at: Patch<Option<DateTime<Utc>>>,
        last_error: Patch<Option<String>>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let Ok(oid) = bson::oid::ObjectId::parse_str(id) else {
            return Err(RepositoryError::NotFound);
        };
        let mut notifications = self.notifications.lock().unwrap();
        let notification = notifications
            .iter_mut()
            .find(|n| n.id == Some(oid))
            .ok_or(RepositoryError::NotFound)?;
        let channel_state = notification
            .channels
            .iter_mut()
            .find(|c| c.channel == channel)
            .ok_or(RepositoryError::NotFound)?;

        channel_state.status = new_status;
        channel_state.attempt_count = attempt_count;
        if let Patch::Set(next) = next_attempt_at {
            channel_state.next_attempt_at = next;
        }
        if let Patch::Set(err) = last_error {
            channel_state.last_error = err;
        }
        channel_state.updated_at = now;
        notification.updated_at = now;
        Ok(())
    }

    async fn set_channel_read(&self, id: &str, channel: Option<Channel>, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let Ok(oid) = bson::oid::ObjectId::parse_str(id) else {
            return Err(RepositoryError::NotFound);
        };
        let mut notifications = self.notifications.lock().unwrap();
        let notification = notifications
            .iter_mut()
            .find(|n| n.id == Some(oid))
            .ok_or(RepositoryError::NotFound)?;

        match channel {
            Some(ch) => {
                let channel_state = notification
                    .channels
                    .iter_mut()
                    .find(|c| c.channel == ch)
                    .ok_or(RepositoryError::NotFound)?;
                channel_state.status = ChannelStatus::Read;
                channel_state.updated_at = now;
            }
            None => {
                for channel_state in notification.channels.iter_mut() {
                    channel_state.status = ChannelStatus::Read;
                    channel_state.updated_at = now;
                }
            }
        }
        notification.updated_at = now;
        Ok(())
    }

    async fn apply_receipt(
        &self,
        id: &str,
        channel: Channel,
        new_status: ChannelStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let Ok(oid) = bson::oid::ObjectId::parse_str(id) else {
            return Err(RepositoryError::NotFound);
        };
        let mut notifications = self.notifications.lock().unwrap();
        let notification = notifications
            .iter_mut()
            .find(|n| n.id == Some(oid))
            .ok_or(RepositoryError::NotFound)?;
        let channel_state = notification
            .channels
            .iter_mut()
            .find(|c| c.channel == channel)
            .ok_or(RepositoryError::NotFound)?;

        if channel_state.status == ChannelStatus::Failed {
            return Ok(());
        }
        if new_status == ChannelStatus::Delivered && channel_state.status == ChannelStatus::Read {
            return Ok(());
        }
        channel_state.status = new_status;
        channel_state.updated_at = now;
        notification.updated_at = now;
        Ok(())
    }

    async fn append_event(&self, id: &str, event: NotificationEvent) -> Result<(), RepositoryError> {
        let Ok(oid) = bson::oid::ObjectId::parse_str(id) else {
            return Ok(());
        };
        let mut notifications = self.notifications.lock().unwrap();
        if let Some(notification) = notifications.iter_mut().find(|n| n.id == Some(oid)) {
            notification.events.push(event);
        }
        Ok(())
    }
}

/// ObjectIds must be 24 hex chars; UUID v4 hex is 32, so truncate to build a
/// stable synthetic id for the fake store.
fn pad_oid(uuid_str: &str) -> String {
    uuid_str.replace('-', "")[..24].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChannelState;

    fn sample_notification(priority: Priority, now: DateTime<Utc>) -> Notification {
        Notification {
            id: None,
            idempotency_key: "key-1".into(),
            user_id: "user-1".into(),
            template_id: "tpl-1".into(),
            template_params: bson::doc! {},
            priority,
            channels: vec![ChannelState::new_queued(Channel::Email, now)],
            events: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn claim_respects_priority_order() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();

        repo.insert(sample_notification(Priority::Low, now)).await.unwrap();
        repo.insert(sample_notification(Priority::High, now)).await.unwrap();

        let claimed = repo.claim_due_channel(now).await.unwrap().unwrap();
        assert_eq!(claimed.priority, Priority::High);
    }

    #[tokio::test]
    async fn claim_is_idempotent_per_tick() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();
        repo.insert(sample_notification(Priority::Normal, now)).await.unwrap();

        let first = repo.claim_due_channel(now).await.unwrap();
        assert!(first.is_some());
        let second = repo.claim_due_channel(now).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn apply_receipt_is_noop_on_failed_channel() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();
        let id = repo.insert(sample_notification(Priority::Normal, now)).await.unwrap();

        repo.update_channel_after_attempt(
            &id,
            Channel::Email,
            ChannelStatus::Failed,
            5,
            Patch::some(None),
            Patch::some(Some("boom".into())),
            now,
        )
        .await
        .unwrap();

        repo.apply_receipt(&id, Channel::Email, ChannelStatus::Delivered, now)
            .await
            .unwrap();

        let notification = repo.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(notification.channels[0].status, ChannelStatus::Failed);
    }

    #[tokio::test]
    async fn apply_receipt_read_is_sticky_against_later_delivered() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();
        let id = repo.insert(sample_notification(Priority::Normal, now)).await.unwrap();

        repo.apply_receipt(&id, Channel::Email, ChannelStatus::Read, now).await.unwrap();
        repo.apply_receipt(&id, Channel::Email, ChannelStatus::Delivered, now).await.unwrap();

        let notification = repo.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(notification.channels[0].status, ChannelStatus::Read);
    }
}
