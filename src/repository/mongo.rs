//! MongoDB-backed `NotificationRepository`.
//!
//! The claim path (`claim_due_channel`) and the receipt path
//! (`apply_receipt`) are the two places spec §9 calls out as needing a
//! single atomic conditional update rather than read-then-write; both are
//! implemented here as `find_one_and_update` calls using the positional `$`
//! operator, which MongoDB binds to the first array element matching the
//! query — the same "one conditional update, no RMW" shape the teacher
//! reaches for with `on_conflict().do_update()` in
//! `services/notifications/channels/email.rs::update_rate_limit`.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson};
use chrono::{DateTime, Utc};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Collection, IndexModel};

use crate::error::RepositoryError;
use crate::models::{
    Channel, ChannelStatus, DeliveryAttempt, Notification, NotificationEvent, Priority,
};

use super::{ClaimedJob, NotificationRepository, Patch};

pub struct MongoNotificationRepository {
    notifications: Collection<Notification>,
    attempts: Collection<DeliveryAttempt>,
    users: Collection<crate::models::User>,
    templates: Collection<crate::models::Template>,
}

impl MongoNotificationRepository {
    pub fn new(db: &crate::db::Db) -> Self {
        Self {
            notifications: db.notifications(),
            attempts: db.attempts(),
            users: db.users(),
            templates: db.templates(),
        }
    }

    fn parse_id(id: &str) -> Option<ObjectId> {
        ObjectId::parse_str(id).ok()
    }

    async fn load_channel_status(
        &self,
        oid: ObjectId,
        channel: Channel,
    ) -> Result<Option<ChannelStatus>, RepositoryError> {
        let doc = self
            .notifications
            .find_one(doc! { "_id": oid })
            .await?;
        Ok(doc
            .and_then(|n| n.channels.into_iter().find(|c| c.channel == channel))
            .map(|c| c.status))
    }
}

fn status_str(status: ChannelStatus) -> &'static str {
    match status {
        ChannelStatus::Queued => "QUEUED",
        ChannelStatus::Sending => "SENDING",
        ChannelStatus::Sent => "SENT",
        ChannelStatus::Delivered => "DELIVERED",
        ChannelStatus::Read => "READ",
        ChannelStatus::RetryDue => "RETRY_DUE",
        ChannelStatus::Failed => "FAILED",
    }
}

fn priority_str(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "LOW",
        Priority::Normal => "NORMAL",
        Priority::High => "HIGH",
    }
}

#[async_trait]
impl NotificationRepository for MongoNotificationRepository {
    async fn ensure_indexes(&self) -> Result<(), RepositoryError> {
        let unique = IndexOptions::builder().unique(true).build();

        self.notifications
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "idempotency_key": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;

        self.notifications
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "channels.status": 1, "channels.next_attempt_at": 1, "priority": 1 })
                    .build(),
            )
            .await?;

        self.users
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;

        self.templates
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "name": 1 })
                    .options(unique)
                    .build(),
            )
            .await?;

        self.attempts
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "notification_id": 1, "channel": 1, "attempt_no": 1 })
                    .build(),
            )
            .await?;

        Ok(())
    }

    async fn insert(&self, doc: Notification) -> Result<String, RepositoryError> {
        let result = self.notifications.insert_one(&doc).await?;
        Ok(result
            .inserted_id
            .as_object_id()
            .expect("insert_one always returns an ObjectId for an auto-generated _id")
            .to_hex())
    }

    async fn find_by_user_and_idempotency(
        &self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Notification>, RepositoryError> {
        let found = self
            .notifications
            .find_one(doc! { "user_id": user_id, "idempotency_key": idempotency_key })
            .await?;
        Ok(found)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Notification>, RepositoryError> {
        let Some(oid) = Self::parse_id(id) else {
            return Ok(None);
        };
        Ok(self.notifications.find_one(doc! { "_id": oid }).await?)
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<crate::models::User>, RepositoryError> {
        Ok(self.users.find_one(doc! { "user_id": user_id }).await?)
    }

    async fn find_template(&self, template_id: &str) -> Result<Option<crate::models::Template>, RepositoryError> {
        Ok(self.templates.find_one(doc! { "template_id": template_id }).await?)
    }

    async fn claim_due_channel(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>, RepositoryError> {
        // BSON datetimes only carry millisecond precision; truncate up front
        // so the value we compare the round-tripped document against below
        // (`c.updated_at == now`) matches exactly instead of losing the
        // sub-millisecond remainder across the store round trip.
        let now = DateTime::<Utc>::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);

        let claimable: Vec<Bson> = [ChannelStatus::Queued, ChannelStatus::RetryDue]
            .into_iter()
            .map(|s| Bson::String(status_str(s).to_string()))
            .collect();

        for tier in Priority::tiers_by_claim_order() {
            let filter = doc! {
                "priority": priority_str(tier),
                "channels": {
                    "$elemMatch": {
                        "status": { "$in": claimable.clone() },
                        "next_attempt_at": { "$lte": now },
                    }
                }
            };
            let update = doc! {
                "$set": {
                    "channels.$.status": status_str(ChannelStatus::Sending),
                    "channels.$.updated_at": now,
                    "updated_at": now,
                }
            };
            if let Some(updated) = self
                .notifications
                .find_one_and_update(filter, update)
                .sort(doc! { "created_at": 1 })
                .return_document(ReturnDocument::After)
                .await?
            {
                // The positional `$` only rewrote one array element; find the
                // channel we just flipped to SENDING at this exact tick.
                if let Some(claimed) = updated
                    .channels
                    .iter()
                    .find(|c| c.status == ChannelStatus::Sending && c.updated_at == now)
                {
                    return Ok(Some(ClaimedJob {
                        notification_id: updated.id.expect("persisted notification has an id").to_hex(),
                        user_id: updated.user_id.clone(),
                        template_id: updated.template_id.clone(),
                        template_params: bson::from_document(updated.template_params.clone())
                            .unwrap_or(serde_json::Value::Null),
                        priority: updated.priority,
                        channel: claimed.channel,
                        attempt_count: claimed.attempt_count,
                    }));
                }
            }
        }

        Ok(None)
    }

    async fn record_attempt(&self, attempt: DeliveryAttempt) -> Result<(), RepositoryError> {
        self.attempts.insert_one(&attempt).await?;
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
        let Some(oid) = Self::parse_id(id) else {
            return Err(RepositoryError::NotFound);
        };

        let mut set_doc = doc! {
            "channels.$.status": status_str(new_status),
            "channels.$.attempt_count": attempt_count as i64,
            "updated_at": now,
        };
        if let Patch::Set(next) = next_attempt_at {
            set_doc.insert(
                "channels.$.next_attempt_at",
                next.map(Bson::from).unwrap_or(Bson::Null),
            );
        }
        if let Patch::Set(err) = last_error {
            set_doc.insert("channels.$.last_error", err.map(Bson::String).unwrap_or(Bson::Null));
        }

        let result = self
            .notifications
            .update_one(
                doc! { "_id": oid, "channels.channel": channel.as_str() },
                doc! { "$set": set_doc },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_channel_read(&self, id: &str, channel: Option<Channel>, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let Some(oid) = Self::parse_id(id) else {
            return Err(RepositoryError::NotFound);
        };

        match channel {
            Some(ch) => {
                let result = self
                    .notifications
                    .update_one(
                        doc! { "_id": oid, "channels.channel": ch.as_str() },
                        doc! { "$set": {
                            "channels.$.status": status_str(ChannelStatus::Read),
                            "channels.$.updated_at": now,
                            "updated_at": now,
                        } },
                    )
                    .await?;
                if result.matched_count == 0 {
                    return Err(RepositoryError::NotFound);
                }
            }
            None => {
                let notification = self
                    .notifications
                    .find_one(doc! { "_id": oid })
                    .await?
                    .ok_or(RepositoryError::NotFound)?;

                let channels: Vec<bson::Bson> = notification
                    .channels
                    .iter()
                    .map(|c| {
                        Bson::Document(doc! {
                            "channel": c.channel.as_str(),
                            "status": status_str(ChannelStatus::Read),
                            "attempt_count": c.attempt_count as i64,
                            "last_error": c.last_error.clone().map(Bson::String).unwrap_or(Bson::Null),
                            "next_attempt_at": Bson::Null,
                            "created_at": c.created_at,
                            "updated_at": now,
                        })
                    })
                    .collect();

                let result = self
                    .notifications
                    .update_one(
                        doc! { "_id": oid },
                        doc! { "$set": { "channels": channels, "updated_at": now } },
                    )
                    .await?;
                if result.matched_count == 0 {
                    return Err(RepositoryError::NotFound);
                }
            }
        }
        Ok(())
    }

    async fn apply_receipt(
        &self,
        id: &str,
        channel: Channel,
        new_status: ChannelStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let Some(oid) = Self::parse_id(id) else {
            return Err(RepositoryError::NotFound);
        };

        // Conditional compare-and-swap loop: read current status, then write
        // guarded by that same status, retrying on a lost race instead of
        // blindly overwriting (spec §9: avoid read-modify-write).
        for _ in 0..5 {
            let cur = match self.load_channel_status(oid, channel).await? {
                Some(s) => s,
                None => return Err(RepositoryError::NotFound),
            };

            if cur == ChannelStatus::Failed {
                return Ok(());
            }
            if new_status == ChannelStatus::Delivered && cur == ChannelStatus::Read {
                return Ok(());
            }

            let result = self
                .notifications
                .update_one(
                    doc! {
                        "_id": oid,
                        "channels.channel": channel.as_str(),
                        "channels.status": status_str(cur),
                    },
                    doc! { "$set": {
                        "channels.$.status": status_str(new_status),
                        "channels.$.updated_at": now,
                        "updated_at": now,
                    } },
                )
                .await?;

            if result.matched_count == 1 {
                return Ok(());
            }
            // Someone else changed the channel between read and write; loop
            // and re-evaluate against the new current status.
        }

        Err(RepositoryError::Store(
            "apply_receipt: exhausted retries racing a concurrent update".to_string(),
        ))
    }

    async fn append_event(&self, id: &str, event: NotificationEvent) -> Result<(), RepositoryError> {
        let Some(oid) = Self::parse_id(id) else {
            return Ok(());
        };
        self.notifications
            .update_one(
                doc! { "_id": oid },
                doc! { "$push": { "events": bson::to_bson(&event).map_err(|e| RepositoryError::Store(e.to_string()))? } },
            )
            .await?;
        Ok(())
    }
}

