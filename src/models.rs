//! Core data model: notifications, per-channel state, delivery attempts,
//! and the read-only external entities (users, templates) notifications
//! reference.

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Sms => "SMS",
            Self::Push => "PUSH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    /// Claim order: HIGH -> NORMAL -> LOW.
    pub fn tiers_by_claim_order() -> [Priority; 3] {
        [Priority::High, Priority::Normal, Priority::Low]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Queued,
    Sending,
    Sent,
    Delivered,
    Read,
    RetryDue,
    Failed,
}

impl ChannelStatus {
    pub fn claimable() -> [ChannelStatus; 2] {
        [ChannelStatus::Queued, ChannelStatus::RetryDue]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Queued,
    RetryDue,
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Accepted,
    IdempotencyHit,
    Claimed,
    ProviderSuccess,
    RetryScheduled,
    FinalFailure,
    ProviderReceipt,
    ReadMarked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub channel: Option<Channel>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(kind: EventKind, channel: Option<Channel>, detail: Option<String>) -> Self {
        Self {
            kind,
            channel,
            detail,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelState {
    pub channel: Channel,
    pub status: ChannelStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelState {
    pub fn new_queued(channel: Channel, now: DateTime<Utc>) -> Self {
        Self {
            channel,
            status: ChannelStatus::Queued,
            attempt_count: 0,
            last_error: None,
            next_attempt_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub idempotency_key: String,
    pub user_id: String,
    pub template_id: String,
    pub template_params: bson::Document,
    pub priority: Priority,
    pub channels: Vec<ChannelState>,
    pub events: Vec<NotificationEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Derived read-only summary of the per-channel status multiset (spec §4.5).
    pub fn overall_status(&self) -> OverallStatus {
        let statuses: Vec<ChannelStatus> = self.channels.iter().map(|c| c.status).collect();

        if statuses.iter().any(|s| *s == ChannelStatus::Failed) {
            return OverallStatus::Failed;
        }
        if statuses.iter().all(|s| *s == ChannelStatus::Read) {
            return OverallStatus::Read;
        }
        if statuses
            .iter()
            .all(|s| matches!(s, ChannelStatus::Delivered | ChannelStatus::Read))
        {
            return OverallStatus::Delivered;
        }
        if statuses.iter().all(|s| {
            matches!(
                s,
                ChannelStatus::Sent | ChannelStatus::Delivered | ChannelStatus::Read
            )
        }) {
            return OverallStatus::Sent;
        }
        if statuses.iter().any(|s| *s == ChannelStatus::Sending) {
            return OverallStatus::Sending;
        }
        if statuses.iter().any(|s| *s == ChannelStatus::RetryDue) {
            return OverallStatus::RetryDue;
        }
        OverallStatus::Queued
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub notification_id: ObjectId,
    pub channel: Channel,
    pub attempt_no: u32,
    pub outcome: AttemptOutcome,
    pub provider_status_code: Option<u16>,
    pub provider_response: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Read-only external entity. The core never writes these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub name: String,
}

/// Read-only external entity. The core never writes these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub template_id: String,
    pub name: String,
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(status: ChannelStatus) -> ChannelState {
        ChannelState {
            channel: Channel::Email,
            status,
            attempt_count: 0,
            last_error: None,
            next_attempt_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn notification(channels: Vec<ChannelState>) -> Notification {
        Notification {
            id: None,
            idempotency_key: "k".into(),
            user_id: "u".into(),
            template_id: "t".into(),
            template_params: bson::doc! {},
            priority: Priority::Normal,
            channels,
            events: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn failed_dominates() {
        let n = notification(vec![channel(ChannelStatus::Sent), channel(ChannelStatus::Failed)]);
        assert_eq!(n.overall_status(), OverallStatus::Failed);
    }

    #[test]
    fn all_read_is_read() {
        let n = notification(vec![channel(ChannelStatus::Read)]);
        assert_eq!(n.overall_status(), OverallStatus::Read);
    }

    #[test]
    fn mixed_delivered_and_read_is_delivered() {
        let n = notification(vec![channel(ChannelStatus::Delivered), channel(ChannelStatus::Read)]);
        assert_eq!(n.overall_status(), OverallStatus::Delivered);
    }

    #[test]
    fn mixed_sent_delivered_read_is_sent() {
        let n = notification(vec![
            channel(ChannelStatus::Sent),
            channel(ChannelStatus::Delivered),
        ]);
        assert_eq!(n.overall_status(), OverallStatus::Sent);
    }

    #[test]
    fn sending_beats_retry_due() {
        let n = notification(vec![
            channel(ChannelStatus::Sending),
            channel(ChannelStatus::RetryDue),
        ]);
        assert_eq!(n.overall_status(), OverallStatus::Sending);
    }

    #[test]
    fn retry_due_beats_queued() {
        let n = notification(vec![channel(ChannelStatus::Queued), channel(ChannelStatus::RetryDue)]);
        assert_eq!(n.overall_status(), OverallStatus::RetryDue);
    }

    #[test]
    fn all_queued_is_queued() {
        let n = notification(vec![channel(ChannelStatus::Queued)]);
        assert_eq!(n.overall_status(), OverallStatus::Queued);
    }
}
