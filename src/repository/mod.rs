//! Typed operations over the store.
//!
//! `NotificationRepository` is a capability trait so the acceptance service
//! and the delivery worker can be exercised in tests against an in-memory
//! fake (see [`memory`]) without a live MongoDB.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RepositoryError;
use crate::models::{
    Channel, ChannelStatus, DeliveryAttempt, Notification, NotificationEvent, Priority, Template, User,
};

/// Optional-update wrapper distinguishing "leave untouched" from "set to
/// this value, including clearing it" — lets a single call clear
/// `next_attempt_at`/`last_error` on success without forcing every caller
/// to pass them explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub enum Patch<T> {
    #[default]
    Unchanged,
    Set(T),
}

impl<T> Patch<T> {
    pub fn some(value: T) -> Self {
        Patch::Set(value)
    }
}

/// The payload returned by a successful claim (spec §4.6).
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub notification_id: String,
    pub user_id: String,
    pub template_id: String,
    pub template_params: serde_json::Value,
    pub priority: Priority,
    pub channel: Channel,
    pub attempt_count: u32,
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn ensure_indexes(&self) -> Result<(), RepositoryError>;

    async fn insert(&self, doc: Notification) -> Result<String, RepositoryError>;

    async fn find_by_user_and_idempotency(
        &self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Notification>, RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Notification>, RepositoryError>;

    /// Read-only lookups backing the acceptance path's cached existence
    /// checks (spec §4.5 step 2).
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, RepositoryError>;

    async fn find_template(&self, template_id: &str) -> Result<Option<Template>, RepositoryError>;

    /// Atomic priority-ordered claim (spec §4.6). Scans HIGH -> NORMAL ->
    /// LOW; within a tier, the store's natural `created_at` ordering
    /// prefers older work.
    async fn claim_due_channel(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>, RepositoryError>;

    async fn record_attempt(&self, attempt: DeliveryAttempt) -> Result<(), RepositoryError>;

    #[allow(clippy::too_many_arguments)]
    async fn update_channel_after_attempt(
        &self,
        id: &str,
        channel: Channel,
        new_status: ChannelStatus,
        attempt_count: u32,
        next_attempt_at: Patch<Option<DateTime<Utc>>>,
        last_error: Patch<Option<String>>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Sets `status = READ` on one channel, or on all channels when `None`.
    async fn set_channel_read(&self, id: &str, channel: Option<Channel>, now: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Monotonic receipt transition (spec §4.7). `new_status` must be
    /// `Delivered` or `Read`.
    async fn apply_receipt(
        &self,
        id: &str,
        channel: Channel,
        new_status: ChannelStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn append_event(&self, id: &str, event: NotificationEvent) -> Result<(), RepositoryError>;
}
