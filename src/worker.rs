//! Delivery worker core (C6): the endless claim-dispatch-update loop that
//! advances per-channel delivery state.
//!
//! The worker polls the store itself via `claim_due_channel` rather than
//! draining an in-memory queue, since the durable document doubles as the
//! queue — an atomic claim is the only way to guarantee at-most-one
//! worker has a given (notification, channel) in flight at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use crate::models::{AttemptOutcome, ChannelStatus, DeliveryAttempt, EventKind, NotificationEvent};
use crate::repository::{ClaimedJob, NotificationRepository, Patch};
use crate::services::provider::ProviderAdapter;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_SECS: f64 = 2.0;
const CAP_DELAY_SECS: f64 = 300.0;
const JITTER_FRACTION: f64 = 0.2;
const IDLE_SLEEP: Duration = Duration::from_millis(500);

pub struct DeliveryWorker {
    repo: Arc<dyn NotificationRepository>,
    provider: Arc<ProviderAdapter>,
    retryable_status_codes: Vec<u16>,
}

impl DeliveryWorker {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        provider: Arc<ProviderAdapter>,
        retryable_status_codes: Vec<u16>,
    ) -> Self {
        Self {
            repo,
            provider,
            retryable_status_codes,
        }
    }

    /// Runs the endless claim-dispatch-update loop until `shutdown` fires.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        tracing::info!("delivery worker starting");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = Utc::now();
            match self.repo.claim_due_channel(now).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process_job(job).await {
                        tracing::error!(error = %e, "failed to process claimed job");
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_SLEEP) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "claim_due_channel failed");
                    tokio::time::sleep(IDLE_SLEEP).await;
                }
            }
        }
        tracing::info!("delivery worker shutting down");
    }

    async fn process_job(&self, job: ClaimedJob) -> Result<(), crate::error::RepositoryError> {
        let attempt_no = job.attempt_count + 1;

        self.repo
            .append_event(
                &job.notification_id,
                NotificationEvent::new(EventKind::Claimed, Some(job.channel), None),
            )
            .await?;

        let result = self
            .provider
            .send(
                job.channel,
                &job.notification_id,
                &job.user_id,
                &job.template_id,
                &job.template_params,
                job.priority,
            )
            .await;

        let now = Utc::now();

        if result.ok {
            self.handle_success(&job, attempt_no, &result, now).await
        } else {
            self.handle_failure(&job, attempt_no, &result, now).await
        }
    }

    async fn handle_success(
        &self,
        job: &ClaimedJob,
        attempt_no: u32,
        result: &crate::services::provider::ProviderResult,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), crate::error::RepositoryError> {
        self.repo
            .record_attempt(DeliveryAttempt {
                id: None,
                notification_id: bson::oid::ObjectId::parse_str(&job.notification_id)
                    .unwrap_or_else(|_| bson::oid::ObjectId::new()),
                channel: job.channel,
                attempt_no,
                outcome: AttemptOutcome::Success,
                provider_status_code: result.status_code,
                provider_response: result.response_body.clone(),
                error: None,
                created_at: now,
            })
            .await?;

        self.repo
            .update_channel_after_attempt(
                &job.notification_id,
                job.channel,
                ChannelStatus::Sent,
                attempt_no,
                Patch::some(None),
                Patch::some(None),
                now,
            )
            .await?;

        self.repo
            .append_event(
                &job.notification_id,
                NotificationEvent::new(EventKind::ProviderSuccess, Some(job.channel), None),
            )
            .await?;

        tracing::debug!(
            notification_id = %job.notification_id,
            channel = job.channel.as_str(),
            attempt = attempt_no,
            "notification delivered"
        );
        Ok(())
    }

    async fn handle_failure(
        &self,
        job: &ClaimedJob,
        attempt_no: u32,
        result: &crate::services::provider::ProviderResult,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), crate::error::RepositoryError> {
        let retryable = match result.status_code {
            None => true,
            Some(code) => self.retryable_status_codes.contains(&code),
        };

        let error_message = result
            .error
            .clone()
            .or_else(|| result.status_code.map(|c| format!("provider returned status {c}")));

        self.repo
            .record_attempt(DeliveryAttempt {
                id: None,
                notification_id: bson::oid::ObjectId::parse_str(&job.notification_id)
                    .unwrap_or_else(|_| bson::oid::ObjectId::new()),
                channel: job.channel,
                attempt_no,
                outcome: AttemptOutcome::Failure,
                provider_status_code: result.status_code,
                provider_response: result.response_body.clone(),
                error: error_message.clone(),
                created_at: now,
            })
            .await?;

        if retryable && attempt_no < MAX_ATTEMPTS {
            let next_attempt_at = now + chrono::Duration::milliseconds(backoff_millis(attempt_no));

            self.repo
                .update_channel_after_attempt(
                    &job.notification_id,
                    job.channel,
                    ChannelStatus::RetryDue,
                    attempt_no,
                    Patch::some(Some(next_attempt_at)),
                    Patch::some(error_message.clone()),
                    now,
                )
                .await?;

            self.repo
                .append_event(
                    &job.notification_id,
                    NotificationEvent::new(EventKind::RetryScheduled, Some(job.channel), error_message),
                )
                .await?;

            tracing::warn!(
                notification_id = %job.notification_id,
                channel = job.channel.as_str(),
                attempt = attempt_no,
                next_attempt_at = %next_attempt_at,
                "delivery attempt failed, retry scheduled"
            );
        } else {
            self.repo
                .update_channel_after_attempt(
                    &job.notification_id,
                    job.channel,
                    ChannelStatus::Failed,
                    attempt_no,
                    Patch::some(None),
                    Patch::some(error_message.clone()),
                    now,
                )
                .await?;

            self.repo
                .append_event(
                    &job.notification_id,
                    NotificationEvent::new(EventKind::FinalFailure, Some(job.channel), error_message),
                )
                .await?;

            tracing::warn!(
                notification_id = %job.notification_id,
                channel = job.channel.as_str(),
                attempt = attempt_no,
                "delivery exhausted retries, channel marked FAILED"
            );
        }

        Ok(())
    }
}

/// `base * 2^(attempt_no - 1)` clamped to `[0, cap]`, jittered by `±20%`.
fn backoff_millis(attempt_no: u32) -> i64 {
    let exponent = (attempt_no.saturating_sub(1)) as i32;
    let raw = BASE_DELAY_SECS * 2f64.powi(exponent);
    let clamped = raw.clamp(0.0, CAP_DELAY_SECS);
    let jitter = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let jittered = clamped * (1.0 + jitter);
    (jittered * 1000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_within_jitter_band() {
        for attempt in 1..=5 {
            let base = BASE_DELAY_SECS * 2f64.powi((attempt - 1) as i32);
            let clamped = base.clamp(0.0, CAP_DELAY_SECS);
            let lower = (clamped * (1.0 - JITTER_FRACTION) * 1000.0) as i64;
            let upper = (clamped * (1.0 + JITTER_FRACTION) * 1000.0) as i64;
            for _ in 0..20 {
                let millis = backoff_millis(attempt);
                assert!(
                    millis >= lower - 1 && millis <= upper + 1,
                    "attempt {attempt}: {millis} not within [{lower}, {upper}]"
                );
            }
        }
    }

    #[test]
    fn backoff_respects_cap_at_high_attempt_numbers() {
        let millis = backoff_millis(MAX_ATTEMPTS);
        assert!(millis as f64 <= CAP_DELAY_SECS * 1000.0 * (1.0 + JITTER_FRACTION) + 1.0);
    }
}
