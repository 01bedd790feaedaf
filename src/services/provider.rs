//! External provider adapter.
//!
//! A thin channel-keyed HTTP caller: one `reqwest::Client` with a per-call
//! timeout, routed per channel through a `HashMap<Channel, ProviderRoute>`
//! instead of one struct per channel, since every channel here speaks the
//! same wire contract (`POST {base_url}/send`) and only the destination
//! differs.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::config::{ProviderRoute, Settings};
use crate::models::{Channel, Priority};

#[derive(Debug, Clone, Serialize)]
struct ProviderPayload<'a> {
    notification_id: &'a str,
    user_id: &'a str,
    template_id: &'a str,
    template_params: &'a serde_json::Value,
    channel: &'a str,
    priority: &'a str,
}

#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub ok: bool,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
}

pub struct ProviderAdapter {
    client: Client,
    routes: HashMap<Channel, ProviderRoute>,
    timeout: Duration,
}

impl ProviderAdapter {
    pub fn new(settings: &Settings) -> Self {
        let client = Client::builder()
            .timeout(settings.provider_timeout)
            .user_agent("NotifyHub-Provider/1.0")
            .build()
            .expect("failed to build provider HTTP client");

        let mut routes = HashMap::new();
        routes.insert(Channel::Email, settings.email_provider.clone());
        routes.insert(Channel::Sms, settings.sms_provider.clone());
        routes.insert(Channel::Push, settings.push_provider.clone());

        Self {
            client,
            routes,
            timeout: settings.provider_timeout,
        }
    }

    pub async fn send(
        &self,
        channel: Channel,
        notification_id: &str,
        user_id: &str,
        template_id: &str,
        template_params: &serde_json::Value,
        priority: Priority,
    ) -> ProviderResult {
        let route = match self.routes.get(&channel) {
            Some(r) if !r.base_url.is_empty() => r,
            _ => {
                return ProviderResult {
                    ok: false,
                    status_code: None,
                    response_body: None,
                    error: Some("Provider base URL not configured".to_string()),
                }
            }
        };

        let priority_str = match priority {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
        };

        let payload = ProviderPayload {
            notification_id,
            user_id,
            template_id,
            template_params,
            channel: channel.as_str(),
            priority: priority_str,
        };

        let url = format!("{}/send", route.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&payload);
        if !route.api_key.is_empty() {
            request = request.bearer_auth(&route.api_key);
        }

        let result = tokio::time::timeout(self.timeout, request.send()).await;

        match result {
            Err(_) => ProviderResult {
                ok: false,
                status_code: None,
                response_body: None,
                error: Some("request timed out".to_string()),
            },
            Ok(Err(e)) => ProviderResult {
                ok: false,
                status_code: None,
                response_body: None,
                error: Some(e.to_string()),
            },
            Ok(Ok(response)) => {
                let status = response.status();
                let body = response.text().await.ok();
                if status.is_success() {
                    ProviderResult {
                        ok: true,
                        status_code: Some(status.as_u16()),
                        response_body: body,
                        error: None,
                    }
                } else {
                    ProviderResult {
                        ok: false,
                        status_code: Some(status.as_u16()),
                        response_body: body,
                        error: None,
                    }
                }
            }
        }
    }
}
