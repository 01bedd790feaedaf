//! Central configuration for the service.
//!
//! Reads from environment variables (and `.env` when present, via `dotenv`),
//! following the same plain `std::env::var` + typed-getter style as the
//! original codebase's config helpers, consolidated into one `Settings`
//! struct assembled once at process startup.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    None,
    Lru,
    Memcache,
}

#[derive(Debug, Clone)]
pub struct ProviderRoute {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_port: u16,
    pub cors_origins: Vec<String>,

    pub mongodb_uri: String,
    pub mongodb_db: String,

    pub email_provider: ProviderRoute,
    pub sms_provider: ProviderRoute,
    pub push_provider: ProviderRoute,
    pub provider_timeout: Duration,
    pub provider_retryable_status_codes: Vec<u16>,

    pub cache_backend: CacheBackend,
    pub cache_ttl_seconds: u64,
    pub memcache_host: String,
    pub memcache_port: u16,
    pub memcache_timeout: Duration,

    pub provider_callback_token: Option<String>,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_csv_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_csv_codes(raw: &str) -> Vec<u16> {
    let parsed: Vec<u16> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if parsed.is_empty() {
        default_retryable_codes()
    } else {
        parsed
    }
}

fn default_retryable_codes() -> Vec<u16> {
    vec![408, 429, 500, 502, 503, 504]
}

impl Settings {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| parse_csv_origins(&v))
            .unwrap_or_default();

        let provider_retryable_status_codes = env::var("PROVIDER_RETRYABLE_STATUS_CODES")
            .map(|v| parse_csv_codes(&v))
            .unwrap_or_else(|_| default_retryable_codes());

        let cache_backend = match env_or("CACHE_BACKEND", "none").as_str() {
            "lru" => CacheBackend::Lru,
            "memcache" => CacheBackend::Memcache,
            _ => CacheBackend::None,
        };

        Self {
            app_port: env_parse_or("APP_PORT", 8000),
            cors_origins,

            mongodb_uri: env_or("MONGODB_URI", "mongodb://localhost:27017"),
            mongodb_db: env_or("MONGODB_DB", "notifyhub"),

            email_provider: ProviderRoute {
                base_url: env_or("EMAIL_PROVIDER_BASE_URL", ""),
                api_key: env_or("EMAIL_PROVIDER_API_KEY", ""),
            },
            sms_provider: ProviderRoute {
                base_url: env_or("SMS_PROVIDER_BASE_URL", ""),
                api_key: env_or("SMS_PROVIDER_API_KEY", ""),
            },
            push_provider: ProviderRoute {
                base_url: env_or("PUSH_PROVIDER_BASE_URL", ""),
                api_key: env_or("PUSH_PROVIDER_API_KEY", ""),
            },
            provider_timeout: Duration::from_millis(env_parse_or("PROVIDER_TIMEOUT_MS", 5000)),
            provider_retryable_status_codes,

            cache_backend,
            cache_ttl_seconds: env_parse_or("CACHE_TTL_SECONDS", 300),
            memcache_host: env_or("MEMCACHE_HOST", "localhost"),
            memcache_port: env_parse_or("MEMCACHE_PORT", 11211),
            memcache_timeout: Duration::from_millis(env_parse_or("MEMCACHE_TIMEOUT_MS", 200)),

            provider_callback_token: env::var("PROVIDER_CALLBACK_TOKEN").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_csv_origins() {
        assert_eq!(
            parse_csv_origins(" https://a.com, https://b.com ,"),
            vec!["https://a.com", "https://b.com"]
        );
    }

    #[test]
    fn falls_back_to_default_retryable_codes_on_empty() {
        assert_eq!(parse_csv_codes(""), default_retryable_codes());
    }

    #[test]
    fn parses_retryable_codes() {
        assert_eq!(parse_csv_codes("408, 500"), vec![408, 500]);
    }
}
