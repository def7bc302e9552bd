use serde::Deserialize;

use crate::coordinator::CoordinatorConfig;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub idempotency: IdempotencySettings,
    pub store: StoreSettings,
    pub redis: RedisSettings,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationSettings {
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

#[derive(Debug, Deserialize)]
pub struct IdempotencySettings {
    #[serde(default = "default_response_ttl_seconds")]
    pub response_ttl_seconds: i64,
    #[serde(default = "default_lock_ttl_seconds")]
    pub lock_ttl_seconds: i64,
    #[serde(default = "default_header_name")]
    pub header_name: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_response_ttl_seconds() -> i64 {
    900 // 15 minutes
}

fn default_lock_ttl_seconds() -> i64 {
    120 // 2 minutes
}

fn default_header_name() -> String {
    "Idempotency-Key".to_string()
}

fn default_key_prefix() -> String {
    "idem".to_string()
}

/// Which backing store the gateway runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
}

#[derive(Debug, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            response_ttl_seconds: self.idempotency.response_ttl_seconds,
            lock_ttl_seconds: self.idempotency.lock_ttl_seconds,
        }
    }
}
