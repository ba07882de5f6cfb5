use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_subscription_buffer")]
    pub subscription_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            subscription_buffer: default_subscription_buffer(),
        }
    }
}

fn default_subscription_buffer() -> usize { 256 }

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_min_cancel_lead_minutes")]
    pub min_cancel_lead_minutes: i64,
    /// Offset of the calendar weekdays are materialized in.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,
    #[serde(default = "default_discovery_refresh_seconds")]
    pub discovery_refresh_seconds: u64,
}

fn default_min_cancel_lead_minutes() -> i64 { 15 }
fn default_max_write_attempts() -> u32 { 3 }
fn default_discovery_refresh_seconds() -> u64 { 60 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            min_cancel_lead_minutes: default_min_cancel_lead_minutes(),
            utc_offset_minutes: 0,
            max_write_attempts: default_max_write_attempts(),
            discovery_refresh_seconds: default_discovery_refresh_seconds(),
        }
    }
}

impl BusinessRules {
    /// Out-of-range offsets fall back to UTC.
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `TUTORME_BUSINESS_RULES__MAX_WRITE_ATTEMPTS=5`
            .add_source(config::Environment::with_prefix("TUTORME").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rules_defaults() {
        let rules = BusinessRules::default();
        assert_eq!(rules.min_cancel_lead_minutes, 15);
        assert_eq!(rules.max_write_attempts, 3);
        assert_eq!(rules.timezone().local_minus_utc(), 0);
    }

    #[test]
    fn test_timezone_from_offset() {
        let rules = BusinessRules { utc_offset_minutes: 330, ..BusinessRules::default() };
        assert_eq!(rules.timezone().local_minus_utc(), 330 * 60);

        let bogus = BusinessRules { utc_offset_minutes: 100_000, ..BusinessRules::default() };
        assert_eq!(bogus.timezone().local_minus_utc(), 0);
    }

    #[test]
    fn test_partial_sections_take_defaults() {
        let cfg = config::Config::builder()
            .set_override("server.port", 8080_i64)
            .and_then(|b| b.set_override("auth.jwt_secret", "secret"))
            .and_then(|b| b.set_override("business_rules.utc_offset_minutes", -300_i64))
            .unwrap()
            .build()
            .unwrap();
        let parsed: Config = cfg.try_deserialize().unwrap();

        assert_eq!(parsed.server.port, 8080);
        assert_eq!(parsed.store.subscription_buffer, 256);
        assert_eq!(parsed.business_rules.utc_offset_minutes, -300);
        assert_eq!(parsed.business_rules.discovery_refresh_seconds, 60);
    }
}
