//! Env-loaded runtime configuration with typed defaults.
//!
//! Every knob has a safe default so a bare `cargo run` serves traffic; unset
//! or malformed values fall back with a warning rather than aborting.

use std::str::FromStr;

use crewdesk_emergency::EmergencyConfig;
use crewdesk_threat::ThreatConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub threat: ThreatConfig,
    pub emergency: EmergencyConfig,
    /// Audit records older than this are purged by the retention task.
    pub audit_retention_days: u32,
    /// Owned here, consumed by the external session layer.
    pub two_factor_confirmation_ttl_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            "dev-secret".to_string()
        });

        let threat = ThreatConfig {
            failed_login_threshold: env_parse("FAILED_LOGIN_THRESHOLD", 3),
            suspicious_threshold: env_parse("SUSPICIOUS_ACTIVITY_THRESHOLD", 50),
            critical_threshold: env_parse("CRITICAL_THREAT_THRESHOLD", 80),
            ip_block_ttl_secs: env_parse("IP_BLOCK_TTL_SECS", 1800),
            rate_limit_window_secs: env_parse("NOTIFICATION_RATE_LIMIT_WINDOW_SECS", 3600),
            ..ThreatConfig::default()
        };

        let emergency = EmergencyConfig {
            max_duration_minutes: env_parse("EMERGENCY_MAX_DURATION_MINUTES", 60),
        };

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            jwt_secret,
            threat,
            emergency,
            audit_retention_days: env_parse("AUDIT_RETENTION_DAYS", 90),
            two_factor_confirmation_ttl_secs: env_parse("TWO_FACTOR_CONFIRMATION_TTL_SECS", 10800),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw = %raw, "unparseable config value, using default");
            default
        }),
        Err(_) => default,
    }
}
