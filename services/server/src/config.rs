//! `EnvelopeConfig` (spec component K, §6). Loaded once at startup from
//! environment variables, mirroring the teacher's `main.rs` pattern of
//! reading `env::var` with sensible defaults before building `AppState`.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchShape {
    PayloadList,
    Tabular,
}

#[derive(Debug, Clone)]
pub struct EnvelopeConfig {
    /// `ENVELOPE_ALLOW_UNAUTHENTICATED` — accept sessions with no
    /// authenticated user.
    pub allow_unauthenticated: bool,
    /// `ENVELOPE_CONNECTION_UPDATE_INTERVAL` — heartbeat throttle; `None`
    /// disables the throttled `last_action` update job (spec §4.8, §9).
    pub connection_update_interval: Option<Duration>,
    /// `ENVELOPE_CONNECTIONS_QUEUE` — if unset, connection-create/close
    /// housekeeping is skipped (not an error).
    pub connections_queue: Option<String>,
    /// `ENVELOPE_TIMESTAMP_QUEUE` — if unset, the throttled timestamp
    /// update housekeeping is skipped.
    pub timestamp_queue: Option<String>,
    /// `ENVELOPE_BATCH_MESSAGE` — which batch factory to use when a
    /// transaction's buffered sends are coalesced (spec §4.9).
    pub batch_shape: BatchShape,
    pub bind_addr: String,
    pub database_url: String,
    pub log_level: String,
    pub job_workers: usize,
}

impl EnvelopeConfig {
    pub fn from_env() -> Self {
        EnvelopeConfig {
            allow_unauthenticated: env_bool("ENVELOPE_ALLOW_UNAUTHENTICATED", false),
            connection_update_interval: env_optional_secs("ENVELOPE_CONNECTION_UPDATE_INTERVAL", 180),
            connections_queue: env::var("ENVELOPE_CONNECTIONS_QUEUE").ok().filter(|v| !v.is_empty()),
            timestamp_queue: env::var("ENVELOPE_TIMESTAMP_QUEUE").ok().filter(|v| !v.is_empty()),
            batch_shape: match env::var("ENVELOPE_BATCH_MESSAGE").as_deref() {
                Ok("tabular") => BatchShape::Tabular,
                _ => BatchShape::PayloadList,
            },
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
            job_workers: env::var("ENVELOPE_JOB_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(default)
}

/// `null` (empty string) disables the interval; otherwise parses seconds,
/// falling back to `default_secs` on a missing var — never on an explicit
/// empty one (spec §9 open question: "treat this as the setting value, not
/// 180, unless behavior-under-test forces otherwise").
fn env_optional_secs(key: &str, default_secs: u64) -> Option<Duration> {
    match env::var(key) {
        Ok(v) if v.is_empty() => None,
        Ok(v) => v.parse().ok().map(Duration::from_secs).or(Some(Duration::from_secs(default_secs))),
        Err(_) => Some(Duration::from_secs(default_secs)),
    }
}
