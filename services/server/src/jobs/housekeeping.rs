//! Housekeeping jobs (spec §4.8): not message-bound, triggered directly by
//! session lifecycle events rather than decoded from a wire frame. Each has
//! a configurable queue name; if unconfigured, the housekeeping is skipped
//! rather than treated as an error.

use std::time::{Duration, Instant};

use envelope_core::signals::ListenerShape;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::config::EnvelopeConfig;
use crate::repo::connections;
use crate::signals::{ConnectionClosedEvent, ConnectionCreatedEvent, SignalBus};

/// Fired on `consumer_connected`: records the connection row, then fires
/// `connection_created` once the write has landed (spec §6) so listeners
/// see a connection that is actually persisted.
pub async fn on_connected(pool: &PgPool, config: &EnvelopeConfig, signals: &SignalBus, user_pk: i64, channel_name: &str) {
    if config.connections_queue.is_none() {
        return;
    }
    if let Err(err) = connections::mark_online(pool, user_pk, channel_name).await {
        tracing::warn!(%err, "failed to record connection online");
        return;
    }
    tracing::debug!(signal = ?envelope_core::signals::SignalKind::ConnectionCreated, %channel_name, "connection created");
    signals.connection_created.fire(
        &ConnectionCreatedEvent { user_pk, channel_name: channel_name.to_owned() },
        ListenerShape::Blocking,
    );
}

/// Fired on `consumer_closed`.
pub async fn on_closed(
    pool: &PgPool,
    config: &EnvelopeConfig,
    signals: &SignalBus,
    user_pk: i64,
    channel_name: &str,
    close_code: Option<u16>,
) {
    if config.connections_queue.is_none() {
        return;
    }
    let code = close_code.map(i32::from);
    if let Err(err) = connections::mark_offline(pool, user_pk, channel_name, code).await {
        tracing::warn!(%err, "failed to record connection offline");
        return;
    }
    tracing::debug!(signal = ?envelope_core::signals::SignalKind::ConnectionClosed, %channel_name, "connection closed");
    signals.connection_closed.fire(
        &ConnectionClosedEvent { user_pk, channel_name: channel_name.to_owned() },
        ListenerShape::Blocking,
    );
}

/// Throttles the `last_action` update to at most once per
/// `connection_update_interval` per session (spec §4.8, §9). One instance
/// lives per `ConsumerSession`.
pub struct LastActionThrottle {
    last_job: Mutex<Option<Instant>>,
}

impl Default for LastActionThrottle {
    fn default() -> Self {
        LastActionThrottle { last_job: Mutex::new(None) }
    }
}

impl LastActionThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on every incoming message; enqueues (here: runs inline,
    /// fire-and-forget) a `last_action` update if the interval has elapsed
    /// and the timestamp queue is configured.
    pub async fn maybe_touch(&self, pool: &PgPool, config: &EnvelopeConfig, user_pk: i64, channel_name: &str) {
        let Some(interval) = config.connection_update_interval else { return };
        if config.timestamp_queue.is_none() {
            return;
        }
        let due = {
            let mut last = self.last_job.lock().await;
            let due = last.map(|t| t.elapsed() >= interval).unwrap_or(true);
            if due {
                *last = Some(Instant::now());
            }
            due
        };
        if due {
            if let Err(err) = connections::touch_last_action(pool, user_pk, channel_name).await {
                tracing::warn!(%err, "failed to throttle-update last_action");
            }
        }
    }
}

/// Matches the original `handle_awol` management command's 10-minute
/// threshold (spec §9 supplement).
pub const DEFAULT_AWOL_THRESHOLD: Duration = Duration::from_secs(600);
