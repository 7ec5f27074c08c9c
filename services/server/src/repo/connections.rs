//! Persisted `Connection` repository (spec component M, §3, §6). Written
//! only from workers, never from session tasks, so session tasks stay
//! non-blocking on the DB (spec §5).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

pub struct ConnectionRow {
    pub user_pk: i64,
    pub channel_name: String,
    pub online: bool,
    pub awol: bool,
    pub online_at: Option<DateTime<Utc>>,
    pub offline_at: Option<DateTime<Utc>>,
    pub last_action: Option<DateTime<Utc>>,
}

/// `consumer_connected` housekeeping: create the row with `online=true`.
pub async fn mark_online(pool: &PgPool, user_pk: i64, channel_name: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO connections (user_pk, channel_name, online, awol, online_at, last_action)
           VALUES ($1, $2, TRUE, FALSE, now(), now())
           ON CONFLICT (user_pk, channel_name)
           DO UPDATE SET online = TRUE, awol = FALSE, online_at = now(), offline_at = NULL, last_action = now()"#,
    )
    .bind(user_pk)
    .bind(channel_name)
    .execute(pool)
    .await?;
    Ok(())
}

/// `consumer_closed` housekeeping: mark offline and record the close code.
pub async fn mark_offline(
    pool: &PgPool,
    user_pk: i64,
    channel_name: &str,
    close_code: Option<i32>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE connections SET online = FALSE, offline_at = now(), close_code = $3
           WHERE user_pk = $1 AND channel_name = $2"#,
    )
    .bind(user_pk)
    .bind(channel_name)
    .bind(close_code)
    .execute(pool)
    .await?;
    Ok(())
}

/// Throttled `last_action` update, enqueued when
/// `now - last_job > connection_update_interval` (spec §4.8).
pub async fn touch_last_action(pool: &PgPool, user_pk: i64, channel_name: &str) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE connections SET last_action = now() WHERE user_pk = $1 AND channel_name = $2"#)
        .bind(user_pk)
        .bind(channel_name)
        .execute(pool)
        .await?;
    Ok(())
}

/// Rows online but with no live session for longer than the AWOL threshold
/// — target set for the `handle-awol` management command (spec §1, §9;
/// ported from the Python source's `handle_awol` command).
pub async fn find_awol(pool: &PgPool, stale_after: chrono::Duration) -> Result<Vec<ConnectionRow>, sqlx::Error> {
    let cutoff = Utc::now() - stale_after;
    let rows = sqlx::query(
        r#"SELECT user_pk, channel_name, online, awol, online_at, offline_at, last_action
           FROM connections
           WHERE online = TRUE AND awol = FALSE AND COALESCE(last_action, online_at) < $1"#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| ConnectionRow {
            user_pk: r.get("user_pk"),
            channel_name: r.get("channel_name"),
            online: r.get("online"),
            awol: r.get("awol"),
            online_at: r.get("online_at"),
            offline_at: r.get("offline_at"),
            last_action: r.get("last_action"),
        })
        .collect())
}

pub async fn mark_awol(pool: &PgPool, user_pk: i64, channel_name: &str) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE connections SET awol = TRUE, online = FALSE WHERE user_pk = $1 AND channel_name = $2"#)
        .bind(user_pk)
        .bind(channel_name)
        .execute(pool)
        .await?;
    Ok(())
}
