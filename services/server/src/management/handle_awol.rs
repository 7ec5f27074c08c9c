//! `handle-awol` management command: mark connections online with no
//! recent `last_action` as AWOL. Ported from the Python source's
//! `handle_awol` command (spec §9 supplement) — same 10-minute default
//! threshold, run as a one-shot CLI subcommand instead of a cron job.

use sqlx::PgPool;

use crate::jobs::housekeeping::DEFAULT_AWOL_THRESHOLD;
use crate::repo::connections;

pub async fn run(pool: &PgPool) {
    let threshold = chrono::Duration::from_std(DEFAULT_AWOL_THRESHOLD).expect("threshold fits in chrono::Duration");
    let stale = connections::find_awol(pool, threshold).await.expect("failed to query AWOL connections");

    if stale.is_empty() {
        tracing::info!("no AWOL connections found");
        return;
    }

    tracing::info!(count = stale.len(), "marking connections as AWOL");
    for row in &stale {
        if let Err(err) = connections::mark_awol(pool, row.user_pk, &row.channel_name).await {
            tracing::warn!(%err, user_pk = row.user_pk, channel_name = %row.channel_name, "failed to mark connection AWOL");
        }
    }
}
