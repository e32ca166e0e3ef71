//! Background sweep that disconnects idle connections.
//!
//! Spawns a tokio task that periodically evicts registry entries whose last
//! application event is older than the configured idle timeout.

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::state::AppState;
use crate::ws::{router, CLOSE_IDLE};

/// Spawn the idle reaper using the `[presence]` settings in `state`.
pub fn spawn_idle_reaper(state: AppState) -> JoinHandle<()> {
    let interval = std::time::Duration::from_secs(state.presence.reap_interval_secs);

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let reaped = reap_idle(&state, Utc::now());
            if reaped > 0 {
                tracing::info!("Idle reaper: disconnected {} idle connections", reaped);
            } else {
                tracing::debug!("Idle reaper: no idle connections");
            }
        }
    })
}

/// Evict every connection idle since before `now - idle_timeout`. Returns the count.
///
/// Each eviction removes the registry entry (only if it is still idle), leaves
/// its rooms announcing `user_disconnected`, then closes the socket with 4008.
pub fn reap_idle(state: &AppState, now: DateTime<Utc>) -> usize {
    let threshold = chrono::Duration::seconds(state.presence.idle_timeout_secs as i64);
    let cutoff = now - threshold;
    let mut reaped = 0;

    for candidate in state.connections.idle_since(cutoff) {
        // Superseded or touched since the snapshot: leave it alone
        let Some(stale) = state
            .connections
            .remove_if_idle(&candidate.user_id, candidate.id, cutoff)
        else {
            continue;
        };

        let outbounds = router::handle_departure(state, &stale);
        router::deliver(state, &stale, outbounds);
        stale.close(CLOSE_IDLE, "Idle timeout");
        reaped += 1;
        tracing::info!(
            user_id = %stale.user_id,
            connection_id = %stale.id,
            idle_since = %stale.last_activity,
            "Reaped idle connection"
        );
    }

    reaped
}
