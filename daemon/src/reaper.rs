//! Periodic sweep that deletes sessions idle past their TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use sous_core::protocol::ServerEvent;

use crate::state::HubState;

/// Sweep forever on a fixed interval. Reaped sessions are announced with
/// `session:expired` to any connections still bound to them; those
/// connections stay open and their registry entries are cleared on their
/// next natural disconnect.
pub async fn run(state: Arc<HubState>, interval: Duration) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        sweep(&state).await;
    }
}

/// One pass over the session store.
pub async fn sweep(state: &Arc<HubState>) {
    let expired = state.take_expired_sessions().await;
    if expired.is_empty() {
        debug!("Reaper sweep found nothing to do");
        return;
    }

    for session_id in expired {
        info!("Reaped idle session {session_id}");
        state
            .broadcast_to_session(
                &session_id,
                &ServerEvent::SessionExpired {
                    session_id: session_id.clone(),
                },
                None,
            )
            .await;
    }
}
