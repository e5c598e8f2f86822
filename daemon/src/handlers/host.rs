use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use sous_core::protocol::{
    self, ContextUpdateParams, HostPermissionsParams, HostTransferParams, ServerEvent,
};

use crate::state::{ConnectionId, HubState};

/// Host-only. A non-host caller is dropped silently, with no error event;
/// the successful broadcast skips the host, whose UI already holds the
/// value it sent.
pub async fn handle_context_update(
    state: &Arc<HubState>,
    conn_id: ConnectionId,
    data: &Value,
) -> Option<ServerEvent> {
    let client = state.client(&conn_id).await?;
    let params: ContextUpdateParams = match serde_json::from_value(data.clone()) {
        Ok(p) => p,
        Err(e) => {
            debug!("Invalid context:update payload: {e}");
            return Some(ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            });
        }
    };

    let handle = state.resolve_session(&client.session_id).await?;
    let mut session = handle.lock().await;
    if session.host_id != client.user_id {
        debug!(
            "Ignoring context update from non-host {} in session {}",
            client.user_id, client.session_id
        );
        return None;
    }

    session.context = params.context.clone();
    session.touch();

    state
        .broadcast_to_session(
            &client.session_id,
            &ServerEvent::ContextUpdated {
                context: params.context,
            },
            Some(&client.user_id),
        )
        .await;
    None
}

pub async fn handle_transfer(
    state: &Arc<HubState>,
    conn_id: ConnectionId,
    data: &Value,
) -> Option<ServerEvent> {
    let client = state.client(&conn_id).await?;
    let params: HostTransferParams = match serde_json::from_value(data.clone()) {
        Ok(p) => p,
        Err(e) => {
            debug!("Invalid host:transfer payload: {e}");
            return Some(ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            });
        }
    };

    let handle = state.resolve_session(&client.session_id).await?;
    let mut session = handle.lock().await;
    if session.host_id != client.user_id {
        return Some(ServerEvent::Error {
            message: protocol::ERR_NOT_HOST_TRANSFER.to_owned(),
        });
    }

    let Some((new_host_id, new_host_name)) = session.transfer_host(&params.new_host_id) else {
        return Some(ServerEvent::Error {
            message: protocol::ERR_HOST_NOT_FOUND.to_owned(),
        });
    };
    session.touch();

    state
        .broadcast_to_session(
            &client.session_id,
            &ServerEvent::HostTransferred {
                new_host_id,
                new_host_name,
                session: session.clone(),
            },
            None,
        )
        .await;
    None
}

pub async fn handle_permissions(
    state: &Arc<HubState>,
    conn_id: ConnectionId,
    data: &Value,
) -> Option<ServerEvent> {
    let client = state.client(&conn_id).await?;
    let params: HostPermissionsParams = match serde_json::from_value(data.clone()) {
        Ok(p) => p,
        Err(e) => {
            debug!("Invalid host:permissions payload: {e}");
            return Some(ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            });
        }
    };

    let handle = state.resolve_session(&client.session_id).await?;
    let mut session = handle.lock().await;
    if session.host_id != client.user_id {
        return Some(ServerEvent::Error {
            message: protocol::ERR_NOT_HOST_PERMISSIONS.to_owned(),
        });
    }

    session.allow_recipe_generation = params.allow_recipe_generation;
    session.touch();

    state
        .broadcast_to_session(
            &client.session_id,
            &ServerEvent::PermissionsUpdated {
                allow_recipe_generation: params.allow_recipe_generation,
                session: session.clone(),
            },
            None,
        )
        .await;
    None
}
