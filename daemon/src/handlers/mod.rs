pub mod host;
pub mod ingredients;
pub mod recipes;
pub mod session;

use std::sync::Arc;

use tracing::debug;

use sous_core::protocol::{self, Command, ServerEvent};

use crate::state::{ClientSender, ConnectionId, HubState};

/// Route a command to its handler. The returned event, if any, is the
/// direct reply to the sending connection; broadcasts happen inside the
/// handlers.
pub async fn dispatch(
    state: &Arc<HubState>,
    conn_id: ConnectionId,
    sender: &ClientSender,
    command: &Command,
) -> Option<ServerEvent> {
    match command.kind.as_str() {
        protocol::CMD_SESSION_CREATE => {
            session::handle_create(state, conn_id, sender, &command.data).await
        }
        protocol::CMD_SESSION_JOIN => {
            session::handle_join(state, conn_id, sender, &command.data).await
        }
        protocol::CMD_INGREDIENTS_ADD => ingredients::handle_add(state, conn_id, &command.data).await,
        protocol::CMD_INGREDIENTS_REMOVE => {
            ingredients::handle_remove(state, conn_id, &command.data).await
        }
        protocol::CMD_INGREDIENTS_BLACKLIST => {
            ingredients::handle_blacklist(state, conn_id, &command.data).await
        }
        protocol::CMD_RECIPES_ADD => recipes::handle_add(state, conn_id, &command.data).await,
        protocol::CMD_RECIPES_VOTE => recipes::handle_vote(state, conn_id, &command.data).await,
        protocol::CMD_RECIPES_REMOVE => recipes::handle_remove(state, conn_id, &command.data).await,
        protocol::CMD_CONTEXT_UPDATE => {
            host::handle_context_update(state, conn_id, &command.data).await
        }
        protocol::CMD_HOST_TRANSFER => host::handle_transfer(state, conn_id, &command.data).await,
        protocol::CMD_HOST_PERMISSIONS => {
            host::handle_permissions(state, conn_id, &command.data).await
        }
        protocol::CMD_SESSION_END => session::handle_end(state, conn_id).await,
        other => {
            debug!("Connection {conn_id} sent unknown command type {other}");
            Some(ServerEvent::Error {
                message: format!("Unknown message type: {other}"),
            })
        }
    }
}
