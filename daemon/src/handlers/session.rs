use std::sync::Arc;

use serde_json::Value;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use sous_core::protocol::{self, ServerEvent, SessionCreateParams, SessionJoinParams};
use sous_core::session::Session;

use crate::state::{ClientSender, ConnectionId, HubState};

pub async fn handle_create(
    state: &Arc<HubState>,
    conn_id: ConnectionId,
    sender: &ClientSender,
    data: &Value,
) -> Option<ServerEvent> {
    let params: SessionCreateParams = match serde_json::from_value(data.clone()) {
        Ok(p) => p,
        Err(e) => {
            debug!("Invalid session:create payload: {e}");
            return Some(ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            });
        }
    };

    if let Some(handle) = state.resolve_session(&params.session_id).await {
        let mut session = handle.lock().await;

        if session.host_id != params.user_id {
            return Some(ServerEvent::SessionError {
                message: protocol::ERR_SESSION_EXISTS.to_owned(),
            });
        }

        // Host rejoin: adopt this connection, even if an older one lingers.
        let participant = session.upsert_participant(&params.user_id, &params.username);
        session.touch();
        state
            .register(
                conn_id,
                &params.user_id,
                &params.session_id,
                &params.username,
                sender.clone(),
            )
            .await;
        state
            .broadcast_to_session(
                &params.session_id,
                &ServerEvent::ParticipantJoined { participant },
                Some(&params.user_id),
            )
            .await;
        info!("Host {} rejoined session {}", params.user_id, params.session_id);
        return Some(ServerEvent::SessionCreated {
            session: session.clone(),
        });
    }

    let session = Session::new(&params.session_id, &params.user_id, &params.username);
    let snapshot = session.clone();
    state.insert_session(session).await;
    state
        .register(
            conn_id,
            &params.user_id,
            &params.session_id,
            &params.username,
            sender.clone(),
        )
        .await;
    info!("Session {} created by {}", params.session_id, params.user_id);
    Some(ServerEvent::SessionCreated { session: snapshot })
}

pub async fn handle_join(
    state: &Arc<HubState>,
    conn_id: ConnectionId,
    sender: &ClientSender,
    data: &Value,
) -> Option<ServerEvent> {
    let params: SessionJoinParams = match serde_json::from_value(data.clone()) {
        Ok(p) => p,
        Err(e) => {
            debug!("Invalid session:join payload: {e}");
            return Some(ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            });
        }
    };

    let Some(handle) = state.resolve_session(&params.session_id).await else {
        return Some(ServerEvent::SessionError {
            message: protocol::ERR_SESSION_NOT_FOUND.to_owned(),
        });
    };

    if let Some(existing) = state.connection_for_user(&params.user_id).await {
        if existing != conn_id {
            return Some(ServerEvent::SessionError {
                message: protocol::ERR_ALREADY_CONNECTED.to_owned(),
            });
        }
    }

    let mut session = handle.lock().await;
    let participant = session.upsert_participant(&params.user_id, &params.username);
    session.touch();
    state
        .register(
            conn_id,
            &params.user_id,
            &params.session_id,
            &params.username,
            sender.clone(),
        )
        .await;
    state
        .broadcast_to_session(
            &params.session_id,
            &ServerEvent::ParticipantJoined { participant },
            Some(&params.user_id),
        )
        .await;
    info!("{} joined session {}", params.user_id, params.session_id);
    Some(ServerEvent::SessionJoined {
        session: session.clone(),
    })
}

/// Host-only. Broadcasts the terminal event, deletes the session, then
/// closes every connection that was bound to it.
pub async fn handle_end(state: &Arc<HubState>, conn_id: ConnectionId) -> Option<ServerEvent> {
    let client = state.client(&conn_id).await?;
    let handle = state.resolve_session(&client.session_id).await?;

    {
        let session = handle.lock().await;
        if session.host_id != client.user_id {
            return Some(ServerEvent::Error {
                message: protocol::ERR_NOT_HOST_END.to_owned(),
            });
        }
    }

    info!("Host {} ended session {}", client.user_id, client.session_id);
    state
        .broadcast_to_session(
            &client.session_id,
            &ServerEvent::SessionEnded {
                message: protocol::SESSION_ENDED_BY_HOST.to_owned(),
            },
            None,
        )
        .await;
    state.remove_session(&client.session_id).await;

    for peer in state.purge_session(&client.session_id).await {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: protocol::SESSION_ENDED_BY_HOST.into(),
        };
        let _ = peer.sender.send(Message::Close(Some(frame)));
    }
    None
}

/// Transport-initiated teardown: the socket is gone, the participant record
/// stays on the session.
pub async fn handle_disconnect(state: &Arc<HubState>, conn_id: ConnectionId) {
    let Some(client) = state.unregister(&conn_id).await else {
        return;
    };
    info!(
        "{} disconnected from session {}",
        client.user_id, client.session_id
    );

    let Some(handle) = state.resolve_session(&client.session_id).await else {
        return;
    };
    let mut session = handle.lock().await;
    if session.mark_disconnected(&client.user_id) {
        // this connection is already unregistered, so no exclusion is needed
        state
            .broadcast_to_session(
                &client.session_id,
                &ServerEvent::ParticipantDisconnected {
                    user_id: client.user_id.clone(),
                    username: client.username.clone(),
                },
                None,
            )
            .await;
    }
}
