use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};
use uuid::Uuid;

use sous_core::protocol::{self, Command, ServerEvent};

use crate::handlers;
use crate::state::{send_event, ClientSender, ConnectionId, HubState};

/// Drive one client socket from handshake to disconnect.
pub async fn handle_socket(stream: TcpStream, addr: SocketAddr, state: Arc<HubState>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("WebSocket handshake with {addr} failed: {e}");
            return;
        }
    };

    let conn_id: ConnectionId = Uuid::new_v4();
    info!("Client connected: {addr} (connection {conn_id})");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Write task: drains the outbound channel into the sink. A Close frame
    // is forwarded and ends the task.
    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_tx.send(msg).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
    });

    send_event(
        &tx,
        &ServerEvent::ConnectionEstablished {
            connection_id: conn_id.to_string(),
        },
    );

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                process_frame(&text, &state, conn_id, &tx).await;
            }
            Ok(Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data) {
                    process_frame(&text, &state, conn_id, &tx).await;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(_)) => {
                debug!("Connection {conn_id} requested close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Connection {conn_id} transport error: {e}");
                break;
            }
        }
    }

    handlers::session::handle_disconnect(&state, conn_id).await;
    drop(tx);
    let _ = write_task.await;
    info!("Client disconnected: {addr} (connection {conn_id})");
}

/// Parse one text frame and dispatch it. Malformed frames get a non-fatal
/// error event; the connection stays up.
async fn process_frame(text: &str, state: &Arc<HubState>, conn_id: ConnectionId, tx: &ClientSender) {
    let command: Command = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            debug!("Connection {conn_id} sent an unparseable frame: {e}");
            send_event(
                tx,
                &ServerEvent::Error {
                    message: protocol::ERR_INVALID_MESSAGE.to_owned(),
                },
            );
            return;
        }
    };

    if command.kind.is_empty() {
        send_event(
            tx,
            &ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            },
        );
        return;
    }

    if let Some(reply) = handlers::dispatch(state, conn_id, tx, &command).await {
        send_event(tx, &reply);
    }
}
