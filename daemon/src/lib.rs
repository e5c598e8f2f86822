//! Sous hub daemon: an authoritative in-memory server that lets a small
//! group of participants share a session document over WebSocket
//! connections.

pub mod config;
pub mod connection;
pub mod handlers;
pub mod reaper;
pub mod state;

use std::io;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::error;

use state::HubState;

/// Accept connections forever, driving each socket on its own task.
pub async fn serve(listener: TcpListener, state: Arc<HubState>) -> io::Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    connection::handle_socket(stream, addr, state).await;
                });
            }
            Err(e) => {
                error!("Accept error: {e}");
            }
        }
    }
}
