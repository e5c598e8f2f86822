//! Typed WebSocket client for the sous hub.
//!
//! Incoming events are fanned out to a subscriber set keyed by event
//! variant, so a caller can await exactly the events it cares about while
//! ignoring the rest of the stream.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use sous_core::protocol::{
    self, BlacklistParams, Command, ContextUpdateParams, EventKind, HostPermissionsParams,
    HostTransferParams, IngredientAddParams, IngredientDraft, IngredientRemoveParams,
    RecipeAddParams, RecipeRemoveParams, RecipeVoteParams, ServerEvent, SessionCreateParams,
    SessionJoinParams,
};
use sous_core::session::VoteKind;

type SubscriberMap = Arc<Mutex<HashMap<EventKind, Vec<mpsc::UnboundedSender<ServerEvent>>>>>;

/// The close frame observed when the server shuts the connection. Code 1006
/// marks a stream that ended without a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

pub struct HubClient {
    tx: mpsc::UnboundedSender<Message>,
    subscribers: SubscriberMap,
    closed_rx: watch::Receiver<Option<CloseInfo>>,
}

impl HubClient {
    /// Connect to the hub and start the event pump.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .context("failed to connect to hub")?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if ws_tx.send(msg).await.is_err() {
                    break;
                }
            }
            // channel gone (client dropped): say goodbye so the server
            // observes a disconnect rather than a half-open socket
            let _ = ws_tx.send(Message::Close(None)).await;
            let _ = ws_tx.close().await;
        });

        let subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));
        let (closed_tx, closed_rx) = watch::channel::<Option<CloseInfo>>(None);

        let pump = subscribers.clone();
        tokio::spawn(async move {
            while let Some(frame) = ws_rx.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => route_event(&pump, event).await,
                        Err(e) => tracing::debug!("Ignoring unrecognized event: {e}"),
                    },
                    Ok(Message::Close(frame)) => {
                        let info = frame
                            .map(|f| CloseInfo {
                                code: f.code.into(),
                                reason: f.reason.into_owned(),
                            })
                            .unwrap_or(CloseInfo {
                                code: 1005,
                                reason: String::new(),
                            });
                        let _ = closed_tx.send(Some(info));
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            closed_tx.send_if_modified(|current| {
                if current.is_none() {
                    *current = Some(CloseInfo {
                        code: 1006,
                        reason: String::new(),
                    });
                    true
                } else {
                    false
                }
            });
        });

        Ok(Self {
            tx,
            subscribers,
            closed_rx,
        })
    }

    /// Receive every subsequent event of one kind.
    pub async fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .await
            .entry(kind)
            .or_default()
            .push(tx);
        rx
    }

    /// Block until the server closes the connection.
    pub async fn wait_close(&mut self) -> Option<CloseInfo> {
        loop {
            if let Some(info) = self.closed_rx.borrow().clone() {
                return Some(info);
            }
            if self.closed_rx.changed().await.is_err() {
                return self.closed_rx.borrow().clone();
            }
        }
    }

    /// The close frame, if one has been observed yet.
    pub fn close_info(&self) -> Option<CloseInfo> {
        self.closed_rx.borrow().clone()
    }

    /// Send a raw text frame, bypassing the typed command builders.
    pub fn send_raw(&self, text: &str) -> Result<()> {
        self.tx
            .send(Message::Text(text.to_owned()))
            .map_err(|_| anyhow::anyhow!("connection closed"))
    }

    fn send_command<T: serde::Serialize>(&self, kind: &str, params: T) -> Result<()> {
        let command = Command::new(kind, serde_json::to_value(params)?);
        let json = serde_json::to_string(&command)?;
        self.tx
            .send(Message::Text(json))
            .map_err(|_| anyhow::anyhow!("connection closed"))
    }

    pub fn create_session(&self, session_id: &str, user_id: &str, username: &str) -> Result<()> {
        self.send_command(
            protocol::CMD_SESSION_CREATE,
            SessionCreateParams {
                session_id: session_id.to_owned(),
                user_id: user_id.to_owned(),
                username: username.to_owned(),
            },
        )
    }

    pub fn join_session(&self, session_id: &str, user_id: &str, username: &str) -> Result<()> {
        self.send_command(
            protocol::CMD_SESSION_JOIN,
            SessionJoinParams {
                session_id: session_id.to_owned(),
                user_id: user_id.to_owned(),
                username: username.to_owned(),
            },
        )
    }

    pub fn add_ingredient(&self, name: &str, added_by: &str) -> Result<()> {
        self.send_command(
            protocol::CMD_INGREDIENTS_ADD,
            IngredientAddParams {
                ingredient: IngredientDraft {
                    id: None,
                    name: name.to_owned(),
                    added_by: added_by.to_owned(),
                },
            },
        )
    }

    pub fn remove_ingredient(&self, ingredient_id: &str) -> Result<()> {
        self.send_command(
            protocol::CMD_INGREDIENTS_REMOVE,
            IngredientRemoveParams {
                ingredient_id: ingredient_id.to_owned(),
            },
        )
    }

    pub fn blacklist_ingredient(&self, name: &str, from_ingredients: bool) -> Result<()> {
        self.send_command(
            protocol::CMD_INGREDIENTS_BLACKLIST,
            BlacklistParams {
                ingredient_name: name.to_owned(),
                from_ingredients,
            },
        )
    }

    pub fn add_recipe(&self, recipe: serde_json::Value) -> Result<()> {
        self.send_command(protocol::CMD_RECIPES_ADD, RecipeAddParams { recipe })
    }

    pub fn vote_recipe(&self, recipe_id: &str, vote: VoteKind) -> Result<()> {
        self.send_command(
            protocol::CMD_RECIPES_VOTE,
            RecipeVoteParams {
                recipe_id: recipe_id.to_owned(),
                vote_type: vote,
            },
        )
    }

    pub fn remove_recipe(&self, recipe_id: &str) -> Result<()> {
        self.send_command(
            protocol::CMD_RECIPES_REMOVE,
            RecipeRemoveParams {
                recipe_id: recipe_id.to_owned(),
            },
        )
    }

    pub fn update_context(&self, context: &str) -> Result<()> {
        self.send_command(
            protocol::CMD_CONTEXT_UPDATE,
            ContextUpdateParams {
                context: context.to_owned(),
            },
        )
    }

    pub fn transfer_host(&self, new_host_id: &str) -> Result<()> {
        self.send_command(
            protocol::CMD_HOST_TRANSFER,
            HostTransferParams {
                new_host_id: new_host_id.to_owned(),
            },
        )
    }

    pub fn set_permissions(&self, allow_recipe_generation: bool) -> Result<()> {
        self.send_command(
            protocol::CMD_HOST_PERMISSIONS,
            HostPermissionsParams {
                allow_recipe_generation,
            },
        )
    }

    pub fn end_session(&self) -> Result<()> {
        self.send_command(protocol::CMD_SESSION_END, json!({}))
    }
}

/// Deliver an event to every subscriber of its kind, pruning closed ones.
async fn route_event(subscribers: &SubscriberMap, event: ServerEvent) {
    let kind = event.kind();
    let mut map = subscribers.lock().await;
    if let Some(subs) = map.get_mut(&kind) {
        subs.retain(|sub| sub.send(event.clone()).is_ok());
    }
}
