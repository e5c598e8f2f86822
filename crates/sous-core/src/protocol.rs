//! Wire protocol: the inbound command envelope, per-command payloads, and
//! the outbound event schema.
//!
//! Inbound frames are `{"type": <string>, "data": <object>}`; handlers parse
//! `data` into the typed param structs below. Outbound events are a single
//! tagged enum, serialized with the `type` discriminator at the top level and
//! no `data` wrapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::{Ingredient, Participant, Recipe, Session, VoteKind};

/// Inbound command envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Command {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

// Command types
pub const CMD_SESSION_CREATE: &str = "session:create";
pub const CMD_SESSION_JOIN: &str = "session:join";
pub const CMD_INGREDIENTS_ADD: &str = "ingredients:add";
pub const CMD_INGREDIENTS_REMOVE: &str = "ingredients:remove";
pub const CMD_INGREDIENTS_BLACKLIST: &str = "ingredients:blacklist";
pub const CMD_RECIPES_ADD: &str = "recipes:add";
pub const CMD_RECIPES_VOTE: &str = "recipes:vote";
pub const CMD_RECIPES_REMOVE: &str = "recipes:remove";
pub const CMD_CONTEXT_UPDATE: &str = "context:update";
pub const CMD_HOST_TRANSFER: &str = "host:transfer";
pub const CMD_HOST_PERMISSIONS: &str = "host:permissions";
pub const CMD_SESSION_END: &str = "session:end";

// Error messages
pub const ERR_INVALID_MESSAGE: &str = "Invalid message format";
pub const ERR_SESSION_EXISTS: &str = "Session already exists";
pub const ERR_SESSION_NOT_FOUND: &str = "Session not found or expired";
pub const ERR_ALREADY_CONNECTED: &str = "User already connected from another client";
pub const ERR_NOT_HOST_TRANSFER: &str = "Only host can transfer privileges";
pub const ERR_NOT_HOST_PERMISSIONS: &str = "Only host can update permissions";
pub const ERR_NOT_HOST_END: &str = "Only host can end the session";
pub const ERR_HOST_NOT_FOUND: &str = "New host not found in session";
pub const SESSION_ENDED_BY_HOST: &str = "Session ended by host";

// --- Command params ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreateParams {
    pub session_id: String,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionJoinParams {
    pub session_id: String,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientAddParams {
    pub ingredient: IngredientDraft,
}

/// Client-proposed ingredient; a client-chosen id is discarded server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub added_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientRemoveParams {
    pub ingredient_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistParams {
    pub ingredient_name: String,
    #[serde(default)]
    pub from_ingredients: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeAddParams {
    pub recipe: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeVoteParams {
    pub recipe_id: String,
    pub vote_type: VoteKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeRemoveParams {
    pub recipe_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextUpdateParams {
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTransferParams {
    pub new_host_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPermissionsParams {
    pub allow_recipe_generation: bool,
}

// --- Outbound events ---

/// Server→client event. The serialized form carries `type` plus the
/// variant's fields at the top level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "connection:established", rename_all = "camelCase")]
    ConnectionEstablished { connection_id: String },

    #[serde(rename = "session:created")]
    SessionCreated { session: Session },

    #[serde(rename = "session:joined")]
    SessionJoined { session: Session },

    #[serde(rename = "session:error")]
    SessionError { message: String },

    #[serde(rename = "session:expired", rename_all = "camelCase")]
    SessionExpired { session_id: String },

    #[serde(rename = "session:ended")]
    SessionEnded { message: String },

    #[serde(rename = "session:participant:joined")]
    ParticipantJoined { participant: Participant },

    #[serde(rename = "session:participant:disconnected", rename_all = "camelCase")]
    ParticipantDisconnected { user_id: String, username: String },

    #[serde(rename = "ingredients:added")]
    IngredientAdded { ingredient: Ingredient },

    #[serde(rename = "ingredients:removed", rename_all = "camelCase")]
    IngredientRemoved {
        ingredient_id: String,
        ingredient: Ingredient,
    },

    #[serde(rename = "ingredients:blacklisted", rename_all = "camelCase")]
    IngredientBlacklisted {
        ingredient_name: String,
        blacklist: Vec<String>,
        ingredients: Vec<Ingredient>,
    },

    #[serde(rename = "recipes:added")]
    RecipeAdded { recipe: Recipe },

    #[serde(rename = "recipes:voted", rename_all = "camelCase")]
    RecipeVoted {
        recipe_id: String,
        vote_type: VoteKind,
        user_id: String,
        recipes: Vec<Recipe>,
    },

    #[serde(rename = "recipes:removed", rename_all = "camelCase")]
    RecipeRemoved { recipe_id: String, recipe: Recipe },

    #[serde(rename = "context:updated")]
    ContextUpdated { context: String },

    #[serde(rename = "host:transferred", rename_all = "camelCase")]
    HostTransferred {
        new_host_id: String,
        new_host_name: String,
        session: Session,
    },

    #[serde(rename = "host:permissions:updated", rename_all = "camelCase")]
    PermissionsUpdated {
        allow_recipe_generation: bool,
        session: Session,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

/// Discriminant-only view of [`ServerEvent`], used to key subscriber sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConnectionEstablished,
    SessionCreated,
    SessionJoined,
    SessionError,
    SessionExpired,
    SessionEnded,
    ParticipantJoined,
    ParticipantDisconnected,
    IngredientAdded,
    IngredientRemoved,
    IngredientBlacklisted,
    RecipeAdded,
    RecipeVoted,
    RecipeRemoved,
    ContextUpdated,
    HostTransferred,
    PermissionsUpdated,
    Error,
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::ConnectionEstablished { .. } => EventKind::ConnectionEstablished,
            ServerEvent::SessionCreated { .. } => EventKind::SessionCreated,
            ServerEvent::SessionJoined { .. } => EventKind::SessionJoined,
            ServerEvent::SessionError { .. } => EventKind::SessionError,
            ServerEvent::SessionExpired { .. } => EventKind::SessionExpired,
            ServerEvent::SessionEnded { .. } => EventKind::SessionEnded,
            ServerEvent::ParticipantJoined { .. } => EventKind::ParticipantJoined,
            ServerEvent::ParticipantDisconnected { .. } => EventKind::ParticipantDisconnected,
            ServerEvent::IngredientAdded { .. } => EventKind::IngredientAdded,
            ServerEvent::IngredientRemoved { .. } => EventKind::IngredientRemoved,
            ServerEvent::IngredientBlacklisted { .. } => EventKind::IngredientBlacklisted,
            ServerEvent::RecipeAdded { .. } => EventKind::RecipeAdded,
            ServerEvent::RecipeVoted { .. } => EventKind::RecipeVoted,
            ServerEvent::RecipeRemoved { .. } => EventKind::RecipeRemoved,
            ServerEvent::ContextUpdated { .. } => EventKind::ContextUpdated,
            ServerEvent::HostTransferred { .. } => EventKind::HostTransferred,
            ServerEvent::PermissionsUpdated { .. } => EventKind::PermissionsUpdated,
            ServerEvent::Error { .. } => EventKind::Error,
        }
    }
}
