use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use sous_core::protocol::{
    self, BlacklistParams, IngredientAddParams, IngredientRemoveParams, ServerEvent,
};

use crate::state::{ConnectionId, HubState};

/// Append an ingredient. Duplicate names (case-insensitive) are a silent
/// no-op; the broadcast includes the originator so it can adopt the
/// server-assigned id.
pub async fn handle_add(
    state: &Arc<HubState>,
    conn_id: ConnectionId,
    data: &Value,
) -> Option<ServerEvent> {
    let client = state.client(&conn_id).await?;
    let params: IngredientAddParams = match serde_json::from_value(data.clone()) {
        Ok(p) => p,
        Err(e) => {
            debug!("Invalid ingredients:add payload: {e}");
            return Some(ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            });
        }
    };

    let handle = state.resolve_session(&client.session_id).await?;
    let mut session = handle.lock().await;
    let ingredient = session.add_ingredient(&params.ingredient.name, &params.ingredient.added_by)?;
    session.touch();

    state
        .broadcast_to_session(
            &client.session_id,
            &ServerEvent::IngredientAdded { ingredient },
            None,
        )
        .await;
    None
}

pub async fn handle_remove(
    state: &Arc<HubState>,
    conn_id: ConnectionId,
    data: &Value,
) -> Option<ServerEvent> {
    let client = state.client(&conn_id).await?;
    let params: IngredientRemoveParams = match serde_json::from_value(data.clone()) {
        Ok(p) => p,
        Err(e) => {
            debug!("Invalid ingredients:remove payload: {e}");
            return Some(ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            });
        }
    };

    let handle = state.resolve_session(&client.session_id).await?;
    let mut session = handle.lock().await;
    // removing a missing id is a silent no-op
    let ingredient = session.remove_ingredient(&params.ingredient_id)?;
    session.touch();

    state
        .broadcast_to_session(
            &client.session_id,
            &ServerEvent::IngredientRemoved {
                ingredient_id: params.ingredient_id,
                ingredient,
            },
            None,
        )
        .await;
    None
}

/// Blacklist a name and optionally evict the matching ingredient. The
/// broadcast carries both full arrays; clients replace rather than merge.
pub async fn handle_blacklist(
    state: &Arc<HubState>,
    conn_id: ConnectionId,
    data: &Value,
) -> Option<ServerEvent> {
    let client = state.client(&conn_id).await?;
    let params: BlacklistParams = match serde_json::from_value(data.clone()) {
        Ok(p) => p,
        Err(e) => {
            debug!("Invalid ingredients:blacklist payload: {e}");
            return Some(ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            });
        }
    };

    let handle = state.resolve_session(&client.session_id).await?;
    let mut session = handle.lock().await;
    let name = session.blacklist_ingredient(&params.ingredient_name, params.from_ingredients);
    session.touch();

    state
        .broadcast_to_session(
            &client.session_id,
            &ServerEvent::IngredientBlacklisted {
                ingredient_name: name,
                blacklist: session.blacklist.clone(),
                ingredients: session.ingredients.clone(),
            },
            None,
        )
        .await;
    None
}
