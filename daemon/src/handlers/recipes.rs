use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use sous_core::protocol::{
    self, RecipeAddParams, RecipeRemoveParams, RecipeVoteParams, ServerEvent,
};

use crate::state::{ConnectionId, HubState};

/// Append a recipe. The body is accepted opaquely; the id, timestamp, and
/// tally fields are server-assigned before the broadcast.
pub async fn handle_add(
    state: &Arc<HubState>,
    conn_id: ConnectionId,
    data: &Value,
) -> Option<ServerEvent> {
    let client = state.client(&conn_id).await?;
    let params: RecipeAddParams = match serde_json::from_value(data.clone()) {
        Ok(p) => p,
        Err(e) => {
            debug!("Invalid recipes:add payload: {e}");
            return Some(ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            });
        }
    };

    let handle = state.resolve_session(&client.session_id).await?;
    let mut session = handle.lock().await;
    let recipe = session.add_recipe(params.recipe);
    session.touch();

    state
        .broadcast_to_session(
            &client.session_id,
            &ServerEvent::RecipeAdded { recipe },
            None,
        )
        .await;
    None
}

/// Re-vote on a recipe and broadcast the fully recomputed recipe list.
pub async fn handle_vote(
    state: &Arc<HubState>,
    conn_id: ConnectionId,
    data: &Value,
) -> Option<ServerEvent> {
    let client = state.client(&conn_id).await?;
    let params: RecipeVoteParams = match serde_json::from_value(data.clone()) {
        Ok(p) => p,
        Err(e) => {
            debug!("Invalid recipes:vote payload: {e}");
            return Some(ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            });
        }
    };

    let handle = state.resolve_session(&client.session_id).await?;
    let mut session = handle.lock().await;
    session.record_vote(&client.user_id, &params.recipe_id, params.vote_type);
    session.touch();

    state
        .broadcast_to_session(
            &client.session_id,
            &ServerEvent::RecipeVoted {
                recipe_id: params.recipe_id,
                vote_type: params.vote_type,
                user_id: client.user_id.clone(),
                recipes: session.recipes.clone(),
            },
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
    let params: RecipeRemoveParams = match serde_json::from_value(data.clone()) {
        Ok(p) => p,
        Err(e) => {
            debug!("Invalid recipes:remove payload: {e}");
            return Some(ServerEvent::Error {
                message: protocol::ERR_INVALID_MESSAGE.to_owned(),
            });
        }
    };

    let handle = state.resolve_session(&client.session_id).await?;
    let mut session = handle.lock().await;
    // removing a missing id is a silent no-op
    let recipe = session.remove_recipe(&params.recipe_id)?;
    session.touch();

    state
        .broadcast_to_session(
            &client.session_id,
            &ServerEvent::RecipeRemoved {
                recipe_id: params.recipe_id,
                recipe,
            },
            None,
        )
        .await;
    None
}
