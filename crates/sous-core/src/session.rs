//! Authoritative state of one collaborative session.
//!
//! All mutation helpers live here, lock-free and synchronous; the daemon
//! wraps each `Session` in its own async mutex and calls into these methods
//! while holding it.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Current time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A user's stance on a single recipe. `Neutral` is only ever seen on the
/// wire; the vote map stores `Up`/`Down` and represents neutral by absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Up,
    Down,
    Neutral,
}

/// A user who has joined a session. The record survives disconnects and is
/// only dropped with the session itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub joined_at: i64,
    pub is_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnected_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    pub added_by: String,
    pub added_at: i64,
}

/// A recipe with an opaque client-supplied body. The id, timestamp, and
/// tally fields are always server-owned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
    pub created_at: i64,
    pub votes: i64,
    pub voter_ids: Vec<String>,
}

impl Recipe {
    /// Normalize a client-submitted recipe: keep the body as-is, but assign
    /// a fresh id and reset the fields the server recomputes.
    pub fn from_client(raw: Value) -> Self {
        let mut body = match raw {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let title = body
            .remove("title")
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        for key in ["id", "createdAt", "votes", "voterIds"] {
            body.remove(key);
        }
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            body,
            created_at: now_ms(),
            votes: 0,
            voter_ids: Vec::new(),
        }
    }
}

/// The shared document a group of participants collaborates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub host_id: String,
    pub host_name: String,
    pub created_at: i64,
    pub last_activity: i64,
    pub allow_recipe_generation: bool,
    pub participants: Vec<Participant>,
    pub ingredients: Vec<Ingredient>,
    pub blacklist: Vec<String>,
    pub context: String,
    pub recipes: Vec<Recipe>,
    pub votes: HashMap<String, HashMap<String, VoteKind>>,
}

impl Session {
    /// New session with the creator as host and sole (connected) participant.
    pub fn new(id: &str, host_id: &str, host_name: &str) -> Self {
        let now = now_ms();
        Self {
            id: id.to_owned(),
            host_id: host_id.to_owned(),
            host_name: host_name.to_owned(),
            created_at: now,
            last_activity: now,
            allow_recipe_generation: true,
            participants: vec![Participant {
                id: host_id.to_owned(),
                name: host_name.to_owned(),
                joined_at: now,
                is_connected: true,
                reconnected_at: None,
                disconnected_at: None,
            }],
            ingredients: Vec::new(),
            blacklist: Vec::new(),
            context: String::new(),
            recipes: Vec::new(),
            votes: HashMap::new(),
        }
    }

    /// Bump the idle clock. Never moves backwards.
    pub fn touch(&mut self) {
        self.last_activity = self.last_activity.max(now_ms());
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        now_ms() - self.last_activity > ttl.as_millis() as i64
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == user_id)
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participant(user_id).is_some()
    }

    /// Join or rejoin: an existing participant is reconnected, anyone else is
    /// appended. Returns the resulting record for the join announcement.
    pub fn upsert_participant(&mut self, user_id: &str, name: &str) -> Participant {
        if let Some(p) = self.participants.iter_mut().find(|p| p.id == user_id) {
            p.is_connected = true;
            p.reconnected_at = Some(now_ms());
            return p.clone();
        }
        let participant = Participant {
            id: user_id.to_owned(),
            name: name.to_owned(),
            joined_at: now_ms(),
            is_connected: true,
            reconnected_at: None,
            disconnected_at: None,
        };
        self.participants.push(participant.clone());
        participant
    }

    /// Flip a participant to disconnected. Returns false for unknown users.
    pub fn mark_disconnected(&mut self, user_id: &str) -> bool {
        match self.participants.iter_mut().find(|p| p.id == user_id) {
            Some(p) => {
                p.is_connected = false;
                p.disconnected_at = Some(now_ms());
                true
            }
            None => false,
        }
    }

    /// Append an ingredient unless the lowercased name already exists.
    /// Duplicate names are a silent no-op.
    pub fn add_ingredient(&mut self, name: &str, added_by: &str) -> Option<Ingredient> {
        let name = name.to_lowercase();
        if self.ingredients.iter().any(|i| i.name == name) {
            return None;
        }
        let ingredient = Ingredient {
            id: Uuid::new_v4().to_string(),
            name,
            added_by: added_by.to_owned(),
            added_at: now_ms(),
        };
        self.ingredients.push(ingredient.clone());
        Some(ingredient)
    }

    pub fn remove_ingredient(&mut self, ingredient_id: &str) -> Option<Ingredient> {
        let idx = self
            .ingredients
            .iter()
            .position(|i| i.id == ingredient_id)?;
        Some(self.ingredients.remove(idx))
    }

    /// Add a name to the blacklist (if absent) and optionally evict the
    /// matching ingredient. Returns the lowercased name.
    pub fn blacklist_ingredient(&mut self, name: &str, from_ingredients: bool) -> String {
        let name = name.to_lowercase();
        if !self.blacklist.contains(&name) {
            self.blacklist.push(name.clone());
        }
        if from_ingredients {
            self.ingredients.retain(|i| i.name != name);
        }
        name
    }

    pub fn add_recipe(&mut self, raw: Value) -> Recipe {
        let recipe = Recipe::from_client(raw);
        self.recipes.push(recipe.clone());
        recipe
    }

    pub fn remove_recipe(&mut self, recipe_id: &str) -> Option<Recipe> {
        let idx = self.recipes.iter().position(|r| r.id == recipe_id)?;
        Some(self.recipes.remove(idx))
    }

    /// Erase the caller's previous vote on the recipe, apply the new one
    /// (`Neutral` only erases), and recompute every recipe's tally.
    pub fn record_vote(&mut self, user_id: &str, recipe_id: &str, vote: VoteKind) {
        let user_votes = self.votes.entry(user_id.to_owned()).or_default();
        user_votes.remove(recipe_id);
        if vote != VoteKind::Neutral {
            user_votes.insert(recipe_id.to_owned(), vote);
        }
        self.recompute_votes();
    }

    /// Rebuild every recipe's `votes` and `voter_ids` from the vote map.
    fn recompute_votes(&mut self) {
        for recipe in &mut self.recipes {
            let mut tally = 0i64;
            let mut voters = Vec::new();
            for (user_id, user_votes) in &self.votes {
                match user_votes.get(&recipe.id) {
                    Some(VoteKind::Up) => {
                        tally += 1;
                        voters.push(user_id.clone());
                    }
                    Some(VoteKind::Down) => {
                        tally -= 1;
                        voters.push(user_id.clone());
                    }
                    _ => {}
                }
            }
            // stable order regardless of map iteration
            voters.sort();
            recipe.votes = tally;
            recipe.voter_ids = voters;
        }
    }

    /// Hand host privileges to another participant. Returns the new
    /// `(host_id, host_name)` pair, or `None` when the target is unknown.
    pub fn transfer_host(&mut self, new_host_id: &str) -> Option<(String, String)> {
        let name = self.participant(new_host_id)?.name.clone();
        self.host_id = new_host_id.to_owned();
        self.host_name = name.clone();
        Some((self.host_id.clone(), name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn session() -> Session {
        Session::new("S", "U1", "Alice")
    }

    #[test]
    fn new_session_has_connected_host_participant() {
        let s = session();
        assert_eq!(s.host_id, "U1");
        assert_eq!(s.host_name, "Alice");
        assert!(s.is_participant("U1"));
        assert!(s.participant("U1").unwrap().is_connected);
        assert!(s.allow_recipe_generation);
        assert_eq!(s.context, "");
        assert!(s.last_activity >= s.created_at);
    }

    #[test]
    fn upsert_appends_then_reconnects() {
        let mut s = session();
        let bob = s.upsert_participant("U2", "Bob");
        assert_eq!(bob.id, "U2");
        assert_eq!(s.participants.len(), 2);

        assert!(s.mark_disconnected("U2"));
        let p = s.participant("U2").unwrap();
        assert!(!p.is_connected);
        assert!(p.disconnected_at.is_some());

        let again = s.upsert_participant("U2", "Bob");
        assert!(again.is_connected);
        assert!(again.reconnected_at.is_some());
        assert_eq!(s.participants.len(), 2);
    }

    #[test]
    fn mark_disconnected_unknown_user_is_noop() {
        let mut s = session();
        assert!(!s.mark_disconnected("nobody"));
    }

    #[test]
    fn duplicate_ingredient_names_are_suppressed_case_insensitively() {
        let mut s = session();
        let first = s.add_ingredient("Flour", "U1").unwrap();
        assert_eq!(first.name, "flour");
        assert!(s.add_ingredient("FLOUR", "U2").is_none());
        assert!(s.add_ingredient("flour", "U1").is_none());
        assert_eq!(s.ingredients.len(), 1);
        // the original record is untouched
        assert_eq!(s.ingredients[0].added_by, "U1");
    }

    #[test]
    fn add_then_remove_ingredient_restores_prior_state() {
        let mut s = session();
        s.add_ingredient("salt", "U1");
        let before: Vec<String> = s.ingredients.iter().map(|i| i.id.clone()).collect();

        let added = s.add_ingredient("Pepper", "U1").unwrap();
        let removed = s.remove_ingredient(&added.id).unwrap();
        assert_eq!(removed.id, added.id);

        let after: Vec<String> = s.ingredients.iter().map(|i| i.id.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn remove_unknown_ingredient_is_noop() {
        let mut s = session();
        s.add_ingredient("salt", "U1");
        assert!(s.remove_ingredient("missing").is_none());
        assert_eq!(s.ingredients.len(), 1);
    }

    #[test]
    fn blacklist_is_deduplicated_and_evicts_ingredients() {
        let mut s = session();
        s.add_ingredient("Cilantro", "U1");
        s.blacklist_ingredient("CILANTRO", true);
        s.blacklist_ingredient("cilantro", true);

        assert_eq!(s.blacklist, vec!["cilantro".to_string()]);
        assert!(s.ingredients.is_empty());
        // disjointness after the mutation commits
        assert!(!s.ingredients.iter().any(|i| s.blacklist.contains(&i.name)));
    }

    #[test]
    fn blacklist_without_eviction_keeps_other_ingredients() {
        let mut s = session();
        s.add_ingredient("salt", "U1");
        s.blacklist_ingredient("peanuts", false);
        assert_eq!(s.blacklist, vec!["peanuts".to_string()]);
        assert_eq!(s.ingredients.len(), 1);
    }

    #[test]
    fn recipe_normalization_overwrites_client_fields() {
        let mut s = session();
        let recipe = s.add_recipe(json!({
            "id": "client-chosen",
            "title": "Cake",
            "votes": 99,
            "voterIds": ["ghost"],
            "createdAt": 1,
            "steps": ["mix", "bake"],
        }));
        assert_ne!(recipe.id, "client-chosen");
        assert_eq!(recipe.title, "Cake");
        assert_eq!(recipe.votes, 0);
        assert!(recipe.voter_ids.is_empty());
        assert_eq!(recipe.body["steps"], json!(["mix", "bake"]));
        assert!(recipe.body.get("id").is_none());
        assert!(recipe.body.get("votes").is_none());
    }

    #[test]
    fn vote_tallies_recompute_across_users() {
        let mut s = session();
        s.upsert_participant("U2", "Bob");
        let recipe = s.add_recipe(json!({"title": "Pancakes"}));

        s.record_vote("U1", &recipe.id, VoteKind::Up);
        assert_eq!(s.recipes[0].votes, 1);
        assert_eq!(s.recipes[0].voter_ids, vec!["U1".to_string()]);

        s.record_vote("U2", &recipe.id, VoteKind::Down);
        assert_eq!(s.recipes[0].votes, 0);
        assert_eq!(
            s.recipes[0].voter_ids,
            vec!["U1".to_string(), "U2".to_string()]
        );

        s.record_vote("U1", &recipe.id, VoteKind::Neutral);
        assert_eq!(s.recipes[0].votes, -1);
        assert_eq!(s.recipes[0].voter_ids, vec!["U2".to_string()]);
    }

    #[test]
    fn up_then_neutral_restores_prior_tally() {
        let mut s = session();
        let recipe = s.add_recipe(json!({"title": "Soup"}));
        let before = (s.recipes[0].votes, s.recipes[0].voter_ids.clone());

        s.record_vote("U1", &recipe.id, VoteKind::Up);
        s.record_vote("U1", &recipe.id, VoteKind::Neutral);

        assert_eq!((s.recipes[0].votes, s.recipes[0].voter_ids.clone()), before);
    }

    #[test]
    fn revoting_replaces_the_previous_vote() {
        let mut s = session();
        let recipe = s.add_recipe(json!({"title": "Stew"}));
        s.record_vote("U1", &recipe.id, VoteKind::Up);
        s.record_vote("U1", &recipe.id, VoteKind::Down);
        assert_eq!(s.recipes[0].votes, -1);
        assert_eq!(s.recipes[0].voter_ids, vec!["U1".to_string()]);
    }

    #[test]
    fn vote_on_unknown_recipe_leaves_tallies_alone() {
        let mut s = session();
        s.add_recipe(json!({"title": "Bread"}));
        s.record_vote("U1", "no-such-recipe", VoteKind::Up);
        assert_eq!(s.recipes[0].votes, 0);
        assert!(s.recipes[0].voter_ids.is_empty());
    }

    #[test]
    fn transfer_host_requires_membership() {
        let mut s = session();
        assert!(s.transfer_host("U2").is_none());
        assert_eq!(s.host_id, "U1");

        s.upsert_participant("U2", "Bob");
        let (id, name) = s.transfer_host("U2").unwrap();
        assert_eq!(id, "U2");
        assert_eq!(name, "Bob");
        assert!(s.is_participant(s.host_id.as_str()));
    }

    #[test]
    fn self_transfer_is_accepted_and_state_invariant() {
        let mut s = session();
        let before = (s.host_id.clone(), s.host_name.clone());
        let (id, name) = s.transfer_host("U1").unwrap();
        assert_eq!((id, name), before);
        assert_eq!(s.host_id, before.0);
        assert_eq!(s.host_name, before.1);
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut s = session();
        let future = now_ms() + 60_000;
        s.last_activity = future;
        s.touch();
        assert_eq!(s.last_activity, future);
    }

    #[test]
    fn expiry_respects_ttl() {
        let mut s = session();
        assert!(!s.is_expired(Duration::from_secs(1)));
        s.last_activity = now_ms() - 5_000;
        assert!(s.is_expired(Duration::from_secs(1)));
        assert!(!s.is_expired(Duration::from_secs(60)));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let s = session();
        let value = serde_json::to_value(&s).expect("snapshot to serialize");
        assert!(value.get("hostId").is_some());
        assert!(value.get("hostName").is_some());
        assert!(value.get("lastActivity").is_some());
        assert!(value.get("allowRecipeGeneration").is_some());
        let p = &value["participants"][0];
        assert!(p.get("isConnected").is_some());
        assert!(p.get("joinedAt").is_some());
        // unset reconnect markers stay off the wire
        assert!(p.get("reconnectedAt").is_none());
    }

    proptest! {
        #[test]
        fn recompute_matches_formula(
            ops in prop::collection::vec(
                (0usize..4, 0usize..3, prop_oneof![
                    Just(VoteKind::Up),
                    Just(VoteKind::Down),
                    Just(VoteKind::Neutral),
                ]),
                0..40,
            )
        ) {
            let users = ["U1", "U2", "U3", "U4"];
            let mut s = Session::new("S", "U1", "Alice");
            let ids: Vec<String> = (0..3)
                .map(|i| s.add_recipe(json!({"title": format!("r{i}")})).id)
                .collect();

            for (user, recipe, vote) in ops {
                s.record_vote(users[user], &ids[recipe], vote);
            }

            for recipe in &s.recipes {
                let ups = s.votes.values()
                    .filter(|v| v.get(&recipe.id) == Some(&VoteKind::Up))
                    .count() as i64;
                let downs = s.votes.values()
                    .filter(|v| v.get(&recipe.id) == Some(&VoteKind::Down))
                    .count() as i64;
                prop_assert_eq!(recipe.votes, ups - downs);
                prop_assert_eq!(recipe.voter_ids.len() as i64, ups + downs);
            }
        }

        #[test]
        fn ingredient_names_stay_unique(
            names in prop::collection::vec("[a-dA-D]{1,3}", 0..30)
        ) {
            let mut s = Session::new("S", "U1", "Alice");
            for name in &names {
                s.add_ingredient(name, "U1");
            }
            let mut seen: Vec<&str> = s.ingredients.iter().map(|i| i.name.as_str()).collect();
            seen.sort_unstable();
            let len = seen.len();
            seen.dedup();
            prop_assert_eq!(len, seen.len());
        }
    }
}
