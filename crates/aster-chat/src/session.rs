//! Per-user conversation state.
//!
//! Each user id owns one [`Session`] holding bounded turn history, the
//! current conversational context, remembered entities, flags, preferences,
//! and the progress of any multi-step flows. Sessions are created lazily
//! and purged after a period of inactivity.
//!
//! The store is shared across callers. Different users never block each
//! other beyond a brief map lookup, while operations on the same user are
//! serialized through a per-session mutex so concurrent turns see
//! consistent history and flow progress.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{Entities, EntityKind, EntityMatch, FlowState, HistoryEntry};

/// Well-known flag names.
pub mod flags {
    /// The user asked for a human agent.
    pub const NEEDS_HUMAN: &str = "needs_human";
    /// The last message could not be classified.
    pub const HAS_PENDING_QUERY: &str = "has_pending_query";
    /// No turn has been completed yet.
    pub const IS_NEW_USER: &str = "is_new_user";
}

// =============================================================================
// Session
// =============================================================================

/// State tracked for a single user.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub history: VecDeque<HistoryEntry>,
    #[serde(skip)]
    history_limit: usize,
    pub current_context: Option<String>,
    pub context_data: BTreeMap<String, Value>,
    pub entity_memory: Entities,
    pub preferences: BTreeMap<String, Value>,
    pub flags: BTreeMap<String, bool>,
    /// Most recent classified intent. Turns answered by a flow leave it alone.
    pub last_intent: Option<String>,
    pub active_flows: Vec<String>,
    pub flow_states: BTreeMap<String, FlowState>,
}

impl Session {
    /// A fresh session. Every flag starts cleared except `is_new_user`.
    pub fn new(history_limit: usize) -> Self {
        let now = Utc::now();
        let initial_flags = BTreeMap::from([
            (flags::NEEDS_HUMAN.to_string(), false),
            (flags::HAS_PENDING_QUERY.to_string(), false),
            (flags::IS_NEW_USER.to_string(), true),
        ]);

        Self {
            session_id: Uuid::new_v4(),
            created_at: now,
            last_active_at: now,
            history: VecDeque::with_capacity(history_limit.min(64)),
            history_limit,
            current_context: None,
            context_data: BTreeMap::new(),
            entity_memory: Entities::new(),
            preferences: BTreeMap::new(),
            flags: initial_flags,
            last_intent: None,
            active_flows: Vec::new(),
            flow_states: BTreeMap::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    /// Record a turn, evicting the oldest entries beyond the history limit.
    pub fn push_history(&mut self, user_message: &str, bot_response: &str) {
        self.history.push_back(HistoryEntry {
            timestamp: Utc::now(),
            user_message: user_message.to_string(),
            bot_response: bot_response.to_string(),
        });
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    // ---- context ----

    /// Replace the current context. `data` is kept under the context's name
    /// and outlives the context itself.
    pub fn set_context(&mut self, context: Option<&str>, data: Option<Value>) {
        self.current_context = context.map(str::to_string);
        if let (Some(name), Some(data)) = (context, data) {
            self.context_data.insert(name.to_string(), data);
        }
    }

    pub fn context(&self) -> Option<&str> {
        self.current_context.as_deref()
    }

    // ---- entities ----

    pub fn remember_entity(&mut self, kind: EntityKind, value: EntityMatch) {
        self.entity_memory.insert(kind, value);
    }

    pub fn recall_entity(&self, kind: EntityKind) -> Option<&EntityMatch> {
        self.entity_memory.get(&kind)
    }

    // ---- flags and preferences ----

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.flags.insert(name.to_string(), value);
    }

    /// Unknown flags read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn set_preference(&mut self, key: &str, value: Value) {
        self.preferences.insert(key.to_string(), value);
    }

    pub fn preference(&self, key: &str) -> Option<&Value> {
        self.preferences.get(key)
    }

    // ---- flows ----

    /// Activate a flow, make it the current context, and reset its state
    /// to `initial` (or step 0).
    pub fn start_flow(&mut self, name: &str, initial: Option<FlowState>) {
        if !self.is_flow_active(name) {
            self.active_flows.push(name.to_string());
        }
        self.flow_states
            .insert(name.to_string(), initial.unwrap_or_else(FlowState::new));
        self.current_context = Some(name.to_string());
    }

    /// Shallow-merge `update` into the state of an active flow. Updates to
    /// inactive flows are ignored.
    pub fn update_flow_state(&mut self, name: &str, update: FlowState) {
        if !self.is_flow_active(name) {
            debug!(flow = name, "Ignoring state update for inactive flow");
            return;
        }
        self.flow_states
            .entry(name.to_string())
            .or_default()
            .merge(update);
    }

    /// State of a flow; empty when the flow has never been started.
    pub fn flow_state(&self, name: &str) -> FlowState {
        self.flow_states.get(name).cloned().unwrap_or_default()
    }

    /// Deactivate a flow, drop its state, and clear the context if the flow
    /// owned it.
    pub fn end_flow(&mut self, name: &str) {
        self.active_flows.retain(|f| f != name);
        self.flow_states.remove(name);
        if self.current_context.as_deref() == Some(name) {
            self.current_context = None;
        }
    }

    pub fn is_flow_active(&self, name: &str) -> bool {
        self.active_flows.iter().any(|f| f == name)
    }

    // ---- bookkeeping ----

    pub fn set_last_intent(&mut self, intent: &str) {
        self.last_intent = Some(intent.to_string());
    }

    pub fn last_intent(&self) -> Option<&str> {
        self.last_intent.as_deref()
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    pub fn inactive_for(&self) -> Duration {
        Utc::now() - self.last_active_at
    }
}

// =============================================================================
// SessionStore
// =============================================================================

/// Shared map of user id to session.
///
/// Holding the map's read lock for the duration of [`with_session`] means a
/// purge (which takes the write lock) can never remove a session while a
/// turn is mutating it.
///
/// [`with_session`]: SessionStore::with_session
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    history_limit: usize,
}

impl SessionStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            history_limit,
        }
    }

    /// Run `f` with exclusive access to the user's session, creating the
    /// session on first contact. Touches the last-active timestamp.
    ///
    /// `f` must not call back into the store.
    pub fn with_session<R>(&self, user_id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        loop {
            {
                let map = self.read_map();
                if let Some(slot) = map.get(user_id) {
                    let mut session = lock_session(slot);
                    session.touch();
                    return f(&mut session);
                }
            }

            // First contact. A purge may run between releasing the write lock
            // and re-acquiring the read lock, in which case we go round again.
            let mut map = self.write_map();
            map.entry(user_id.to_string()).or_insert_with(|| {
                info!(user_id, "Session created");
                Arc::new(Mutex::new(Session::new(self.history_limit)))
            });
        }
    }

    /// Snapshot of the user's session, creating it if needed.
    pub fn get_or_create(&self, user_id: &str) -> Session {
        self.with_session(user_id, |s| s.clone())
    }

    /// Snapshot without creating or touching the session.
    pub fn snapshot(&self, user_id: &str) -> Option<Session> {
        let map = self.read_map();
        map.get(user_id).map(|slot| lock_session(slot).clone())
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.read_map().contains_key(user_id)
    }

    pub fn session_count(&self) -> usize {
        self.read_map().len()
    }

    pub fn append_history(&self, user_id: &str, user_message: &str, bot_response: &str) {
        self.with_session(user_id, |s| s.push_history(user_message, bot_response));
    }

    pub fn set_context(&self, user_id: &str, context: Option<&str>, data: Option<Value>) {
        self.with_session(user_id, |s| s.set_context(context, data));
    }

    pub fn get_context(&self, user_id: &str) -> Option<String> {
        self.with_session(user_id, |s| s.current_context.clone())
    }

    pub fn remember_entity(&self, user_id: &str, kind: EntityKind, value: EntityMatch) {
        self.with_session(user_id, |s| s.remember_entity(kind, value));
    }

    pub fn recall_entity(&self, user_id: &str, kind: EntityKind) -> Option<EntityMatch> {
        self.with_session(user_id, |s| s.recall_entity(kind).cloned())
    }

    pub fn set_flag(&self, user_id: &str, name: &str, value: bool) {
        self.with_session(user_id, |s| s.set_flag(name, value));
    }

    pub fn get_flag(&self, user_id: &str, name: &str) -> bool {
        self.with_session(user_id, |s| s.flag(name))
    }

    pub fn set_preference(&self, user_id: &str, key: &str, value: Value) {
        self.with_session(user_id, |s| s.set_preference(key, value));
    }

    /// Preference value, or `default` when unset.
    pub fn get_preference(&self, user_id: &str, key: &str, default: Value) -> Value {
        self.with_session(user_id, |s| s.preference(key).cloned().unwrap_or(default))
    }

    pub fn start_flow(&self, user_id: &str, name: &str, initial: Option<FlowState>) {
        self.with_session(user_id, |s| s.start_flow(name, initial));
    }

    pub fn update_flow_state(&self, user_id: &str, name: &str, update: FlowState) {
        self.with_session(user_id, |s| s.update_flow_state(name, update));
    }

    pub fn get_flow_state(&self, user_id: &str, name: &str) -> FlowState {
        self.with_session(user_id, |s| s.flow_state(name))
    }

    pub fn end_flow(&self, user_id: &str, name: &str) {
        self.with_session(user_id, |s| s.end_flow(name));
    }

    pub fn set_last_intent(&self, user_id: &str, intent: &str) {
        self.with_session(user_id, |s| s.set_last_intent(intent));
    }

    pub fn get_last_intent(&self, user_id: &str) -> Option<String> {
        self.with_session(user_id, |s| s.last_intent.clone())
    }

    /// Time since the session was created; `None` for unknown users.
    pub fn session_age(&self, user_id: &str) -> Option<Duration> {
        self.read_map()
            .get(user_id)
            .map(|slot| lock_session(slot).age())
    }

    /// Time since the session was last touched; `None` for unknown users.
    pub fn inactive_time(&self, user_id: &str) -> Option<Duration> {
        self.read_map()
            .get(user_id)
            .map(|slot| lock_session(slot).inactive_for())
    }

    /// Remove sessions idle for longer than `max_age_hours`. Returns the
    /// number removed.
    pub fn purge_inactive_since(&self, max_age_hours: u32) -> usize {
        self.purge_inactive_for(Duration::hours(i64::from(max_age_hours)))
    }

    /// Remove sessions idle for longer than `max_age`.
    pub fn purge_inactive_for(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut map = self.write_map();
        let before = map.len();
        map.retain(|_, slot| now - lock_session(slot).last_active_at <= max_age);
        let removed = before - map.len();
        if removed > 0 {
            info!(removed, remaining = map.len(), "Purged inactive sessions");
        }
        removed
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Mutex<Session>>>> {
        self.sessions.read().unwrap_or_else(|poisoned| {
            warn!("Session map lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Mutex<Session>>>> {
        self.sessions.write().unwrap_or_else(|poisoned| {
            warn!("Session map lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(20)
    }
}

fn lock_session(slot: &Mutex<Session>) -> MutexGuard<'_, Session> {
    slot.lock().unwrap_or_else(|poisoned| {
        warn!("Session lock poisoned; recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityValue;
    use serde_json::json;

    // ---- creation ----

    #[test]
    fn test_new_session_defaults() {
        let store = SessionStore::new(20);
        let session = store.get_or_create("alice");

        assert!(session.history.is_empty());
        assert!(session.current_context.is_none());
        assert!(session.active_flows.is_empty());
        assert!(session.last_intent.is_none());
        assert!(session.flag(flags::IS_NEW_USER));
        assert!(!session.flag(flags::NEEDS_HUMAN));
        assert!(!session.flag(flags::HAS_PENDING_QUERY));
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn test_get_or_create_returns_same_session() {
        let store = SessionStore::new(20);
        let first = store.get_or_create("alice");
        let second = store.get_or_create("alice");
        assert_eq!(first.session_id, second.session_id);
        assert!(second.last_active_at >= first.last_active_at);
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn test_snapshot_does_not_create() {
        let store = SessionStore::new(20);
        assert!(store.snapshot("ghost").is_none());
        assert!(!store.contains("ghost"));
        assert!(store.session_age("ghost").is_none());
        assert!(store.inactive_time("ghost").is_none());
        assert_eq!(store.session_count(), 0);
    }

    // ---- history ----

    #[test]
    fn test_history_is_bounded() {
        let store = SessionStore::new(3);
        for i in 0..5 {
            store.append_history("alice", &format!("q{i}"), &format!("a{i}"));
        }
        let session = store.get_or_create("alice");
        let messages: Vec<_> = session
            .history
            .iter()
            .map(|h| h.user_message.as_str())
            .collect();
        assert_eq!(messages, vec!["q2", "q3", "q4"]);
    }

    #[test]
    fn test_history_default_limit_is_twenty() {
        let store = SessionStore::default();
        for i in 0..25 {
            store.append_history("alice", &format!("q{i}"), "a");
        }
        let session = store.get_or_create("alice");
        assert_eq!(session.history.len(), 20);
        assert_eq!(session.history.front().unwrap().user_message, "q5");
    }

    // ---- context ----

    #[test]
    fn test_context_data_keyed_by_context() {
        let store = SessionStore::new(20);
        store.set_context("alice", Some("fee_details"), Some(json!({"path": "a.b"})));
        store.set_context("alice", Some("tier_details"), Some(json!("tier2")));

        assert_eq!(store.get_context("alice").as_deref(), Some("tier_details"));
        let session = store.get_or_create("alice");
        assert_eq!(session.context_data["fee_details"], json!({"path": "a.b"}));
        assert_eq!(session.context_data["tier_details"], json!("tier2"));
    }

    #[test]
    fn test_context_data_survives_clear() {
        let store = SessionStore::new(20);
        store.set_context("alice", Some("fees"), Some(json!({"path": "x"})));
        store.set_context("alice", Some("fees"), None);
        store.set_context("alice", None, None);

        assert!(store.get_context("alice").is_none());
        let session = store.get_or_create("alice");
        assert_eq!(session.context_data["fees"], json!({"path": "x"}));
    }

    // ---- entities, flags, preferences ----

    #[test]
    fn test_entity_memory_overwrites_per_kind() {
        let store = SessionStore::new(20);
        assert!(store.recall_entity("alice", EntityKind::Cryptocurrency).is_none());

        store.remember_entity(
            "alice",
            EntityKind::Cryptocurrency,
            EntityMatch::Single(EntityValue::Text("btc".into())),
        );
        store.remember_entity(
            "alice",
            EntityKind::Cryptocurrency,
            EntityMatch::Single(EntityValue::Text("eth".into())),
        );

        let recalled = store.recall_entity("alice", EntityKind::Cryptocurrency).unwrap();
        assert_eq!(recalled.first_text(), Some("eth"));
    }

    #[test]
    fn test_flags_round_trip() {
        let store = SessionStore::new(20);
        assert!(!store.get_flag("alice", "vip"));
        store.set_flag("alice", flags::NEEDS_HUMAN, true);
        assert!(store.get_flag("alice", flags::NEEDS_HUMAN));
        store.set_flag("alice", flags::NEEDS_HUMAN, false);
        assert!(!store.get_flag("alice", flags::NEEDS_HUMAN));
    }

    #[test]
    fn test_preferences_with_default() {
        let store = SessionStore::new(20);
        assert_eq!(store.get_preference("alice", "language", json!("en")), json!("en"));
        store.set_preference("alice", "language", json!("fr"));
        assert_eq!(store.get_preference("alice", "language", json!("en")), json!("fr"));
    }

    // ---- flows ----

    #[test]
    fn test_start_flow_sets_context_and_state() {
        let store = SessionStore::new(20);
        store.start_flow("alice", "account_registration", Some(FlowState::new()));

        let session = store.get_or_create("alice");
        assert_eq!(session.active_flows, vec!["account_registration".to_string()]);
        assert_eq!(session.context(), Some("account_registration"));
        assert_eq!(store.get_flow_state("alice", "account_registration").step(), 0);
    }

    #[test]
    fn test_start_flow_twice_resets_state_without_duplicating() {
        let store = SessionStore::new(20);
        store.start_flow("alice", "account_registration", Some(FlowState::new()));
        store.update_flow_state(
            "alice",
            "account_registration",
            FlowState::at_step(2).with("email", "a@b.io"),
        );
        store.start_flow("alice", "account_registration", None);

        let session = store.get_or_create("alice");
        assert_eq!(session.active_flows.len(), 1);
        let state = store.get_flow_state("alice", "account_registration");
        assert_eq!(state.step(), 0);
        assert!(state.get("email").is_none());
    }

    #[test]
    fn test_update_flow_state_merges() {
        let store = SessionStore::new(20);
        store.start_flow("alice", "account_registration", Some(FlowState::new()));
        store.update_flow_state(
            "alice",
            "account_registration",
            FlowState::at_step(1).with("email", "a@b.io"),
        );
        store.update_flow_state("alice", "account_registration", FlowState::at_step(2));

        let state = store.get_flow_state("alice", "account_registration");
        assert_eq!(state.step(), 2);
        assert_eq!(state.get_str("email"), Some("a@b.io"));
    }

    #[test]
    fn test_update_inactive_flow_is_noop() {
        let store = SessionStore::new(20);
        store.update_flow_state("alice", "account_registration", FlowState::at_step(3));
        assert!(store.get_flow_state("alice", "account_registration").is_empty());
        assert!(store.get_or_create("alice").active_flows.is_empty());
    }

    #[test]
    fn test_end_flow_clears_owned_context() {
        let store = SessionStore::new(20);
        store.start_flow("alice", "account_registration", None);
        store.end_flow("alice", "account_registration");

        let session = store.get_or_create("alice");
        assert!(session.active_flows.is_empty());
        assert!(session.context().is_none());
        assert!(store.get_flow_state("alice", "account_registration").is_empty());
    }

    #[test]
    fn test_end_flow_keeps_foreign_context() {
        let store = SessionStore::new(20);
        store.start_flow("alice", "account_registration", None);
        store.set_context("alice", Some("fee_details"), None);
        store.end_flow("alice", "account_registration");
        assert_eq!(store.get_context("alice").as_deref(), Some("fee_details"));
    }

    #[test]
    fn test_last_intent() {
        let store = SessionStore::new(20);
        assert!(store.get_last_intent("alice").is_none());
        store.set_last_intent("alice", "fees");
        assert_eq!(store.get_last_intent("alice").as_deref(), Some("fees"));
    }

    // ---- lifetime ----

    #[test]
    fn test_session_age_and_inactive_time() {
        let store = SessionStore::new(20);
        store.get_or_create("alice");
        let age = store.session_age("alice").unwrap();
        let idle = store.inactive_time("alice").unwrap();
        assert!(age >= Duration::zero());
        assert!(idle >= Duration::zero());
        assert!(idle <= age + Duration::seconds(1));
    }

    #[test]
    fn test_purge_removes_only_idle_sessions() {
        let store = SessionStore::new(20);
        store.get_or_create("stale");
        store.get_or_create("fresh");
        {
            let map = store.read_map();
            let mut stale = lock_session(&map["stale"]);
            stale.last_active_at = Utc::now() - Duration::hours(48);
        }

        assert_eq!(store.purge_inactive_since(24), 1);
        assert!(!store.contains("stale"));
        assert!(store.contains("fresh"));
        assert_eq!(store.purge_inactive_since(24), 0);
    }

    #[test]
    fn test_purged_user_gets_fresh_session() {
        let store = SessionStore::new(20);
        let original = store.get_or_create("alice");
        store.set_flag("alice", flags::NEEDS_HUMAN, true);
        {
            let map = store.read_map();
            lock_session(&map["alice"]).last_active_at = Utc::now() - Duration::hours(2);
        }
        assert_eq!(store.purge_inactive_since(1), 1);

        let recreated = store.get_or_create("alice");
        assert_ne!(recreated.session_id, original.session_id);
        assert!(!recreated.flag(flags::NEEDS_HUMAN));
        assert!(recreated.flag(flags::IS_NEW_USER));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = SessionStore::new(20);
        store.set_flag("alice", flags::NEEDS_HUMAN, true);
        store.start_flow("bob", "account_registration", None);

        assert!(!store.get_flag("bob", flags::NEEDS_HUMAN));
        assert!(store.get_or_create("alice").active_flows.is_empty());
        assert_eq!(store.session_count(), 2);
    }

    #[test]
    fn test_session_serializes_to_json() {
        let store = SessionStore::new(20);
        store.append_history("alice", "hi", "hello");
        let json = serde_json::to_value(store.get_or_create("alice")).unwrap();
        assert_eq!(json["history"][0]["user_message"], "hi");
        assert_eq!(json["flags"]["is_new_user"], true);
        assert!(json.get("history_limit").is_none());
    }
}
