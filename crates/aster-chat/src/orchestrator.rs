//! Dialogue orchestrator: one call per user turn.
//!
//! A turn either routes the message into the user's active flow or runs the
//! classify, extract, look up, respond pipeline. Every session mutation for
//! the turn happens under the user's session lock, so a turn is applied
//! completely or, when rejected up front, not at all.

use aster_core::config::ChatConfig;
use aster_core::{KnowledgeNode, KnowledgeStore};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::entities::infer_bare_fee_type;
use crate::error::ChatError;
use crate::flow::{FlowKind, FlowTransition};
use crate::matcher::{IntentMatcher, UNKNOWN_INTENT};
use crate::response::ResponseGenerator;
use crate::session::{flags, Session, SessionStore};

/// Intent recorded for turns that asked for a human.
const HUMAN_SUPPORT_INTENT: &str = "human_support";
/// Fee follow-ups may name the fee type without the word "fee".
const FEE_DETAILS_INTENT: &str = "fee_details";

/// Central engine wiring the matcher, knowledge, responses, and sessions.
pub struct ChatEngine {
    matcher: IntentMatcher,
    knowledge: KnowledgeStore,
    responses: ResponseGenerator,
    sessions: SessionStore,
    config: ChatConfig,
}

impl ChatEngine {
    /// Build an engine, compiling the rule table and verifying every rule's
    /// knowledge binding against `knowledge`.
    pub fn new(config: ChatConfig, knowledge: KnowledgeStore) -> Result<Self, ChatError> {
        let matcher = IntentMatcher::new()?;
        matcher.validate_knowledge_paths(&knowledge)?;

        info!(
            rules = matcher.rules().len(),
            history_limit = config.history_limit,
            "Chat engine initialized"
        );

        Ok(Self {
            matcher,
            knowledge,
            responses: ResponseGenerator::new(&config.exchange_name),
            sessions: SessionStore::new(config.history_limit),
            config,
        })
    }

    /// Engine over the bundled knowledge data with default settings.
    pub fn with_defaults() -> Result<Self, ChatError> {
        Self::new(ChatConfig::default(), KnowledgeStore::bundled()?)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn matcher(&self) -> &IntentMatcher {
        &self.matcher
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Remove sessions idle for longer than `max_age_hours`.
    pub fn purge_inactive_since(&self, max_age_hours: u32) -> usize {
        self.sessions.purge_inactive_since(max_age_hours)
    }

    /// Process one message from `user_id` and return the reply.
    ///
    /// Disabled engines, blank messages, and over-long messages are
    /// rejected before the session is touched.
    pub fn handle_turn(&self, user_id: &str, message: &str) -> Result<String, ChatError> {
        if !self.config.enabled {
            return Err(ChatError::Disabled);
        }
        let text = message.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.chars().count() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }

        let reply = self.sessions.with_session(user_id, |session| {
            // Flow answers are not classified, so they leave the last intent alone.
            let (reply, intent) = match active_flow(session) {
                Some(flow) => (self.continue_flow(session, flow, text), None),
                None => {
                    let (reply, intent) = self.answer(session, text);
                    (reply, Some(intent))
                }
            };

            session.push_history(message, &reply);
            if let Some(intent) = intent {
                session.set_last_intent(intent);
            }
            session.set_flag(flags::IS_NEW_USER, false);
            debug!(user_id, ?intent, turns = session.history.len(), "Turn complete");
            reply
        });

        Ok(reply)
    }

    // -----------------------------------------------------------------
    // Idle: classify and answer
    // -----------------------------------------------------------------

    fn answer(&self, session: &mut Session, text: &str) -> (String, &'static str) {
        let matched = self.matcher.classify(text, session.context());
        let intent = matched.intent;
        let mut entities = self.matcher.extract_entities(text);
        if intent == FEE_DETAILS_INTENT {
            infer_bare_fee_type(text, &mut entities);
        }
        debug!(
            intent,
            confidence = matched.confidence,
            entities = entities.len(),
            "Message classified"
        );

        for (kind, value) in &entities {
            session.remember_entity(*kind, value.clone());
        }

        session.set_flag(flags::HAS_PENDING_QUERY, intent == UNKNOWN_INTENT);
        if intent == HUMAN_SUPPORT_INTENT {
            session.set_flag(flags::NEEDS_HUMAN, true);
            info!("Human support requested");
        }

        let rule = self.matcher.rule(intent);

        if let Some(flow) = rule.and_then(|r| r.starts_flow) {
            session.start_flow(flow.name(), Some(flow.initial_state()));
            info!(flow = flow.name(), "Flow started");
            let state = session.flow_state(flow.name());
            return (self.responses.respond_to_flow_step(flow.name(), &state), intent);
        }

        let path = self.matcher.resolve_knowledge_path(intent);
        let knowledge = path.and_then(|p| self.fetch(&p.segments()));
        let reply = self
            .responses
            .respond(intent, &entities, knowledge, session.context());

        match rule.and_then(|r| r.follow_up_context) {
            Some(follow_up) => {
                let data = path.map(|p| serde_json::json!({ "knowledge_path": p.to_string() }));
                session.set_context(Some(follow_up), data);
            }
            // Unknown messages keep the context so a rephrased follow-up
            // still resolves.
            None if intent != UNKNOWN_INTENT => session.set_context(None, None),
            None => {}
        }

        (reply, intent)
    }

    fn fetch(&self, segments: &[&str]) -> Option<&KnowledgeNode> {
        match self.knowledge.lookup_path(segments) {
            Ok(node) => Some(node),
            Err(not_found) => {
                warn!(path = %segments.join("."), error = %not_found, "Knowledge lookup failed");
                None
            }
        }
    }

    // -----------------------------------------------------------------
    // In flow: treat the message as an answer
    // -----------------------------------------------------------------

    fn continue_flow(&self, session: &mut Session, flow: FlowKind, answer: &str) -> String {
        let name = flow.name();
        let state = session.flow_state(name);

        match flow.advance(&state, answer) {
            FlowTransition::Advance(update) => {
                session.update_flow_state(name, update);
                let state = session.flow_state(name);
                let reply = self.responses.respond_to_flow_step(name, &state);
                if flow.is_complete(&state) {
                    if let Some(email) = state.get_str("email") {
                        session.set_preference("email", Value::String(email.to_string()));
                    }
                    session.end_flow(name);
                    info!(flow = name, "Flow completed");
                } else {
                    debug!(flow = name, step = state.step(), "Flow advanced");
                }
                reply
            }
            FlowTransition::Reject(reason) => {
                debug!(flow = name, step = state.step(), "Flow answer rejected");
                format!("{reason} {}", self.responses.respond_to_flow_step(name, &state))
            }
            FlowTransition::Restart => {
                session.start_flow(name, Some(flow.initial_state()));
                info!(flow = name, "Flow restarted");
                let state = session.flow_state(name);
                self.responses.respond_to_flow_step(name, &state)
            }
            FlowTransition::Cancel => {
                session.end_flow(name);
                info!(flow = name, "Flow cancelled");
                flow.cancellation_message().to_string()
            }
        }
    }
}

/// The flow owning the session's context, if it is still active.
fn active_flow(session: &Session) -> Option<FlowKind> {
    let context = session.context()?;
    if !session.is_flow_active(context) {
        return None;
    }
    FlowKind::from_name(context)
}
