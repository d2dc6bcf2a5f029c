//! Rule-based conversation engine for exchange support.
//!
//! Classifies free-text messages into intents, extracts entities, looks up
//! supporting facts in the knowledge store, and drives multi-step flows such
//! as account registration. All state lives in an in-process session store.

pub mod entities;
pub mod error;
pub mod flow;
pub mod matcher;
pub mod orchestrator;
pub mod response;
pub mod session;
pub mod types;

pub use error::ChatError;
pub use flow::{FlowKind, FlowTransition, RegistrationStep};
pub use matcher::{IntentMatcher, IntentRule, KnowledgePath, UNKNOWN_INTENT};
pub use orchestrator::ChatEngine;
pub use response::ResponseGenerator;
pub use session::{flags, Session, SessionStore};
pub use types::{
    Entities, EntityKind, EntityMatch, EntityValue, FlowState, HistoryEntry, IntentMatch,
};
