//! Value types shared across the conversation engine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Classification
// ============================================================================

/// Outcome of classifying one message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntentMatch {
    pub intent: &'static str,
    /// `coverage * priority`; `0.0` for the unknown intent.
    pub confidence: f64,
}

// ============================================================================
// Entities
// ============================================================================

/// Entity types, in extraction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Cryptocurrency,
    VerificationTier,
    Amount,
    TimePeriod,
    OrderType,
    FeeType,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Cryptocurrency,
        EntityKind::VerificationTier,
        EntityKind::Amount,
        EntityKind::TimePeriod,
        EntityKind::OrderType,
        EntityKind::FeeType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Cryptocurrency => "cryptocurrency",
            EntityKind::VerificationTier => "verification_tier",
            EntityKind::Amount => "amount",
            EntityKind::TimePeriod => "time_period",
            EntityKind::OrderType => "order_type",
            EntityKind::FeeType => "fee_type",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single extracted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityValue {
    Text(String),
    Amount { value: f64, currency: String },
    TimePeriod { value: u32, unit: String },
}

impl EntityValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            EntityValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityValue::Text(s) => f.write_str(s),
            EntityValue::Amount { value, currency } => write!(f, "{value} {currency}"),
            EntityValue::TimePeriod { value, unit } => write!(f, "{value} {unit}"),
        }
    }
}

/// One or more values extracted for the same entity type.
///
/// The first match is kept as a scalar and promoted to a list when a second
/// one arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityMatch {
    Single(EntityValue),
    Multiple(Vec<EntityValue>),
}

impl EntityMatch {
    pub fn push(&mut self, value: EntityValue) {
        match self {
            EntityMatch::Multiple(values) => values.push(value),
            EntityMatch::Single(first) => {
                let first = first.clone();
                *self = EntityMatch::Multiple(vec![first, value]);
            }
        }
    }

    /// First value in message order.
    pub fn first(&self) -> Option<&EntityValue> {
        match self {
            EntityMatch::Single(value) => Some(value),
            EntityMatch::Multiple(values) => values.first(),
        }
    }

    pub fn first_text(&self) -> Option<&str> {
        self.first().and_then(EntityValue::as_text)
    }

    pub fn values(&self) -> &[EntityValue] {
        match self {
            EntityMatch::Single(value) => std::slice::from_ref(value),
            EntityMatch::Multiple(values) => values.as_slice(),
        }
    }
}

/// Entities found in a message, keyed by type.
pub type Entities = BTreeMap<EntityKind, EntityMatch>;

// ============================================================================
// Session records
// ============================================================================

/// One completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub user_message: String,
    pub bot_response: String,
}

/// Per-flow progress record.
///
/// A JSON object that always carries an integer `step` once a flow has been
/// started; the remaining keys hold answers collected so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowState(Map<String, Value>);

impl FlowState {
    /// A fresh state at step 0.
    pub fn new() -> Self {
        Self::at_step(0)
    }

    pub fn at_step(step: u64) -> Self {
        let mut map = Map::new();
        map.insert("step".to_string(), Value::from(step));
        Self(map)
    }

    /// Current step; `0` when unset.
    pub fn step(&self) -> u64 {
        self.0.get("step").and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Shallow merge: keys in `update` overwrite existing keys.
    pub fn merge(&mut self, update: FlowState) {
        self.0.extend(update.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for FlowState {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
