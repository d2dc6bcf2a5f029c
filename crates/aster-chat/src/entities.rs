//! Entity extraction.
//!
//! Each extractor is a regex paired with an [`EntityKind`]; the kind decides
//! how a match is normalized. Extractors run in a fixed order over the
//! lower-cased message and every non-overlapping match is collected.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::types::{Entities, EntityKind, EntityMatch, EntityValue};

// =============================================================================
// Compiled extractors
// =============================================================================

struct EntityExtractor {
    kind: EntityKind,
    pattern: Regex,
}

static EXTRACTORS: LazyLock<Vec<EntityExtractor>> = LazyLock::new(|| {
    let mk = |kind: EntityKind, pattern: &str| EntityExtractor {
        kind,
        pattern: Regex::new(pattern).expect("Invalid entity regex"),
    };

    vec![
        mk(
            EntityKind::Cryptocurrency,
            r"\b(bitcoin|btc|ethereum|eth|ripple|xrp|litecoin|ltc|solana|sol|cardano|ada|polkadot|dot|avalanche|avax|usdt|usdc|dai|busd)\b",
        ),
        mk(EntityKind::VerificationTier, r"\b(tier|level)\s*(\d+)\b"),
        mk(
            EntityKind::Amount,
            r"\b(\d+(?:\.\d+)?)\s*(bitcoin|btc|ethereum|eth|ripple|xrp|litecoin|ltc|solana|sol|cardano|ada|polkadot|dot|avalanche|avax|usdt|usdc|dai|busd|usd|eur|gbp)\b",
        ),
        mk(
            EntityKind::TimePeriod,
            r"\b(\d+)\s*(days?|weeks?|months?|years?|hours?|minutes?)\b",
        ),
        mk(
            EntityKind::OrderType,
            r"\b(market|limit|stop[\s-]limit|trailing[\s-]stop|oco|stop)\s*orders?\b",
        ),
        mk(EntityKind::FeeType, r"\b(trading|withdrawal|deposit)\s+fees?\b"),
    ]
});

static BARE_FEE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(trading|withdrawal|deposit)\b").expect("Invalid fee type regex")
});

/// Map a coin name or ticker to its lower-case ticker.
pub fn normalize_symbol(name: &str) -> &str {
    match name {
        "bitcoin" => "btc",
        "ethereum" => "eth",
        "ripple" => "xrp",
        "litecoin" => "ltc",
        "solana" => "sol",
        "cardano" => "ada",
        "polkadot" => "dot",
        "avalanche" => "avax",
        other => other,
    }
}

/// Normalize a single match. `None` drops the match, e.g. on numeric
/// overflow.
fn transform(kind: EntityKind, caps: &Captures<'_>) -> Option<EntityValue> {
    match kind {
        EntityKind::Cryptocurrency => {
            Some(EntityValue::Text(normalize_symbol(&caps[1]).to_string()))
        }
        EntityKind::VerificationTier => Some(EntityValue::Text(format!("tier{}", &caps[2]))),
        EntityKind::Amount => Some(EntityValue::Amount {
            value: caps[1].parse().ok()?,
            currency: normalize_symbol(&caps[2]).to_string(),
        }),
        EntityKind::TimePeriod => Some(EntityValue::TimePeriod {
            value: caps[1].parse().ok()?,
            unit: caps[2].to_string(),
        }),
        EntityKind::OrderType => Some(EntityValue::Text(caps[1].replace([' ', '-'], "_"))),
        EntityKind::FeeType => Some(EntityValue::Text(caps[1].to_string())),
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Extract every recognized entity from `text`.
///
/// Types with no match are absent from the result. A single match is stored
/// as a scalar; further matches of the same type promote it to a list in
/// message order.
pub fn extract_entities(text: &str) -> Entities {
    let lowered = text.to_lowercase();
    let mut entities = Entities::new();

    for extractor in EXTRACTORS.iter() {
        for caps in extractor.pattern.captures_iter(&lowered) {
            let Some(value) = transform(extractor.kind, &caps) else {
                continue;
            };
            match entities.get_mut(&extractor.kind) {
                Some(existing) => existing.push(value),
                None => {
                    entities.insert(extractor.kind, EntityMatch::Single(value));
                }
            }
        }
    }

    entities
}

/// Fill in a fee type named without "fee(s)", as in "what about deposit?".
///
/// Only used for fee follow-ups, where the bare word can mean nothing else.
/// An existing fee type entity is left as is.
pub fn infer_bare_fee_type(text: &str, entities: &mut Entities) {
    if entities.contains_key(&EntityKind::FeeType) {
        return;
    }
    let lowered = text.to_lowercase();
    if let Some(caps) = BARE_FEE_TYPE.captures(&lowered) {
        entities.insert(
            EntityKind::FeeType,
            EntityMatch::Single(EntityValue::Text(caps[1].to_string())),
        );
    }
}
