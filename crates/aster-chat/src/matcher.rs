//! Intent classification.
//!
//! Rules are evaluated in registration order. For every eligible rule the
//! first matching pattern decides that rule's confidence:
//! `matched span / input length * priority`. The highest confidence wins;
//! ties go to the rule registered first.

use std::fmt;

use aster_core::{Category, KnowledgeStore};
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::entities;
use crate::error::ChatError;
use crate::flow::FlowKind;
use crate::types::{Entities, IntentMatch};

/// Intent reported when no rule matches.
pub const UNKNOWN_INTENT: &str = "unknown";

// =============================================================================
// Knowledge bindings
// =============================================================================

/// Static binding from an intent to a subtree of the knowledge store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnowledgePath {
    pub category: Category,
    pub subcategory: Option<&'static str>,
    pub topic: Option<&'static str>,
}

impl KnowledgePath {
    const fn subcategory(category: Category, subcategory: &'static str) -> Self {
        Self {
            category,
            subcategory: Some(subcategory),
            topic: None,
        }
    }

    const fn topic(category: Category, subcategory: &'static str, topic: &'static str) -> Self {
        Self {
            category,
            subcategory: Some(subcategory),
            topic: Some(topic),
        }
    }

    /// Path segments starting with the category name.
    pub fn segments(&self) -> Vec<&'static str> {
        let mut segments = vec![self.category.as_str()];
        if let Some(sub) = self.subcategory {
            segments.push(sub);
            segments.extend(self.topic);
        }
        segments
    }
}

impl fmt::Display for KnowledgePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments().join("."))
    }
}

// =============================================================================
// Rule table
// =============================================================================

struct RuleDef {
    intent: &'static str,
    patterns: &'static [&'static str],
    priority: u32,
    context_independent: bool,
    knowledge: Option<KnowledgePath>,
    follow_up_context: Option<&'static str>,
    starts_flow: Option<FlowKind>,
}

impl RuleDef {
    const fn general(intent: &'static str, priority: u32, patterns: &'static [&'static str]) -> Self {
        Self {
            intent,
            patterns,
            priority,
            context_independent: true,
            knowledge: None,
            follow_up_context: None,
            starts_flow: None,
        }
    }

    const fn topical(
        intent: &'static str,
        priority: u32,
        knowledge: KnowledgePath,
        patterns: &'static [&'static str],
    ) -> Self {
        Self {
            intent,
            patterns,
            priority,
            context_independent: true,
            knowledge: Some(knowledge),
            follow_up_context: None,
            starts_flow: None,
        }
    }

    const fn follow_up(mut self, context: &'static str) -> Self {
        self.follow_up_context = Some(context);
        self
    }

    const fn starts(mut self, flow: FlowKind) -> Self {
        self.starts_flow = Some(flow);
        self
    }

    const fn in_context_only(mut self) -> Self {
        self.context_independent = false;
        self
    }
}

/// Registered rules. Order is significant for tie-breaking.
static RULES: &[RuleDef] = &[
    // ---- conversational ----
    RuleDef::general(
        "greeting",
        1,
        &[
            r"^(hi|hello|hey|greetings)[\s.,!]*$",
            r"^good (morning|afternoon|evening)[\s.,!]*$",
        ],
    ),
    RuleDef::general(
        "farewell",
        1,
        &[
            r"^(bye|goodbye|see you|farewell)[\s.,!]*$",
            r"^(talk to you later|thanks bye|thank you bye)[\s.,!]*$",
        ],
    ),
    RuleDef::general(
        "thanks",
        1,
        &[
            r"^(thanks|thank you|thx|ty)[\s.,!]*$",
            r"(appreciate|grateful)[\s.,!]*$",
        ],
    ),
    RuleDef::general(
        "help",
        2,
        &[
            r"^help[\s.,!?]*$",
            r"^(i need|can i get) (some )?help[\s.,!?]*$",
            r"^what can you (do|help with|assist with)[\s.,!?]*$",
        ],
    ),
    RuleDef::general(
        "human_support",
        3,
        &[
            r"(speak|talk) (to|with) (a human|an agent|a real person|real person|support)",
            r"(human|live|real) (support|agent|assistance)",
            r"i want to talk to a person",
        ],
    ),
    // ---- exchange info ----
    RuleDef::topical(
        "trading_hours",
        2,
        KnowledgePath::subcategory(Category::ExchangeInfo, "trading_hours"),
        &[
            r"(what are|tell me) (the|your) (trading hours|hours of operation)",
            r"(when|what time) (is|are) (the exchange|you|trading) open",
            r"(are you open|can i trade) (24/7|all the time)",
            r"(downtime|maintenance) (schedule|time|hours)",
        ],
    ),
    RuleDef::topical(
        "supported_crypto",
        2,
        KnowledgePath::subcategory(Category::ExchangeInfo, "supported_cryptocurrencies"),
        &[
            r"(what|which) (cryptocurrencies|coins|tokens) (do you support|can i trade)",
            r"(do you support|can i trade) ([a-z]+)",
            r"(list of|all) (available|supported) (cryptocurrencies|coins)",
            r"(trading pairs|markets) (available|supported|listed)",
        ],
    ),
    RuleDef::topical(
        "fees",
        2,
        KnowledgePath::subcategory(Category::ExchangeInfo, "fee_structure"),
        &[
            r"(what are|tell me about) (the|your) (fees|fee structure)",
            r"(trading|withdrawal|deposit) fees?",
            r"how much (does it cost|are the fees) (to|for) (trade|withdraw|deposit)",
            r"(fee discounts|volume discounts|lower fees)",
        ],
    )
    .follow_up("fee_details"),
    RuleDef::topical(
        "verification_info",
        2,
        KnowledgePath::subcategory(Category::ExchangeInfo, "kyc_requirements"),
        &[
            r"(kyc|know your customer|identity verification) (requirements|process)",
            r"(verification|account) (levels|tiers)",
            r"(how to|steps to) (verify|get verified)",
            r"(what are|tell me) (the|about) (verification|kyc) (requirements|steps)",
            r"(tier|level)\s*\d+ (verification|requirements|limits)",
        ],
    )
    .follow_up("tier_details"),
    // ---- account management ----
    RuleDef::topical(
        "create_account",
        2,
        KnowledgePath::subcategory(Category::AccountManagement, "registration"),
        &[
            r"(how (do|can) i|steps to) (create|register|open) (an|a) account",
            r"(sign up|registration) (process|steps)",
            r"i want to (create|open) (an|a) account",
            r"^(sign up|register)[\s.,!]*$",
        ],
    )
    .starts(FlowKind::AccountRegistration),
    RuleDef::topical(
        "account_security",
        2,
        KnowledgePath::subcategory(Category::AccountManagement, "security"),
        &[
            r"(how (do|can) i|steps to) (secure|protect) my account",
            r"(account|wallet) security (tips|measures|best practices)",
            r"(2fa|two-factor authentication) (setup|enable)",
        ],
    ),
    RuleDef::topical(
        "reset_password",
        2,
        KnowledgePath::topic(Category::AccountManagement, "account_recovery", "forgotten_password"),
        &[
            r"(how (do|can) i|steps to) (reset|change|recover) (my|the) password",
            r"(forgot|lost|reset) (my|the) password",
            r"(password recovery|password reset) (process|steps)",
        ],
    ),
    // ---- trading ----
    RuleDef::topical(
        "how_to_trade",
        2,
        KnowledgePath::subcategory(Category::TradingInfo, "order_types"),
        &[
            r"(how (do|can) i|steps to) (trade|buy|sell) (cryptocurrency|crypto|coins|bitcoin|eth)",
            r"(how to|guide to) (place|execute) (a|an) (order|trade)",
            r"(explain|tell me about) (limit|market|stop|stop-limit) orders?",
            r"what is an? (market|limit|stop|stop-limit) order",
        ],
    ),
    RuleDef::topical(
        "trading_terms",
        2,
        KnowledgePath::subcategory(Category::TradingInfo, "market_terminology"),
        &[
            r"(what is|define|explain) (a|an) ([a-z\s]+) (in crypto|in trading)",
            r"(explain|tell me about) ([a-z\s]+) (term|concept)",
            r"(meaning of|definition of) ([a-z\s]+)",
        ],
    ),
    // ---- wallet operations ----
    RuleDef::topical(
        "deposit_info",
        2,
        KnowledgePath::subcategory(Category::WalletOperations, "deposits"),
        &[
            r"(how (do|can) i|steps to) (deposit|send) (cryptocurrency|crypto|coins|bitcoin|eth)",
            r"(deposit|send) (instructions|steps|process)",
            r"(how long|time) (for|to) (deposit|transaction) (confirmation|to arrive)",
        ],
    ),
    RuleDef::topical(
        "withdrawal_info",
        2,
        KnowledgePath::subcategory(Category::WalletOperations, "withdrawals"),
        &[
            r"(how (do|can) i|steps to) (withdraw|send out) (cryptocurrency|crypto|coins|bitcoin|eth)",
            r"(withdrawal|send out) (instructions|steps|process|fees)",
            r"(how long|time) (for|to) (withdrawal|transaction) (processing|to complete)",
        ],
    ),
    // ---- support ----
    RuleDef::topical(
        "contact_support",
        2,
        KnowledgePath::subcategory(Category::TechnicalSupport, "contact_methods"),
        &[
            r"(how (do|can) i|ways to) (contact|reach) (support|customer service)",
            r"(support|help) (contact|email|phone|chat)",
            r"(is there|do you have) (live|human) support",
        ],
    ),
    RuleDef::topical(
        "common_problem",
        3,
        KnowledgePath::subcategory(Category::TechnicalSupport, "common_issues"),
        &[
            r"(having|experiencing|experience) (a|an) (problem|issue|trouble) with",
            r"(not working|problem with|issue with) (login|deposit|withdrawal|trading)",
        ],
    ),
    // ---- education ----
    RuleDef::topical(
        "crypto_explanation",
        2,
        KnowledgePath::subcategory(Category::CryptoEducation, "cryptocurrency_basics"),
        &[
            r"(what is|explain|tell me about) (cryptocurrency|blockchain|bitcoin|ethereum)",
            r"how (does|do) (cryptocurrency|blockchain|bitcoin|ethereum) work",
            r"(basics|fundamentals) of (crypto|cryptocurrency)",
        ],
    ),
    RuleDef::topical(
        "trading_education",
        2,
        KnowledgePath::subcategory(Category::CryptoEducation, "trading_education"),
        &[
            r"(tips|advice|strategies) for (trading|investing)",
            r"(how to|guide to) (analyze|read) (charts|markets)",
            r"(explain|tell me about) (technical|fundamental) analysis",
        ],
    ),
    // ---- follow-ups, only eligible in their own context ----
    RuleDef::topical(
        "fee_details",
        3,
        KnowledgePath::subcategory(Category::ExchangeInfo, "fee_structure"),
        &[
            r"^(and |what about |how about )?(for |the )?(bitcoin|btc|ethereum|eth|ripple|xrp|litecoin|ltc|solana|sol|cardano|ada|polkadot|dot|avalanche|avax|usdt|usdc|dai|busd)\b",
            r"^(and |what about |how about )?(the )?(trading|withdrawal|deposit)( fees?)?[\s.,!?]*$",
        ],
    )
    .follow_up("fee_details")
    .in_context_only(),
    RuleDef::topical(
        "tier_details",
        3,
        KnowledgePath::subcategory(Category::ExchangeInfo, "kyc_requirements"),
        &[
            r"^(and |what about |how about )?(for |the )?(tier|level)\s*\d+",
            r"^(and |what about |how about )?(the )?(limits|requirements)( for (tier|level)\s*\d+)?[\s.,!?]*$",
        ],
    )
    .follow_up("tier_details")
    .in_context_only(),
];

// =============================================================================
// IntentMatcher
// =============================================================================

/// A compiled intent rule.
#[derive(Debug)]
pub struct IntentRule {
    pub intent: &'static str,
    patterns: Vec<Regex>,
    pub priority: u32,
    pub context_independent: bool,
    pub knowledge: Option<KnowledgePath>,
    /// Context set after this intent is answered.
    pub follow_up_context: Option<&'static str>,
    /// Flow started instead of answering.
    pub starts_flow: Option<FlowKind>,
}

impl IntentRule {
    fn eligible(&self, context: Option<&str>) -> bool {
        self.context_independent || context == Some(self.intent)
    }

    /// Span of the first pattern that matches `text`, in characters.
    fn first_match_len(&self, text: &str) -> Option<usize> {
        self.patterns
            .iter()
            .find_map(|re| re.find(text))
            .map(|m| m.as_str().chars().count())
    }
}

/// Rule-based intent classifier.
#[derive(Debug)]
pub struct IntentMatcher {
    rules: Vec<IntentRule>,
}

impl IntentMatcher {
    /// Compile the registered rule table.
    pub fn new() -> Result<Self, ChatError> {
        let rules = RULES
            .iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(rules = rules.len(), "Intent rules compiled");
        Ok(Self { rules })
    }

    /// Classify `text` given the session's current context.
    pub fn classify(&self, text: &str, current_context: Option<&str>) -> IntentMatch {
        let normalized = text.trim().to_lowercase();
        let input_len = normalized.chars().count();
        if input_len == 0 {
            return IntentMatch {
                intent: UNKNOWN_INTENT,
                confidence: 0.0,
            };
        }

        let mut best: Option<IntentMatch> = None;
        for rule in self.rules.iter().filter(|r| r.eligible(current_context)) {
            let Some(span) = rule.first_match_len(&normalized) else {
                continue;
            };
            let coverage = span as f64 / input_len as f64;
            let confidence = coverage * f64::from(rule.priority);
            if best.map_or(true, |b| confidence > b.confidence) {
                best = Some(IntentMatch {
                    intent: rule.intent,
                    confidence,
                });
            }
        }

        best.unwrap_or(IntentMatch {
            intent: UNKNOWN_INTENT,
            confidence: 0.0,
        })
    }

    /// Extract entities from `text`.
    pub fn extract_entities(&self, text: &str) -> Entities {
        entities::extract_entities(text)
    }

    pub fn rule(&self, intent: &str) -> Option<&IntentRule> {
        self.rules.iter().find(|r| r.intent == intent)
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    /// Knowledge binding of an intent, if any.
    pub fn resolve_knowledge_path(&self, intent: &str) -> Option<KnowledgePath> {
        self.rule(intent).and_then(|r| r.knowledge)
    }

    /// Check that every bound knowledge path exists in `knowledge`.
    pub fn validate_knowledge_paths(&self, knowledge: &KnowledgeStore) -> Result<(), ChatError> {
        for rule in &self.rules {
            let Some(path) = rule.knowledge else {
                continue;
            };
            if let Err(not_found) = knowledge.lookup_path(&path.segments()) {
                return Err(ChatError::UnboundKnowledgePath {
                    intent: rule.intent.to_string(),
                    path: format!("{path} ({not_found})"),
                });
            }
        }
        Ok(())
    }
}

fn compile_rule(def: &RuleDef) -> Result<IntentRule, ChatError> {
    let patterns = def
        .patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| ChatError::InvalidPattern {
                    intent: def.intent.to_string(),
                    reason: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IntentRule {
        intent: def.intent,
        patterns,
        priority: def.priority,
        context_independent: def.context_independent,
        knowledge: def.knowledge,
        follow_up_context: def.follow_up_context,
        starts_flow: def.starts_flow,
    })
}
