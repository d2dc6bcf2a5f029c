//! Response generation.
//!
//! Conversational intents pick a canned reply at random. Knowledge-backed
//! intents either have a dedicated handler that reads specific fields, or
//! fall back to a generic summary of whatever subtree the lookup returned.
//! Nothing here fails: missing data degrades to a softer answer.

use aster_core::KnowledgeNode;
use rand::seq::IndexedRandom;
use tracing::debug;

use crate::flow::FlowKind;
use crate::types::{Entities, EntityKind, EntityMatch, FlowState};

const PREVIEW_CHARS: usize = 50;
const SUMMARY_ITEMS: usize = 3;

/// Maps an intent plus its supporting data to reply text.
pub struct ResponseGenerator {
    exchange_name: String,
    fixed: Vec<(&'static str, Vec<String>)>,
}

impl ResponseGenerator {
    pub fn new(exchange_name: &str) -> Self {
        Self {
            exchange_name: exchange_name.to_string(),
            fixed: fixed_responses(exchange_name),
        }
    }

    /// Whether `intent` answers from a fixed set.
    pub fn has_fixed_set(&self, intent: &str) -> bool {
        self.fixed_set(intent).is_some()
    }

    fn fixed_set(&self, intent: &str) -> Option<&[String]> {
        self.fixed
            .iter()
            .find(|(name, _)| *name == intent)
            .map(|(_, replies)| replies.as_slice())
    }

    /// Reply for a classified intent.
    pub fn respond(
        &self,
        intent: &str,
        entities: &Entities,
        knowledge: Option<&KnowledgeNode>,
        context: Option<&str>,
    ) -> String {
        debug!(intent, ?context, has_knowledge = knowledge.is_some(), "Generating response");

        if let Some(replies) = self.fixed_set(intent) {
            if let Some(reply) = replies.choose(&mut rand::rng()) {
                return reply.clone();
            }
        }

        let Some(node) = knowledge else {
            return acknowledge(intent);
        };

        self.bespoke(intent, entities, node)
            .unwrap_or_else(|| summarize(intent, node))
    }

    /// Prompt for the current step of a flow.
    pub fn respond_to_flow_step(&self, flow_name: &str, state: &FlowState) -> String {
        match FlowKind::from_name(flow_name) {
            Some(flow) => flow.prompt(state),
            None => format!("Let's continue with {}.", humanize(flow_name)),
        }
    }

    // -----------------------------------------------------------------
    // Dedicated handlers
    // -----------------------------------------------------------------

    /// `None` when the intent has no handler or the subtree lacks the
    /// fields the handler reads.
    fn bespoke(&self, intent: &str, entities: &Entities, kb: &KnowledgeNode) -> Option<String> {
        match intent {
            "trading_hours" => self.trading_hours(kb),
            "supported_crypto" => self.supported_crypto(entities, kb),
            "fees" | "fee_details" => self.fees(intent, entities, kb),
            "verification_info" | "tier_details" => self.verification(entities, kb),
            "reset_password" => numbered_steps("To reset your password:", kb),
            "how_to_trade" => order_types(entities, kb),
            "deposit_info" => deposits(entities, kb),
            "withdrawal_info" => withdrawals(entities, kb),
            _ => None,
        }
    }

    fn trading_hours(&self, kb: &KnowledgeNode) -> Option<String> {
        let trading = kb.get("trading")?.as_str()?;
        let mut reply = format!("{} is open for trading {trading}.", self.exchange_name);
        if let Some(maintenance) = kb.get("maintenance").and_then(KnowledgeNode::as_str) {
            reply.push_str(&format!(" Scheduled maintenance: {maintenance}."));
        }
        if let Some(support) = kb.get("support_hours").and_then(KnowledgeNode::as_str) {
            reply.push_str(&format!(" Live support is available {support}."));
        }
        Some(reply)
    }

    fn supported_crypto(&self, entities: &Entities, kb: &KnowledgeNode) -> Option<String> {
        let majors = kb.get("major_cryptos")?.text_items();
        let stablecoins = kb
            .get("stablecoins")
            .map(KnowledgeNode::text_items)
            .unwrap_or_default();

        if let Some(coin) = text_entity(entities, EntityKind::Cryptocurrency) {
            let symbol = coin.to_uppercase();
            let supported = majors
                .iter()
                .chain(stablecoins.iter())
                .any(|s| s.eq_ignore_ascii_case(&symbol));
            return Some(if supported {
                format!("Yes, we support {symbol}! You can trade it on {}.", self.exchange_name)
            } else {
                format!(
                    "I'm sorry, we don't currently support {symbol}. \
                     We're always evaluating new assets, so check back soon."
                )
            });
        }

        let mut reply = format!(
            "{} supports major cryptocurrencies including {} and more.",
            self.exchange_name,
            join_first(&majors, SUMMARY_ITEMS)
        );
        if !stablecoins.is_empty() {
            reply.push_str(&format!(
                " We also support stablecoins such as {}.",
                stablecoins.join(", ")
            ));
        }
        reply.push_str(" Would you like to know about a specific cryptocurrency?");
        Some(reply)
    }

    fn fees(&self, intent: &str, entities: &Entities, kb: &KnowledgeNode) -> Option<String> {
        let coin = text_entity(entities, EntityKind::Cryptocurrency);
        // A bare coin in a fee follow-up asks for its withdrawal fee.
        let fee_type = text_entity(entities, EntityKind::FeeType).or(
            if intent == "fee_details" && coin.is_some() {
                Some("withdrawal")
            } else {
                None
            },
        );

        match fee_type {
            Some("trading") => {
                let trading = kb.get("trading")?;
                let maker = trading.get("maker")?.as_f64()?;
                let taker = trading.get("taker")?.as_f64()?;
                let mut reply = format!(
                    "Our trading fees are {}% for maker orders and {}% for taker orders. \
                     Volume discounts are available for high-volume traders.",
                    format_percent(maker),
                    format_percent(taker)
                );
                if let Some(discount) = trading.get("new_user_discount").and_then(KnowledgeNode::as_str)
                {
                    reply.push_str(&format!(" New users get a {discount}."));
                }
                Some(reply)
            }
            Some("withdrawal") => {
                let withdrawal = kb.get("withdrawal")?;
                Some(match coin {
                    Some(coin) => {
                        let symbol = coin.to_uppercase();
                        match withdrawal.get(&symbol) {
                            Some(fee) => format!("The withdrawal fee for {symbol} is {fee} {symbol}."),
                            None => format!(
                                "I don't have the specific withdrawal fee for {symbol}. \
                                 Please check the fee schedule on our website or contact support."
                            ),
                        }
                    }
                    None => {
                        let example = withdrawal
                            .as_object()
                            .and_then(|entries| entries.first())
                            .map(|(symbol, fee)| {
                                format!(" For example, the {symbol} withdrawal fee is {fee} {symbol}.")
                            })
                            .unwrap_or_default();
                        format!(
                            "Our withdrawal fees vary by cryptocurrency.{example} \
                             Which cryptocurrency would you like to know about?"
                        )
                    }
                })
            }
            Some("deposit") => {
                let deposit = kb.get("deposit")?;
                let crypto = deposit.get("crypto")?.as_str()?;
                let fiat = deposit.get("fiat")?.as_str()?;
                Some(format!(
                    "Crypto deposits are {}. Fiat deposits cost {fiat}.",
                    crypto.to_lowercase()
                ))
            }
            _ => {
                let trading = kb.get("trading")?;
                let maker = trading.get("maker")?.as_f64()?;
                let taker = trading.get("taker")?.as_f64()?;
                Some(format!(
                    "{} offers competitive fees. Trading fees start at {}% maker and {}% taker, \
                     with volume discounts available. Withdrawal fees vary by cryptocurrency. \
                     Would you like details on trading, withdrawal, or deposit fees?",
                    self.exchange_name,
                    format_percent(maker),
                    format_percent(taker)
                ))
            }
        }
    }

    fn verification(&self, entities: &Entities, kb: &KnowledgeNode) -> Option<String> {
        if let Some(tier) = text_entity(entities, EntityKind::VerificationTier) {
            let label = tier_label(tier);
            let Some(details) = kb.get(tier) else {
                let known: Vec<String> = kb
                    .as_object()
                    .unwrap_or_default()
                    .iter()
                    .map(|(key, _)| tier_label(key))
                    .collect();
                return Some(format!(
                    "I don't have information about {label}. Our verification levels are {}.",
                    known.join(", ")
                ));
            };

            let requirements = details
                .get("requirements")
                .map(KnowledgeNode::text_items)
                .unwrap_or_default();
            let mut reply = format!("{label} verification requires: {}.", requirements.join(", "));
            if let Some(limits) = details.get("limits") {
                let trading = limits.get("daily_trading").and_then(KnowledgeNode::as_f64);
                let withdrawal = limits.get("daily_withdrawal").and_then(KnowledgeNode::as_f64);
                if let (Some(trading), Some(withdrawal)) = (trading, withdrawal) {
                    reply.push_str(&format!(
                        " With this level, your daily trading limit is ${} and your daily \
                         withdrawal limit is ${}.",
                        group_thousands(trading),
                        group_thousands(withdrawal)
                    ));
                }
            }
            return Some(reply);
        }

        let tiers = kb.as_object()?;
        let overview: Vec<String> = tiers
            .iter()
            .map(|(key, details)| {
                match details
                    .get("limits")
                    .and_then(|l| l.get("daily_trading"))
                    .and_then(KnowledgeNode::as_f64)
                {
                    Some(limit) => format!(
                        "{} (daily trading up to ${})",
                        tier_label(key),
                        group_thousands(limit)
                    ),
                    None => tier_label(key),
                }
            })
            .collect();
        Some(format!(
            "{} has {} verification levels: {}. Higher levels unlock higher limits. \
             Would you like the requirements for a specific tier?",
            self.exchange_name,
            tiers.len(),
            overview.join(", ")
        ))
    }
}

// =============================================================================
// Knowledge-driven helpers
// =============================================================================

fn order_types(entities: &Entities, kb: &KnowledgeNode) -> Option<String> {
    let types = kb.as_object()?;

    if let Some(order_type) = text_entity(entities, EntityKind::OrderType) {
        let Some(details) = kb.get(order_type) else {
            let known: Vec<String> = types.iter().map(|(k, _)| humanize(k)).collect();
            return Some(format!(
                "I don't have details on {} orders. We support {} orders.",
                humanize(order_type),
                known.join(", ")
            ));
        };
        let mut reply = format!("A {} order: ", humanize(order_type));
        if let Some(description) = details.get("description").and_then(KnowledgeNode::as_str) {
            reply.push_str(description);
            reply.push('.');
        }
        let pros = details.get("pros").map(KnowledgeNode::text_items).unwrap_or_default();
        if !pros.is_empty() {
            reply.push_str(&format!(" Pros: {}.", pros.join(", ")));
        }
        let cons = details.get("cons").map(KnowledgeNode::text_items).unwrap_or_default();
        if !cons.is_empty() {
            reply.push_str(&format!(" Cons: {}.", cons.join(", ")));
        }
        return Some(reply);
    }

    let overview: Vec<String> = types
        .iter()
        .map(|(key, details)| {
            match details.get("description").and_then(KnowledgeNode::as_str) {
                Some(description) => format!("{} ({})", humanize(key), description.to_lowercase()),
                None => humanize(key),
            }
        })
        .collect();
    Some(format!(
        "We support {} order types: {}. Which one would you like to know more about?",
        types.len(),
        overview.join("; ")
    ))
}

fn deposits(entities: &Entities, kb: &KnowledgeNode) -> Option<String> {
    let crypto = kb.get("crypto")?;

    if let Some(coin) = text_entity(entities, EntityKind::Cryptocurrency) {
        let symbol = coin.to_uppercase();
        let confirmations = crypto
            .get("confirmations_required")
            .and_then(|c| c.get(&symbol));
        let expected = crypto
            .get("expected_time")
            .and_then(|t| t.get(&symbol))
            .and_then(KnowledgeNode::as_str);
        return Some(match (confirmations, expected) {
            (Some(n), Some(time)) => format!(
                "{symbol} deposits need {n} network confirmations, which usually takes {time}."
            ),
            (Some(n), None) => format!("{symbol} deposits need {n} network confirmations."),
            _ => format!(
                "I don't have confirmation details for {symbol} deposits. \
                 The deposit page shows the current requirement for each network."
            ),
        });
    }

    numbered_steps("To deposit cryptocurrency:", crypto.get("process")?)
}

fn withdrawals(entities: &Entities, kb: &KnowledgeNode) -> Option<String> {
    let crypto = kb.get("crypto")?;

    if let Some(coin) = text_entity(entities, EntityKind::Cryptocurrency) {
        let symbol = coin.to_uppercase();
        let networks = crypto
            .get("networks")
            .and_then(|n| n.get(&symbol))
            .map(KnowledgeNode::text_items)
            .unwrap_or_default();
        let fee = kb
            .get("fiat")
            .and_then(|f| f.get("fees"))
            .and_then(|f| f.get("crypto"))
            .and_then(|f| f.get(&symbol));

        let mut parts = Vec::new();
        if !networks.is_empty() {
            parts.push(format!(
                "{symbol} withdrawals are supported on: {}.",
                networks.join(", ")
            ));
        }
        if let Some(fee) = fee {
            parts.push(format!("The withdrawal fee is {fee} {symbol}."));
        }
        if parts.is_empty() {
            return Some(format!(
                "I don't have network details for {symbol} withdrawals. \
                 Please check the withdrawal page or contact support."
            ));
        }
        return Some(parts.join(" "));
    }

    let mut reply = numbered_steps("To withdraw cryptocurrency:", crypto.get("process")?)?;
    if let Some(processing) = crypto
        .get("withdrawal_times")
        .and_then(|t| t.get("processing"))
        .and_then(KnowledgeNode::as_str)
    {
        reply.push_str(&format!("\nProcessing time: {}.", processing.to_lowercase()));
    }
    Some(reply)
}

fn numbered_steps(heading: &str, list: &KnowledgeNode) -> Option<String> {
    let steps = list.text_items();
    if steps.is_empty() {
        return None;
    }
    let mut reply = heading.to_string();
    for (i, step) in steps.iter().enumerate() {
        reply.push_str(&format!("\n{}. {step}", i + 1));
    }
    Some(reply)
}

// =============================================================================
// Generic fallbacks
// =============================================================================

/// Summary of an arbitrary subtree.
fn summarize(intent: &str, node: &KnowledgeNode) -> String {
    let topic = humanize(intent);
    match node {
        KnowledgeNode::Object(entries) => {
            let items: Vec<String> = entries
                .iter()
                .take(SUMMARY_ITEMS)
                .map(|(key, value)| format!("{}: {}", humanize(key), preview(value)))
                .collect();
            format!("Here's what I know about {topic}: {}.", items.join("; "))
        }
        KnowledgeNode::List(items) => {
            let items: Vec<String> = items
                .iter()
                .take(SUMMARY_ITEMS)
                .map(ToString::to_string)
                .collect();
            format!("Here's what I know about {topic}: {}.", items.join(", "))
        }
        other => format!("About {topic}: {other}"),
    }
}

fn acknowledge(intent: &str) -> String {
    format!(
        "I understand you're asking about {}. Let me look into that for you.",
        humanize(intent)
    )
}

fn preview(value: &KnowledgeNode) -> String {
    let text = value.to_string();
    if text.chars().count() <= PREVIEW_CHARS {
        return text;
    }
    let cut: String = text.chars().take(PREVIEW_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}

// =============================================================================
// Formatting
// =============================================================================

fn text_entity(entities: &Entities, kind: EntityKind) -> Option<&str> {
    entities.get(&kind).and_then(EntityMatch::first_text)
}

fn join_first(items: &[&str], n: usize) -> String {
    items.iter().take(n).copied().collect::<Vec<_>>().join(", ")
}

fn humanize(name: &str) -> String {
    name.replace('_', " ")
}

/// `tier2` → `Tier 2`, `corporate` → `Corporate`.
fn tier_label(key: &str) -> String {
    if let Some(number) = key.strip_prefix("tier") {
        return format!("Tier {number}");
    }
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A fractional rate as a percentage without float noise: `0.0015` → `0.15`.
fn format_percent(rate: f64) -> String {
    let formatted = format!("{:.4}", rate * 100.0);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Whole amounts with thousands separators: `10000.0` → `10,000`.
fn group_thousands(amount: f64) -> String {
    let digits = format!("{:.0}", amount.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0.0 {
        grouped.insert(0, '-');
    }
    grouped
}

// =============================================================================
// Fixed response sets
// =============================================================================

fn fixed_responses(exchange: &str) -> Vec<(&'static str, Vec<String>)> {
    vec![
        (
            "greeting",
            vec![
                format!("Hello! Welcome to {exchange} support. How can I help you today?"),
                format!("Hi there! I'm the {exchange} assistant. What can I do for you?"),
                "Hey! How can I assist you with your crypto today?".to_string(),
            ],
        ),
        (
            "farewell",
            vec![
                "Goodbye! Feel free to come back if you have more questions.".to_string(),
                "Take care! Happy trading.".to_string(),
                format!("Thanks for chatting with {exchange} support. Have a great day!"),
            ],
        ),
        (
            "thanks",
            vec![
                "You're welcome! Is there anything else I can help with?".to_string(),
                "Happy to help! Let me know if you need anything else.".to_string(),
                "Anytime! Anything else on your mind?".to_string(),
            ],
        ),
        (
            "help",
            vec![
                "I can help with trading hours, supported cryptocurrencies, fees, \
                 verification, account setup, deposits, withdrawals, and more. \
                 What would you like to know?"
                    .to_string(),
                "Ask me about fees, verification levels, order types, deposits, \
                 withdrawals, or say \"create an account\" to get started."
                    .to_string(),
            ],
        ),
        (
            "human_support",
            vec![
                "I'll connect you with a member of our support team. \
                 An agent will be with you shortly."
                    .to_string(),
                "Let me transfer you to a human agent. Live chat is available \
                 Monday-Friday, 9:00 AM-6:00 PM; outside those hours we'll reply by email."
                    .to_string(),
            ],
        ),
        (
            "unknown",
            vec![
                "I'm not sure I understood that. Could you rephrase your question?".to_string(),
                "Sorry, I don't know how to help with that yet. Try asking about fees, \
                 verification, deposits, or withdrawals."
                    .to_string(),
                "I didn't quite catch that. Could you give me a bit more detail?".to_string(),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::extract_entities;
    use aster_core::KnowledgeStore;

    fn generator() -> ResponseGenerator {
        ResponseGenerator::new("Aster Exchange")
    }

    fn kb() -> KnowledgeStore {
        KnowledgeStore::bundled().unwrap()
    }

    fn answer(intent: &str, text: &str, path: &[&str]) -> String {
        let store = kb();
        let node = store.lookup_path(path).unwrap();
        generator().respond(intent, &extract_entities(text), Some(node), None)
    }

    // ---- fixed sets ----

    #[test]
    fn test_fixed_sets_ignore_entities_and_knowledge() {
        let g = generator();
        let store = kb();
        let node = store.lookup_path(&["exchange_info", "fee_structure"]).unwrap();
        for intent in ["greeting", "farewell", "thanks", "help", "human_support", "unknown"] {
            assert!(g.has_fixed_set(intent));
            let set = g.fixed_set(intent).unwrap().to_vec();
            for _ in 0..10 {
                let reply = g.respond(intent, &extract_entities("100 btc"), Some(node), None);
                assert!(set.contains(&reply), "{intent}: {reply}");
            }
        }
        assert!(!g.has_fixed_set("fees"));
    }

    // ---- bespoke handlers ----

    #[test]
    fn test_trading_hours() {
        let reply = answer("trading_hours", "", &["exchange_info", "trading_hours"]);
        assert!(reply.contains("24/7, 365 days a year"));
        assert!(reply.contains("Every Tuesday"));
    }

    #[test]
    fn test_supported_crypto_specific_and_general() {
        let path = ["exchange_info", "supported_cryptocurrencies"];
        let reply = answer("supported_crypto", "do you support solana", &path);
        assert!(reply.starts_with("Yes, we support SOL"));

        let reply = answer("supported_crypto", "which coins can i trade", &path);
        assert!(reply.contains("BTC, ETH, XRP"));
        assert!(reply.contains("USDT"));
    }

    #[test]
    fn test_supported_crypto_unlisted_coin() {
        let store = KnowledgeStore::from_json_str(
            r#"{"exchange_info": {"supported_cryptocurrencies": {"major_cryptos": ["BTC"]}},
                "account_management": {}, "trading_info": {}, "wallet_operations": {},
                "technical_support": {}, "crypto_education": {}}"#,
        )
        .unwrap();
        let node = store
            .lookup_path(&["exchange_info", "supported_cryptocurrencies"])
            .unwrap();
        let reply = generator().respond(
            "supported_crypto",
            &extract_entities("do you support cardano"),
            Some(node),
            None,
        );
        assert!(reply.contains("don't currently support ADA"));
    }

    #[test]
    fn test_trading_fees_have_no_float_noise() {
        let reply = answer("fees", "what are the trading fees", &["exchange_info", "fee_structure"]);
        assert!(reply.contains("0.1% for maker"));
        assert!(reply.contains("0.15% for taker"));
        assert!(!reply.contains("0.15000"));
    }

    #[test]
    fn test_withdrawal_fee_for_coin() {
        let path = ["exchange_info", "fee_structure"];
        let reply = answer("fees", "btc withdrawal fee", &path);
        assert_eq!(reply, "The withdrawal fee for BTC is 0.0005 BTC.");

        let reply = answer("fees", "withdrawal fees", &path);
        assert!(reply.contains("vary by cryptocurrency"));
        assert!(reply.contains("BTC withdrawal fee is 0.0005 BTC"));
    }

    #[test]
    fn test_fee_follow_up_with_bare_coin() {
        let reply = answer("fee_details", "what about eth", &["exchange_info", "fee_structure"]);
        assert_eq!(reply, "The withdrawal fee for ETH is 0.005 ETH.");
    }

    #[test]
    fn test_general_and_deposit_fees() {
        let path = ["exchange_info", "fee_structure"];
        let reply = answer("fees", "tell me about your fees", &path);
        assert!(reply.contains("Aster Exchange offers competitive fees"));

        let reply = answer("fees", "deposit fees", &path);
        assert_eq!(reply, "Crypto deposits are free. Fiat deposits cost 1% of deposit amount.");
    }

    #[test]
    fn test_verification_tier_details() {
        let path = ["exchange_info", "kyc_requirements"];
        let reply = answer("tier_details", "and tier 2?", &path);
        assert!(reply.starts_with("Tier 2 verification requires: Tier 1 requirements, Government ID"));
        assert!(reply.contains("$10,000"));
        assert!(reply.contains("$5,000"));
    }

    #[test]
    fn test_verification_missing_tier() {
        let reply = answer("verification_info", "tier 9 limits", &["exchange_info", "kyc_requirements"]);
        assert!(reply.starts_with("I don't have information about Tier 9"));
        assert!(reply.contains("Corporate"));
    }

    #[test]
    fn test_verification_overview() {
        let reply = answer("verification_info", "verification levels", &["exchange_info", "kyc_requirements"]);
        assert!(reply.contains("4 verification levels"));
        assert!(reply.contains("Tier 3 (daily trading up to $50,000)"));
    }

    #[test]
    fn test_reset_password_steps() {
        let reply = answer(
            "reset_password",
            "",
            &["account_management", "account_recovery", "forgotten_password"],
        );
        assert!(reply.starts_with("To reset your password:\n1. Click 'Forgot Password'"));
        assert!(reply.contains("\n5. Re-verify 2FA"));
    }

    #[test]
    fn test_order_type_details() {
        let path = ["trading_info", "order_types"];
        let reply = answer("how_to_trade", "explain stop-limit orders", &path);
        assert!(reply.starts_with("A stop limit order: Trigger a limit order"));
        assert!(reply.contains("Pros: Automated risk management"));

        let reply = answer("how_to_trade", "explain oco orders", &path);
        assert!(reply.starts_with("I don't have details on oco orders"));

        let reply = answer("how_to_trade", "how do i trade crypto", &path);
        assert!(reply.starts_with("We support 3 order types"));
    }

    #[test]
    fn test_deposit_confirmations() {
        let path = ["wallet_operations", "deposits"];
        let reply = answer("deposit_info", "how long for btc deposit", &path);
        assert_eq!(
            reply,
            "BTC deposits need 3 network confirmations, which usually takes 10-60 minutes."
        );

        let reply = answer("deposit_info", "sol deposit", &path);
        assert_eq!(reply, "SOL deposits need 32 network confirmations.");

        let reply = answer("deposit_info", "dai deposit", &path);
        assert!(reply.starts_with("I don't have confirmation details for DAI"));

        let reply = answer("deposit_info", "deposit steps", &path);
        assert!(reply.starts_with("To deposit cryptocurrency:\n1. Go to Wallet > Deposit"));
    }

    #[test]
    fn test_withdrawal_networks() {
        let path = ["wallet_operations", "withdrawals"];
        let reply = answer("withdrawal_info", "withdraw eth", &path);
        assert!(reply.contains("Ethereum (ERC-20), Polygon, Arbitrum"));
        assert!(reply.contains("0.005 ETH"));

        let reply = answer("withdrawal_info", "withdraw ada", &path);
        assert!(reply.starts_with("I don't have network details for ADA"));

        let reply = answer("withdrawal_info", "withdrawal process", &path);
        assert!(reply.contains("Processing time: up to 12 hours."));
    }

    // ---- generic summary ----

    #[test]
    fn test_generic_summary_of_mapping() {
        let reply = answer("contact_support", "", &["technical_support", "contact_methods"]);
        assert!(reply.starts_with("Here's what I know about contact support: live chat: "));
        // Three keys at most.
        assert!(reply.contains("ticket system"));
        assert!(!reply.contains("phone"));
    }

    #[test]
    fn test_generic_summary_of_list() {
        let reply = answer(
            "common_problem",
            "",
            &["account_management", "security", "2fa_options"],
        );
        assert_eq!(
            reply,
            "Here's what I know about common problem: Google Authenticator, SMS verification, \
             Email verification."
        );
    }

    #[test]
    fn test_preview_truncation() {
        let short = KnowledgeNode::Text("short".to_string());
        assert_eq!(preview(&short), "short");

        let long = KnowledgeNode::Text("x".repeat(80));
        let p = preview(&long);
        assert!(p.chars().count() <= PREVIEW_CHARS);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn test_scalar_summary_and_acknowledgement() {
        let node = KnowledgeNode::Text("Every Tuesday".to_string());
        let reply = generator().respond("maintenance_window", &Entities::new(), Some(&node), None);
        assert_eq!(reply, "About maintenance window: Every Tuesday");

        let reply = generator().respond("margin_trading", &Entities::new(), None, None);
        assert_eq!(
            reply,
            "I understand you're asking about margin trading. Let me look into that for you."
        );
    }

    #[test]
    fn test_bespoke_handler_degrades_to_summary() {
        let node = KnowledgeNode::Text("unexpected".to_string());
        let reply = generator().respond("trading_hours", &Entities::new(), Some(&node), None);
        assert_eq!(reply, "About trading hours: unexpected");
    }

    // ---- flow prompts ----

    #[test]
    fn test_flow_step_prompts() {
        let g = generator();
        assert!(g
            .respond_to_flow_step("account_registration", &FlowState::new())
            .contains("email"));
        assert!(g
            .respond_to_flow_step("account_registration", &FlowState::at_step(1))
            .contains("12 characters"));
        assert!(g
            .respond_to_flow_step("account_registration", &FlowState::at_step(2))
            .contains("full name"));
        assert_eq!(
            g.respond_to_flow_step("kyc_upload", &FlowState::new()),
            "Let's continue with kyc upload."
        );
    }

    // ---- formatting ----

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.001), "0.1");
        assert_eq!(format_percent(0.0015), "0.15");
        assert_eq!(format_percent(0.01), "1");
        assert_eq!(format_percent(0.0), "0");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0.0), "0");
        assert_eq!(group_thousands(999.0), "999");
        assert_eq!(group_thousands(10000.0), "10,000");
        assert_eq!(group_thousands(200000.0), "200,000");
        assert_eq!(group_thousands(1234567.0), "1,234,567");
    }

    #[test]
    fn test_tier_label() {
        assert_eq!(tier_label("tier2"), "Tier 2");
        assert_eq!(tier_label("corporate"), "Corporate");
        assert_eq!(tier_label(""), "");
    }
}
