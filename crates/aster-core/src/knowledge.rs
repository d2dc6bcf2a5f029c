//! Static knowledge store for exchange support facts.
//!
//! The store is a tree of [`KnowledgeNode`]s rooted at six fixed
//! [`Category`] names. Callers descend it by path (`category` →
//! `subcategory` → `topic` → `subtopic`) or walk it with a substring
//! [`search`](KnowledgeStore::search). Object key order is the order of the
//! source document and is significant for search results.

use std::fmt;
use std::path::Path;

use serde_json::Value;
use tracing::info;

use crate::error::{AsterError, Result};

const BUNDLED_KNOWLEDGE: &str = include_str!("../data/knowledge_base.json");

static EMPTY_NODE: KnowledgeNode = KnowledgeNode::Null;

// =============================================================================
// Category
// =============================================================================

/// Top-level knowledge categories, in search order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    ExchangeInfo,
    AccountManagement,
    TradingInfo,
    WalletOperations,
    TechnicalSupport,
    CryptoEducation,
}

impl Category {
    /// Every category, in the fixed traversal order.
    pub const ALL: [Category; 6] = [
        Category::ExchangeInfo,
        Category::AccountManagement,
        Category::TradingInfo,
        Category::WalletOperations,
        Category::TechnicalSupport,
        Category::CryptoEducation,
    ];

    /// The key used for this category in knowledge data.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ExchangeInfo => "exchange_info",
            Category::AccountManagement => "account_management",
            Category::TradingInfo => "trading_info",
            Category::WalletOperations => "wallet_operations",
            Category::TechnicalSupport => "technical_support",
            Category::CryptoEducation => "crypto_education",
        }
    }

    /// Parse a category key. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// KnowledgeNode
// =============================================================================

/// One node of the knowledge tree.
#[derive(Clone, Debug, PartialEq)]
pub enum KnowledgeNode {
    /// Ordered key/value pairs.
    Object(Vec<(String, KnowledgeNode)>),
    List(Vec<KnowledgeNode>),
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
}

impl KnowledgeNode {
    /// Child of an object node by key. `None` for missing keys and non-objects.
    pub fn get(&self, key: &str) -> Option<&KnowledgeNode> {
        match self {
            KnowledgeNode::Object(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            KnowledgeNode::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            KnowledgeNode::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[KnowledgeNode]> {
        match self {
            KnowledgeNode::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, KnowledgeNode)]> {
        match self {
            KnowledgeNode::Object(entries) => Some(entries.as_slice()),
            _ => None,
        }
    }

    /// String items of a list node, skipping anything that is not text.
    pub fn text_items(&self) -> Vec<&str> {
        self.as_list()
            .map(|items| items.iter().filter_map(KnowledgeNode::as_str).collect())
            .unwrap_or_default()
    }

    /// Convert back into a JSON value, preserving key order.
    pub fn to_value(&self) -> Value {
        match self {
            KnowledgeNode::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            KnowledgeNode::List(items) => {
                Value::Array(items.iter().map(KnowledgeNode::to_value).collect())
            }
            KnowledgeNode::Text(s) => Value::String(s.clone()),
            KnowledgeNode::Number(n) => Value::Number(n.clone()),
            KnowledgeNode::Bool(b) => Value::Bool(*b),
            KnowledgeNode::Null => Value::Null,
        }
    }
}

impl From<Value> for KnowledgeNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                KnowledgeNode::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            Value::Array(items) => KnowledgeNode::List(items.into_iter().map(Into::into).collect()),
            Value::String(s) => KnowledgeNode::Text(s),
            Value::Number(n) => KnowledgeNode::Number(n),
            Value::Bool(b) => KnowledgeNode::Bool(b),
            Value::Null => KnowledgeNode::Null,
        }
    }
}

/// Text renders bare; everything else renders as compact JSON.
impl fmt::Display for KnowledgeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnowledgeNode::Text(s) => f.write_str(s),
            KnowledgeNode::Number(n) => write!(f, "{n}"),
            other => write!(f, "{}", other.to_value()),
        }
    }
}

// =============================================================================
// Lookup results
// =============================================================================

/// Depth of a lookup path segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathLevel {
    Category,
    Subcategory,
    Topic,
    Subtopic,
}

impl PathLevel {
    fn at_depth(depth: usize) -> Self {
        match depth {
            0 => PathLevel::Category,
            1 => PathLevel::Subcategory,
            2 => PathLevel::Topic,
            _ => PathLevel::Subtopic,
        }
    }
}

impl fmt::Display for PathLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PathLevel::Category => "Category",
            PathLevel::Subcategory => "Subcategory",
            PathLevel::Topic => "Topic",
            PathLevel::Subtopic => "Subtopic",
        };
        f.write_str(name)
    }
}

/// A lookup path segment that does not exist.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{level} '{key}' not found in {parent}")]
pub struct NotFound {
    /// Level of the missing segment.
    pub level: PathLevel,
    /// The segment that was requested.
    pub key: String,
    /// Dotted path of the deepest node that did resolve.
    pub parent: String,
}

/// One search match: where it is and what it matched.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit<'a> {
    /// Dotted path with bracketed list indices, e.g. `a.b[2]`.
    pub path: String,
    pub value: &'a KnowledgeNode,
}

// =============================================================================
// KnowledgeStore
// =============================================================================

/// Read-only knowledge tree keyed by [`Category`].
#[derive(Clone, Debug)]
pub struct KnowledgeStore {
    categories: Vec<(Category, KnowledgeNode)>,
}

impl KnowledgeStore {
    /// Load the knowledge data bundled with this crate.
    pub fn bundled() -> Result<Self> {
        Self::from_json_str(BUNDLED_KNOWLEDGE)
    }

    /// Load knowledge data from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let store = Self::from_json_str(&content)?;
        info!("Knowledge data loaded from {}", path.display());
        Ok(store)
    }

    /// Parse knowledge data from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Build a store from a JSON object holding every category.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(AsterError::Knowledge(
                "knowledge root must be an object".to_string(),
            ));
        };

        let mut categories = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            let node = root.remove(category.as_str()).ok_or_else(|| {
                AsterError::Knowledge(format!("missing category '{category}'"))
            })?;
            categories.push((category, KnowledgeNode::from(node)));
        }

        Ok(Self { categories })
    }

    /// Root node of a category.
    pub fn category(&self, category: Category) -> &KnowledgeNode {
        // `from_value` guarantees one entry per category.
        self.categories
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, node)| node)
            .unwrap_or(&EMPTY_NODE)
    }

    /// Descend `category / subcategory / topic / subtopic`.
    ///
    /// Trailing levels are optional; the subtree at the last supplied level
    /// is returned. A level is only consulted if every level before it was
    /// supplied.
    pub fn lookup(
        &self,
        category: &str,
        subcategory: Option<&str>,
        topic: Option<&str>,
        subtopic: Option<&str>,
    ) -> std::result::Result<&KnowledgeNode, NotFound> {
        let mut segments = vec![category];
        for segment in [subcategory, topic, subtopic] {
            match segment {
                Some(s) => segments.push(s),
                None => break,
            }
        }
        self.lookup_path(&segments)
    }

    /// Descend an arbitrary path whose first segment is a category name.
    pub fn lookup_path(&self, segments: &[&str]) -> std::result::Result<&KnowledgeNode, NotFound> {
        let Some((first, rest)) = segments.split_first() else {
            return Err(NotFound {
                level: PathLevel::Category,
                key: String::new(),
                parent: "knowledge base".to_string(),
            });
        };

        let category = Category::from_name(first).ok_or_else(|| NotFound {
            level: PathLevel::Category,
            key: (*first).to_string(),
            parent: "knowledge base".to_string(),
        })?;

        let mut node = self.category(category);
        let mut resolved = category.as_str().to_string();
        for (i, segment) in rest.iter().enumerate() {
            node = node.get(segment).ok_or_else(|| NotFound {
                level: PathLevel::at_depth(i + 1),
                key: (*segment).to_string(),
                parent: resolved.clone(),
            })?;
            resolved.push('.');
            resolved.push_str(segment);
        }
        Ok(node)
    }

    /// Case-insensitive substring search over keys and string values.
    ///
    /// Categories are walked in [`Category::ALL`] order, then depth first in
    /// key order. A matching object key yields the whole subtree under it and
    /// the walk continues into that subtree; string list items and string
    /// leaves yield themselves.
    pub fn search(&self, query: &str) -> Vec<SearchHit<'_>> {
        let query = query.to_lowercase();
        let mut hits = Vec::new();
        for (category, node) in &self.categories {
            search_node(node, category.as_str(), &query, &mut hits);
        }
        hits
    }
}

fn search_node<'a>(node: &'a KnowledgeNode, path: &str, query: &str, hits: &mut Vec<SearchHit<'a>>) {
    match node {
        KnowledgeNode::Object(entries) => {
            for (key, value) in entries {
                let child_path = format!("{path}.{key}");
                if key.to_lowercase().contains(query) {
                    hits.push(SearchHit {
                        path: child_path.clone(),
                        value,
                    });
                }
                search_node(value, &child_path, query, hits);
            }
        }
        KnowledgeNode::List(items) => {
            for (i, item) in items.iter().enumerate() {
                let child_path = format!("{path}[{i}]");
                match item {
                    KnowledgeNode::Text(s) if s.to_lowercase().contains(query) => {
                        hits.push(SearchHit {
                            path: child_path,
                            value: item,
                        });
                    }
                    KnowledgeNode::Object(_) | KnowledgeNode::List(_) => {
                        search_node(item, &child_path, query, hits);
                    }
                    _ => {}
                }
            }
        }
        KnowledgeNode::Text(s) if s.to_lowercase().contains(query) => {
            hits.push(SearchHit {
                path: path.to_string(),
                value: node,
            });
        }
        _ => {}
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> KnowledgeStore {
        KnowledgeStore::bundled().unwrap()
    }

    // ---- Loading ----

    #[test]
    fn test_bundled_has_every_category() {
        let kb = store();
        for category in Category::ALL {
            assert!(kb.category(category).as_object().is_some(), "{category}");
        }
    }

    #[test]
    fn test_from_value_rejects_non_object_root() {
        let err = KnowledgeStore::from_value(json!(["exchange_info"])).unwrap_err();
        assert!(matches!(err, AsterError::Knowledge(_)));
    }

    #[test]
    fn test_from_value_rejects_missing_category() {
        let err = KnowledgeStore::from_value(json!({ "exchange_info": {} })).unwrap_err();
        assert!(err.to_string().contains("account_management"));
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        let doc = json!({
            "exchange_info": { "trading_hours": { "trading": "weekdays" } },
            "account_management": {},
            "trading_info": {},
            "wallet_operations": {},
            "technical_support": {},
            "crypto_education": {}
        });
        std::fs::write(&path, doc.to_string()).unwrap();

        let kb = KnowledgeStore::from_path(&path).unwrap();
        let node = kb
            .lookup("exchange_info", Some("trading_hours"), Some("trading"), None)
            .unwrap();
        assert_eq!(node.as_str(), Some("weekdays"));
    }

    // ---- Category ----

    #[test]
    fn test_category_names_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_name(category.as_str()), Some(category));
        }
        assert_eq!(Category::from_name("nope"), None);
    }

    // ---- Lookup ----

    #[test]
    fn test_lookup_trading_fees() {
        let kb = store();
        let fees = kb
            .lookup("exchange_info", Some("fee_structure"), Some("trading"), None)
            .unwrap();
        assert_eq!(fees.get("maker").and_then(KnowledgeNode::as_f64), Some(0.001));
        assert_eq!(fees.get("taker").and_then(KnowledgeNode::as_f64), Some(0.0015));
    }

    #[test]
    fn test_lookup_category_only_returns_subtree() {
        let kb = store();
        let node = kb.lookup("trading_info", None, None, None).unwrap();
        assert!(node.get("order_types").is_some());
    }

    #[test]
    fn test_lookup_missing_subcategory_is_not_found() {
        let kb = store();
        let err = kb
            .lookup("exchange_info", Some("nonexistent"), None, None)
            .unwrap_err();
        assert_eq!(err.level, PathLevel::Subcategory);
        assert_eq!(err.key, "nonexistent");
        assert_eq!(err.parent, "exchange_info");
        assert_eq!(
            err.to_string(),
            "Subcategory 'nonexistent' not found in exchange_info"
        );
    }

    #[test]
    fn test_lookup_missing_category_is_not_found() {
        let kb = store();
        let err = kb.lookup("lunar_info", None, None, None).unwrap_err();
        assert_eq!(err.level, PathLevel::Category);
    }

    #[test]
    fn test_lookup_missing_topic_names_parent_path() {
        let kb = store();
        let err = kb
            .lookup("exchange_info", Some("fee_structure"), Some("staking"), None)
            .unwrap_err();
        assert_eq!(err.level, PathLevel::Topic);
        assert_eq!(err.parent, "exchange_info.fee_structure");
    }

    #[test]
    fn test_lookup_subtopic() {
        let kb = store();
        let node = kb
            .lookup(
                "wallet_operations",
                Some("deposits"),
                Some("crypto"),
                Some("confirmations_required"),
            )
            .unwrap();
        assert_eq!(node.get("BTC").and_then(KnowledgeNode::as_f64), Some(3.0));
    }

    #[test]
    fn test_lookup_through_leaf_is_not_found() {
        let kb = store();
        let err = kb
            .lookup(
                "exchange_info",
                Some("trading_hours"),
                Some("trading"),
                Some("deeper"),
            )
            .unwrap_err();
        assert_eq!(err.level, PathLevel::Subtopic);
    }

    #[test]
    fn test_lookup_skips_levels_after_gap() {
        let kb = store();
        // A topic without a subcategory is ignored, so the category is returned.
        let node = kb
            .lookup("exchange_info", None, Some("trading"), None)
            .unwrap();
        assert!(node.get("fee_structure").is_some());
    }

    // ---- Search ----

    #[test]
    fn test_search_2fa_order() {
        let kb = store();
        let hits = kb.search("2FA");
        let paths: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths.len(), 10);
        assert_eq!(paths[0], "account_management.registration.steps[3]");
        assert_eq!(paths[1], "account_management.security.2fa_options");
        assert_eq!(paths[3], "account_management.account_recovery.lost_2fa");
        assert_eq!(
            paths[9],
            "crypto_education.security_best_practices.personal_security[1]"
        );
        assert!(hits[1].value.as_list().is_some());
    }

    #[test]
    fn test_search_is_idempotent() {
        let kb = store();
        assert_eq!(kb.search("2FA"), kb.search("2FA"));
    }

    #[test]
    fn test_search_key_match_yields_subtree_without_duplicate_leaf() {
        let kb = store();
        let hits = kb.search("maintenance");
        let paths: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "exchange_info.trading_hours.maintenance",
                "technical_support.system_status.scheduled_maintenance",
            ]
        );
        assert_eq!(
            hits[0].value.as_str(),
            Some("Every Tuesday, 3:00-4:00 AM GMT +2")
        );
    }

    #[test]
    fn test_search_no_match() {
        assert!(store().search("dogecoin moon").is_empty());
    }

    // ---- Node helpers ----

    #[test]
    fn test_display_renders_text_bare_and_objects_as_json() {
        let node = KnowledgeNode::from(json!({ "a": [1, "b"] }));
        assert_eq!(node.to_string(), r#"{"a":[1,"b"]}"#);
        assert_eq!(KnowledgeNode::Text("plain".into()).to_string(), "plain");
    }

    #[test]
    fn test_object_key_order_is_preserved() {
        let node = KnowledgeNode::from(json!({ "zeta": 1, "alpha": 2 }));
        let keys: Vec<&str> = node
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }
}
