pub mod config;
pub mod error;
pub mod knowledge;

pub use config::AsterConfig;
pub use error::{AsterError, Result};
pub use knowledge::{Category, KnowledgeNode, KnowledgeStore, NotFound, PathLevel, SearchHit};
