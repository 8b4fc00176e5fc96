//! Context hierarchy models: System -> Module -> Collection.
//!
//! These exist to supply textual hints to the analyzer; no processing logic
//! depends on their shape beyond the optional context prompts.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Top-level system (e.g. an ERP product).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SystemDbModel {
    pub id: i64,
    pub name: String,
    /// Free-text context handed to the analyzer for every video under this
    /// system. Falls back to the bare name when unset.
    pub context_prompt: Option<String>,
}

/// Functional module within a system.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ModuleDbModel {
    pub id: i64,
    pub system_id: i64,
    pub name: String,
    pub context_prompt: Option<String>,
}

/// A guide grouping one or more chapters. The primary upload flow creates
/// one collection per video.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CollectionDbModel {
    pub id: i64,
    pub module_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl CollectionDbModel {
    pub fn new(module_id: i64, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: 0,
            module_id: Some(module_id),
            title: title.into(),
            description: Some(description.into()),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
