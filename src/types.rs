//! Core types for Durandal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a memory
pub type MemoryId = i64;

/// Default search result limit
pub const DEFAULT_SEARCH_LIMIT: i64 = 10;

/// Maximum search result limit a caller may request
pub const MAX_SEARCH_LIMIT: i64 = 100;

/// Content size above which a warning is logged (content is still accepted)
pub const CONTENT_SOFT_LIMIT_BYTES: usize = 1024 * 1024;

/// A memory entry in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier
    pub id: MemoryId,
    /// Main content of the memory
    pub content: String,
    /// Structured metadata; unrecognized fields round-trip unchanged
    #[serde(default)]
    pub metadata: MemoryMetadata,
    /// When the memory was created (server-assigned)
    pub created_at: DateTime<Utc>,
}

/// Structured memory metadata
///
/// Recognized fields are typed; anything else the caller supplies is kept in
/// `extra` and serialized back byte-for-byte equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// Importance score (0.0 - 1.0)
    #[serde(default = "default_importance")]
    pub importance: f32,
    /// Tags for categorization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Short tokens describing the content
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Owning project name, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Owning session name, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Caller-supplied fields preserved as-is
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_importance() -> f32 {
    0.5
}

impl Default for MemoryMetadata {
    fn default() -> Self {
        Self {
            importance: default_importance(),
            categories: Vec::new(),
            keywords: Vec::new(),
            project: None,
            session: None,
            extra: HashMap::new(),
        }
    }
}

impl MemoryMetadata {
    /// True when nothing beyond the importance default was ever set
    pub fn is_effectively_empty(&self) -> bool {
        self.categories.is_empty()
            && self.keywords.is_empty()
            && self.project.is_none()
            && self.session.is_none()
            && self.extra.is_empty()
    }
}

/// A project row; created lazily on first reference by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A conversation session belonging to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub project_id: i64,
    pub session_name: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Speaker role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// A conversation message row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub session_id: i64,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Knowledge extracted from a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: i64,
    pub session_id: i64,
    pub artifact_type: String,
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub importance_score: f32,
    pub created_at: DateTime<Utc>,
}

/// Filters accepted by memory search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, rename = "minImportance")]
    pub min_importance: Option<f32>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
}

/// A ranked search hit returned by the search tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub memory: Memory,
    /// Total relevance score
    pub score: f32,
    /// Short human-readable explanation of why this ranked where it did
    pub reasoning: String,
}

/// Point-in-time statistics about the store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct StoreSnapshot {
    pub total_memories: i64,
    pub db_size_bytes: i64,
}

/// Statistics about the memory store
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreStats {
    pub total_memories: i64,
    pub total_projects: i64,
    pub total_sessions: i64,
    pub total_messages: i64,
    pub total_artifacts: i64,
    pub db_size_bytes: i64,
    pub schema_version: i32,
}

/// Result of an optimize run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeStats {
    pub before: StoreSnapshot,
    pub after: StoreSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_defaults() {
        let meta: MemoryMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(meta.importance, 0.5);
        assert!(meta.is_effectively_empty());
    }

    #[test]
    fn metadata_preserves_unknown_fields() {
        let raw = r#"{"importance":0.9,"categories":["auth"],"ticket":"ENG-42","nested":{"a":1}}"#;
        let meta: MemoryMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.extra.get("ticket").unwrap(), "ENG-42");

        let round = serde_json::to_value(&meta).unwrap();
        assert_eq!(round.get("ticket").unwrap(), "ENG-42");
        assert_eq!(round.get("nested").unwrap().get("a").unwrap(), 1);
    }

    #[test]
    fn role_parsing_rejects_unknown() {
        assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
        assert!("moderator".parse::<Role>().is_err());
    }
}
