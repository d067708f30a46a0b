pub mod error;

pub use error::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted query, in characters, measured after trimming.
pub const MAX_QUERY_CHARS: usize = 2000;

pub const DEFAULT_MAX_TOKENS: u32 = 300;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

fn default_use_knowledge() -> bool {
    true
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

/// One inbound chat request. Absent fields take the service defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default = "default_use_knowledge")]
    pub use_knowledge: bool,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            use_knowledge: default_use_knowledge(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    pub fn with_knowledge(mut self, enabled: bool) -> Self {
        self.use_knowledge = enabled;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Result of an encyclopedic lookup. `found = false` carries no extract and
/// no source URL; callers treat it as "augmentation unavailable", never as an
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeExtract {
    pub topic: String,
    pub extract: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub found: bool,
}

impl KnowledgeExtract {
    pub fn found(
        topic: impl Into<String>,
        extract: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            extract: extract.into(),
            source_url: Some(source_url.into()),
            found: true,
        }
    }

    pub fn not_found(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            extract: String::new(),
            source_url: None,
            found: false,
        }
    }
}

/// Text produced by the generation provider plus usage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub text: String,
    pub tokens_used: u32,
    pub model: String,
}

/// A persisted query/answer pair. Immutable once written; `id` is assigned by
/// the store and increases monotonically, so ascending id = chronological.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub query: String,
    pub answer: String,
    pub used_knowledge: bool,
    #[serde(default)]
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A turn about to be persisted; the store assigns id and created_at.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub query: String,
    pub answer: String,
    pub used_knowledge: bool,
    pub source_url: Option<String>,
}

/// The assembled response for one pipeline run.
///
/// `turn_id = None` together with `persistence_error = Some(..)` means the
/// answer was generated but could not be saved; callers must surface that
/// distinctly from a generation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    pub query: String,
    pub used_knowledge: bool,
    #[serde(default)]
    pub source_url: Option<String>,
    pub turn_id: Option<i64>,
    #[serde(default)]
    pub persistence_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Liveness snapshot, recomputed on every probe call and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub store_reachable: bool,
    pub provider_reachable: bool,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_defaults_apply_on_missing_fields() {
        let json = r#"{"query": "hello"}"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.query, "hello");
        assert!(req.use_knowledge);
        assert_eq!(req.max_tokens, 300);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn chat_request_explicit_fields_override_defaults() {
        let json = r#"{"query": "q", "use_knowledge": false, "max_tokens": 50, "temperature": 1.5}"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert!(!req.use_knowledge);
        assert_eq!(req.max_tokens, 50);
        assert!((req.temperature - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn chat_request_builder_helpers() {
        let req = ChatRequest::new("q")
            .with_knowledge(false)
            .with_max_tokens(10)
            .with_temperature(0.0);
        assert!(!req.use_knowledge);
        assert_eq!(req.max_tokens, 10);
        assert_eq!(req.temperature, 0.0);
    }

    #[test]
    fn knowledge_extract_not_found_is_empty() {
        let extract = KnowledgeExtract::not_found("Unknown Topic");
        assert!(!extract.found);
        assert!(extract.extract.is_empty());
        assert!(extract.source_url.is_none());
    }

    #[test]
    fn chat_reply_serde_roundtrip() {
        let reply = ChatReply {
            answer: "42".into(),
            query: "meaning of life".into(),
            used_knowledge: true,
            source_url: Some("https://en.wikipedia.org/wiki/42".into()),
            turn_id: Some(7),
            persistence_error: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&reply).unwrap();
        let parsed: ChatReply = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.turn_id, Some(7));
        assert_eq!(parsed.source_url.as_deref(), Some("https://en.wikipedia.org/wiki/42"));
        assert!(parsed.persistence_error.is_none());
    }

    #[test]
    fn conversation_turn_tolerates_missing_source_url() {
        let json = r#"{
            "id": 1,
            "query": "q",
            "answer": "a",
            "used_knowledge": false,
            "created_at": "2025-09-16T22:30:00Z"
        }"#;
        let turn: ConversationTurn = serde_json::from_str(json).unwrap();
        assert_eq!(turn.id, 1);
        assert!(turn.source_url.is_none());
    }
}
