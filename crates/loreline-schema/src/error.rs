use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller input rejected before any external call is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("query must not be empty or whitespace")]
    EmptyQuery,
    #[error("query exceeds {max} characters")]
    QueryTooLong { max: usize },
    #[error("temperature {value} is outside the allowed range [0, 2]")]
    TemperatureOutOfRange { value: f32 },
    #[error("max_tokens must be a positive integer")]
    ZeroMaxTokens,
}

/// Failure to reach or use the knowledge source. Never fatal for a chat
/// request: callers degrade to an unaugmented prompt.
#[derive(Debug, Error)]
#[error("knowledge lookup failed: {message}")]
pub struct RetrievalError {
    pub transient: bool,
    pub message: String,
}

impl RetrievalError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            transient: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            transient: false,
            message: message.into(),
        }
    }
}

/// Failure from the generation provider. Fatal for the request; the subtype
/// tells the caller whether a retry could help.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("generation provider rate limited: {0}")]
    RateLimited(String),
    #[error("generation request timed out: {0}")]
    Timeout(String),
    #[error("generation provider rejected credentials: {0}")]
    InvalidCredentials(String),
    #[error("generation provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Timeout(_))
    }
}

/// Failure of the durable store.
#[derive(Debug, Error)]
#[error("storage failure: {message}")]
pub struct StorageError {
    pub transient: bool,
    pub message: String,
}

impl StorageError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            transient: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            transient: false,
            message: message.into(),
        }
    }
}

/// Pipeline stage, used to tag failures and log transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    Augmenting,
    Generating,
    Persisting,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Augmenting => "augmenting",
            Stage::Generating => "generating",
            Stage::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// Terminal failure of one pipeline run.
///
/// Augmentation and persistence failures never abort a run (they degrade
/// instead), so only the validating and generating stages appear here.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl ChatError {
    pub fn stage(&self) -> Stage {
        match self {
            ChatError::Validation(_) => Stage::Validating,
            ChatError::Generation(GenerationError::Validation(_)) => Stage::Validating,
            ChatError::Generation(_) => Stage::Generating,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Validation(_) => false,
            ChatError::Generation(e) => e.is_transient(),
        }
    }
}
