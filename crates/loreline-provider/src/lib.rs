pub mod cohere;

pub use cohere::CohereProvider;

use async_trait::async_trait;
use loreline_schema::{GeneratedAnswer, GenerationError, ValidationError};

/// A generative-AI backend.
///
/// Implementations validate their inputs before any outbound call, clamp
/// `max_tokens` to their own cap, and return the first failure verbatim —
/// retry policy belongs to the caller.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// The largest `max_tokens` this provider accepts; larger requests are
    /// clamped, never rejected.
    fn max_tokens_cap(&self) -> u32;

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<GeneratedAnswer, GenerationError>;

    /// Lightweight reachability check; never a full generation.
    async fn health(&self) -> Result<(), GenerationError>;
}

/// Shared pre-flight checks, run before any provider is contacted.
pub fn validate_generation_input(prompt: &str, temperature: f32) -> Result<(), ValidationError> {
    if prompt.trim().is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    if !(0.0..=2.0).contains(&temperature) || !temperature.is_finite() {
        return Err(ValidationError::TemperatureOutOfRange { value: temperature });
    }
    Ok(())
}

/// Offline provider that echoes the prompt; used by tests and the `stub`
/// config kind.
pub struct StubProvider {
    model: String,
}

impl StubProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new("stub-model")
    }
}

#[async_trait]
impl GenerationProvider for StubProvider {
    fn max_tokens_cap(&self) -> u32 {
        4096
    }

    async fn generate(
        &self,
        prompt: &str,
        _max_tokens: u32,
        temperature: f32,
    ) -> Result<GeneratedAnswer, GenerationError> {
        validate_generation_input(prompt, temperature)?;
        Ok(GeneratedAnswer {
            text: format!("[stub:{}] {prompt}", self.model),
            tokens_used: prompt.split_whitespace().count() as u32,
            model: self.model.clone(),
        })
    }

    async fn health(&self) -> Result<(), GenerationError> {
        Ok(())
    }
}
