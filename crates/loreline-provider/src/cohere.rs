use async_trait::async_trait;
use loreline_schema::{GeneratedAnswer, GenerationError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{validate_generation_input, GenerationProvider};

const DEFAULT_API_BASE: &str = "https://api.cohere.ai";
const DEFAULT_MODEL: &str = "command-r";
const DEFAULT_MAX_TOKENS_CAP: u32 = 4000;
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Client for the Cohere chat API.
#[derive(Debug, Clone)]
pub struct CohereProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens_cap: u32,
}

impl CohereProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens_cap: DEFAULT_MAX_TOKENS_CAP,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens_cap(mut self, cap: u32) -> Self {
        self.max_tokens_cap = cap;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiRequest {
    pub message: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiResponse {
    pub text: String,
    #[serde(default)]
    pub meta: Option<ApiMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiMeta {
    #[serde(default)]
    pub billed_units: Option<ApiBilledUnits>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiBilledUnits {
    #[serde(default)]
    pub output_tokens: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub message: String,
}

fn classify_status(status: StatusCode, detail: String) -> GenerationError {
    match status.as_u16() {
        429 => GenerationError::RateLimited(detail),
        401 | 403 => GenerationError::InvalidCredentials(detail),
        _ => GenerationError::ProviderUnavailable(detail),
    }
}

async fn error_from_response(resp: reqwest::Response) -> GenerationError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ApiError>(&body)
        .ok()
        .filter(|e| !e.message.is_empty())
        .map(|e| format!("HTTP {status}: {}", e.message))
        .unwrap_or_else(|| format!("HTTP {status}"));
    classify_status(status, detail)
}

fn map_send_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout(format!(
            "request timed out after {REQUEST_TIMEOUT_SECS}s"
        ))
    } else {
        GenerationError::ProviderUnavailable(e.to_string())
    }
}

#[async_trait]
impl GenerationProvider for CohereProvider {
    fn max_tokens_cap(&self) -> u32 {
        self.max_tokens_cap
    }

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<GeneratedAnswer, GenerationError> {
        validate_generation_input(prompt, temperature)?;
        let max_tokens = max_tokens.min(self.max_tokens_cap);

        let url = format!("{}/v1/chat", self.api_base);
        let payload = ApiRequest {
            message: prompt.to_string(),
            model: self.model.clone(),
            max_tokens,
            temperature,
        };

        tracing::debug!(model = %self.model, max_tokens, "calling generation provider");
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(map_send_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: ApiResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::ProviderUnavailable(format!("invalid response: {e}")))?;

        if body.text.trim().is_empty() {
            return Err(GenerationError::ProviderUnavailable(
                "provider returned an empty answer".into(),
            ));
        }

        let tokens_used = body
            .meta
            .and_then(|m| m.billed_units)
            .and_then(|b| b.output_tokens)
            .unwrap_or(0.0) as u32;

        Ok(GeneratedAnswer {
            text: body.text,
            tokens_used,
            model: self.model.clone(),
        })
    }

    async fn health(&self) -> Result<(), GenerationError> {
        let url = format!("{}/v1/models", self.api_base);
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(map_send_error)?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(resp).await)
        }
    }
}
