use loreline_schema::{KnowledgeExtract, RetrievalError};
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://en.wikipedia.org";
const USER_AGENT: &str = "loreline/0.1 (https://github.com/loreline/loreline)";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EXTRACT_MAX_CHARS: usize = 800;

/// Read-only client for the Wikipedia page-summary endpoint.
///
/// A missing article is a `found = false` result; only transport-level
/// problems surface as `RetrievalError`, and even those are degrade-only for
/// callers.
#[derive(Debug, Clone)]
pub struct KnowledgeRetriever {
    client: reqwest::Client,
    base_url: String,
    extract_max_chars: usize,
}

#[derive(Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Deserialize)]
struct ContentUrls {
    #[serde(default)]
    desktop: Option<PageUrls>,
}

#[derive(Deserialize)]
struct PageUrls {
    #[serde(default)]
    page: Option<String>,
}

impl Default for KnowledgeRetriever {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeRetriever {
    pub fn new() -> Self {
        Self::with_timeout_secs(DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout_secs(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            extract_max_chars: DEFAULT_EXTRACT_MAX_CHARS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_extract_cap(mut self, max_chars: usize) -> Self {
        self.extract_max_chars = max_chars;
        self
    }

    /// Looks up a short factual extract for `topic`.
    pub async fn fetch(&self, topic: &str) -> Result<KnowledgeExtract, RetrievalError> {
        let normalized = normalize_topic(topic);
        if normalized.is_empty() {
            return Ok(KnowledgeExtract::not_found(topic));
        }

        let title = normalized.replace(' ', "_");
        let url = format!("{}/api/rest_v1/page/summary/{}", self.base_url, title);

        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(RetrievalError::transient(format!(
                    "summary request timed out: {e}"
                )));
            }
            Err(e) => {
                return Err(RetrievalError::transient(format!(
                    "summary request failed: {e}"
                )));
            }
        };

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(topic = %normalized, "no encyclopedia article for topic");
            return Ok(KnowledgeExtract::not_found(normalized));
        }
        if !status.is_success() {
            return Err(RetrievalError {
                transient: status.is_server_error(),
                message: format!("summary endpoint returned HTTP {status}"),
            });
        }

        let summary: SummaryResponse = resp
            .json()
            .await
            .map_err(|e| RetrievalError::permanent(format!("invalid summary payload: {e}")))?;

        if summary.extract.trim().is_empty() {
            return Ok(KnowledgeExtract::not_found(normalized));
        }

        let source_url = summary
            .content_urls
            .and_then(|c| c.desktop)
            .and_then(|d| d.page)
            .unwrap_or_else(|| format!("{}/wiki/{}", self.base_url, title));

        let extract = truncate_extract(&summary.extract, self.extract_max_chars);
        Ok(KnowledgeExtract::found(normalized, extract, source_url))
    }
}

/// Trim and collapse internal whitespace runs to single spaces.
fn normalize_topic(topic: &str) -> String {
    topic.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_extract(extract: &str, max_chars: usize) -> String {
    if extract.chars().count() <= max_chars {
        return extract.to_string();
    }
    let mut truncated: String = extract.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}
