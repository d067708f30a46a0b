use std::sync::Arc;

use chrono::Utc;
use loreline_knowledge::KnowledgeRetriever;
use loreline_provider::GenerationProvider;
use loreline_schema::{
    ChatError, ChatReply, ChatRequest, KnowledgeExtract, NewTurn, Stage, ValidationError,
    MAX_QUERY_CHARS,
};
use loreline_store::ConversationStore;
use uuid::Uuid;

/// The pipeline coordinator: validate, optionally augment, generate, persist.
///
/// Holds no per-request state; one instance is shared across concurrent
/// requests behind an `Arc`.
pub struct ChatOrchestrator {
    knowledge: KnowledgeRetriever,
    provider: Arc<dyn GenerationProvider>,
    store: ConversationStore,
}

impl ChatOrchestrator {
    pub fn new(
        knowledge: KnowledgeRetriever,
        provider: Arc<dyn GenerationProvider>,
        store: ConversationStore,
    ) -> Self {
        Self {
            knowledge,
            provider,
            store,
        }
    }

    /// Runs one request through the pipeline.
    ///
    /// Augmentation failures degrade to an unaugmented prompt; a generation
    /// failure aborts before anything is persisted; a persistence failure is
    /// reported inside an otherwise successful reply.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let trace_id = Uuid::new_v4();

        let query = validate_request(&request)?;
        tracing::info!(
            %trace_id,
            use_knowledge = request.use_knowledge,
            query_chars = query.chars().count(),
            "chat request accepted"
        );

        let extract = if request.use_knowledge {
            self.augment(trace_id, &query).await
        } else {
            None
        };

        let prompt = build_prompt(&query, extract.as_ref());
        let answer = match self
            .provider
            .generate(&prompt, request.max_tokens, request.temperature)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(%trace_id, stage = %Stage::Generating, "generation failed: {e}");
                return Err(ChatError::Generation(e));
            }
        };
        tracing::info!(
            %trace_id,
            model = %answer.model,
            tokens_used = answer.tokens_used,
            "answer generated"
        );

        let used_knowledge = extract.is_some();
        let source_url = extract.and_then(|k| k.source_url);
        let new_turn = NewTurn {
            query: query.clone(),
            answer: answer.text.clone(),
            used_knowledge,
            source_url: source_url.clone(),
        };

        match self.store.append(new_turn).await {
            Ok(turn) => {
                tracing::info!(%trace_id, turn_id = turn.id, "turn persisted");
                Ok(ChatReply {
                    answer: answer.text,
                    query,
                    used_knowledge,
                    source_url,
                    turn_id: Some(turn.id),
                    persistence_error: None,
                    created_at: turn.created_at,
                })
            }
            Err(e) => {
                tracing::warn!(
                    %trace_id,
                    stage = %Stage::Persisting,
                    transient = e.transient,
                    "answer generated but not persisted: {e}"
                );
                Ok(ChatReply {
                    answer: answer.text,
                    query,
                    used_knowledge,
                    source_url,
                    turn_id: None,
                    persistence_error: Some(e.to_string()),
                    created_at: Utc::now(),
                })
            }
        }
    }

    async fn augment(&self, trace_id: Uuid, query: &str) -> Option<KnowledgeExtract> {
        match self.knowledge.fetch(query).await {
            Ok(extract) if extract.found => {
                tracing::info!(%trace_id, topic = %extract.topic, "augmenting with extract");
                Some(extract)
            }
            Ok(_) => {
                tracing::info!(%trace_id, "topic not found, proceeding unaugmented");
                None
            }
            Err(e) => {
                tracing::warn!(
                    %trace_id,
                    transient = e.transient,
                    "knowledge lookup failed, proceeding unaugmented: {e}"
                );
                None
            }
        }
    }
}

/// Pre-flight input checks; runs before any external call.
pub fn validate_request(request: &ChatRequest) -> Result<String, ValidationError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(ValidationError::QueryTooLong {
            max: MAX_QUERY_CHARS,
        });
    }
    if request.max_tokens == 0 {
        return Err(ValidationError::ZeroMaxTokens);
    }
    if !(0.0..=2.0).contains(&request.temperature) || !request.temperature.is_finite() {
        return Err(ValidationError::TemperatureOutOfRange {
            value: request.temperature,
        });
    }
    Ok(query.to_string())
}

/// Assembles the final prompt. A found extract is prepended as grounding with
/// an instruction marking it supplementary, never authoritative.
fn build_prompt(query: &str, extract: Option<&KnowledgeExtract>) -> String {
    match extract {
        Some(k) if k.found => {
            let source = k.source_url.as_deref().unwrap_or("unknown source");
            format!(
                "Use the background extract below as supplementary context only. \
                 It may be incomplete and is not authoritative; prefer your own \
                 knowledge where they disagree.\n\n\
                 Background ({source}):\n{extract}\n\n\
                 ---\n\n\
                 Question: {query}",
                extract = k.extract,
            )
        }
        _ => query.to_string(),
    }
}
