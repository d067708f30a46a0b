use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use loreline_schema::{ChatError, ChatReply, ChatRequest, ConversationTurn, StorageError};

use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: u32 = 100;
const MAX_HISTORY_LIMIT: u32 = 500;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub history: Vec<ConversationTurn>,
    pub total_conversations: u64,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub deleted: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(chat))
        .route("/history", get(history).delete(clear_history))
}

fn chat_error_status(err: &ChatError) -> StatusCode {
    match err {
        ChatError::Validation(_) => StatusCode::BAD_REQUEST,
        ChatError::Generation(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Generation(_) => StatusCode::BAD_GATEWAY,
    }
}

fn storage_error_response(err: StorageError) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, (StatusCode, Json<ErrorBody>)> {
    match state.orchestrator.handle(request).await {
        Ok(reply) => Ok(Json(reply)),
        Err(err) => Err((
            chat_error_status(&err),
            Json(ErrorBody {
                error: err.to_string(),
            }),
        )),
    }
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, Json<ErrorBody>)> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let history = state
        .store
        .list_recent(limit, offset)
        .await
        .map_err(storage_error_response)?;
    let total_conversations = state.store.count().await.map_err(storage_error_response)?;

    Ok(Json(HistoryResponse {
        history,
        total_conversations,
    }))
}

async fn clear_history(
    State(state): State<AppState>,
) -> Result<Json<ClearResponse>, (StatusCode, Json<ErrorBody>)> {
    let deleted = state.store.clear().await.map_err(storage_error_response)?;
    tracing::info!(deleted, "conversation history cleared");
    Ok(Json(ClearResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use loreline_schema::{GenerationError, ValidationError};

    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err: ChatError = ValidationError::EmptyQuery.into();
        assert_eq!(chat_error_status(&err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn transient_generation_maps_to_service_unavailable() {
        let err: ChatError = GenerationError::RateLimited("429".into()).into();
        assert_eq!(chat_error_status(&err), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn permanent_generation_maps_to_bad_gateway() {
        let err: ChatError = GenerationError::InvalidCredentials("401".into()).into();
        assert_eq!(chat_error_status(&err), StatusCode::BAD_GATEWAY);
    }
}
