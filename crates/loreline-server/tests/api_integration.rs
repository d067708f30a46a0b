use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use loreline_core::{ChatOrchestrator, HealthProbe};
use loreline_knowledge::KnowledgeRetriever;
use loreline_provider::{GenerationProvider, StubProvider};
use loreline_server::{create_router, state::AppState};
use loreline_store::ConversationStore;
use tower::ServiceExt;

fn make_app() -> axum::Router {
    let provider: Arc<dyn GenerationProvider> = Arc::new(StubProvider::new("test-model"));
    // Point the retriever at localhost so a stray augmentation call can never
    // leave the machine; the tests below disable augmentation explicitly.
    let retriever = KnowledgeRetriever::new().with_base_url("http://127.0.0.1:9");
    let store = ConversationStore::open_in_memory().unwrap();

    let state = AppState {
        orchestrator: Arc::new(ChatOrchestrator::new(
            retriever,
            provider.clone(),
            store.clone(),
        )),
        store: store.clone(),
        probe: Arc::new(HealthProbe::new(store, provider)),
    };
    create_router(state)
}

fn chat_body(query: &str) -> Body {
    Body::from(
        serde_json::json!({"query": query, "use_knowledge": false}).to_string(),
    )
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn chat_endpoint_returns_reply_with_turn_id() {
    let app = make_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("content-type", "application/json")
                .body(chat_body("hello there"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["answer"].as_str().unwrap().contains("hello there"));
    assert_eq!(body["used_knowledge"], false);
    assert_eq!(body["turn_id"], 1);
    assert!(body["persistence_error"].is_null());
}

#[tokio::test]
async fn empty_query_is_rejected_with_400() {
    let app = make_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("content-type", "application/json")
                .body(chat_body("   "))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn history_lists_newest_first_with_total() {
    let app = make_app();

    for query in ["first", "second"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(chat_body(query))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chat/history?limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total_conversations"], 2);
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["query"], "second");
    assert_eq!(history[1]["query"], "first");
}

#[tokio::test]
async fn delete_history_reports_deleted_count() {
    let app = make_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("content-type", "application/json")
                .body(chat_body("to be deleted"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/chat/history")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["deleted"], 1);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chat/history")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["total_conversations"], 0);
    assert!(body["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health_endpoint_is_always_200() {
    let app = make_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["store_reachable"], true);
    assert_eq!(body["provider_reachable"], true);
    assert!(body["checked_at"].is_string());
}
