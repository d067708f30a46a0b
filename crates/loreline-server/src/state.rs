use std::sync::Arc;

use loreline_core::{ChatOrchestrator, HealthProbe};
use loreline_store::ConversationStore;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub store: ConversationStore,
    pub probe: Arc<HealthProbe>,
}
