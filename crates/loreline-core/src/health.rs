use std::sync::Arc;

use chrono::Utc;
use loreline_provider::GenerationProvider;
use loreline_schema::HealthStatus;
use loreline_store::ConversationStore;

/// Liveness checks for the store and the generation provider.
///
/// `check` never fails outward: every internal error becomes `false` for the
/// corresponding field.
pub struct HealthProbe {
    store: ConversationStore,
    provider: Arc<dyn GenerationProvider>,
}

impl HealthProbe {
    pub fn new(store: ConversationStore, provider: Arc<dyn GenerationProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn check(&self) -> HealthStatus {
        let store_reachable = match self.store.count().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("store health check failed: {e}");
                false
            }
        };

        let provider_reachable = match self.provider.health().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("provider health check failed: {e}");
                false
            }
        };

        HealthStatus {
            store_reachable,
            provider_reachable,
            checked_at: Utc::now(),
        }
    }
}
