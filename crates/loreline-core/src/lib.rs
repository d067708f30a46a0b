pub mod config;
pub mod health;
pub mod orchestrator;

pub use config::{load_config, validate_config, LorelineConfig};
pub use health::HealthProbe;
pub use orchestrator::ChatOrchestrator;
