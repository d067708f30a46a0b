use std::{fs, path::Path, sync::Arc};

use anyhow::{anyhow, Context, Result};
use loreline_knowledge::KnowledgeRetriever;
use loreline_provider::{CohereProvider, GenerationProvider, StubProvider};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "loreline.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Cohere,
    Stub,
}

fn default_max_tokens_cap() -> u32 {
    4000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// May contain `${ENV_VAR}` placeholders, resolved at load time.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens_cap")]
    pub max_tokens_cap: u32,
}

fn default_extract_max_chars() -> usize {
    800
}

fn default_knowledge_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_extract_max_chars")]
    pub extract_max_chars: usize,
    #[serde(default = "default_knowledge_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            extract_max_chars: default_extract_max_chars(),
            timeout_secs: default_knowledge_timeout_secs(),
        }
    }
}

fn default_storage_path() -> String {
    "data/loreline.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LorelineConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Expands `${VAR}` placeholders from the process environment. Unset
/// variables expand to the empty string; an unterminated placeholder is left
/// as-is.
pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

/// Loads `loreline.yaml` from `root`, resolves env placeholders and validates.
pub fn load_config(root: &Path) -> Result<LorelineConfig> {
    let path = root.join(CONFIG_FILE_NAME);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config: LorelineConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))?;

    config.provider.api_key = resolve_env_var(&config.provider.api_key);
    if let Some(url) = config.provider.base_url.take() {
        config.provider.base_url = Some(resolve_env_var(&url));
    }
    config.storage.path = resolve_env_var(&config.storage.path);

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &LorelineConfig) -> Result<()> {
    if config.provider.kind == ProviderKind::Cohere && config.provider.api_key.trim().is_empty() {
        return Err(anyhow!(
            "provider.api_key is required for the cohere provider (set it or the env var it references)"
        ));
    }
    if config.provider.max_tokens_cap == 0 {
        return Err(anyhow!("provider.max_tokens_cap must be positive"));
    }
    if config.knowledge.extract_max_chars == 0 {
        return Err(anyhow!("knowledge.extract_max_chars must be positive"));
    }
    if config.server.bind.trim().is_empty() {
        return Err(anyhow!("server.bind must not be empty"));
    }
    Ok(())
}

/// Builds the generation provider named by the config.
pub fn build_provider(config: &ProviderConfig) -> Arc<dyn GenerationProvider> {
    match config.kind {
        ProviderKind::Cohere => {
            let mut provider = CohereProvider::new(config.api_key.clone())
                .with_max_tokens_cap(config.max_tokens_cap);
            if let Some(base) = &config.base_url {
                provider = provider.with_api_base(base.clone());
            }
            if let Some(model) = &config.model {
                provider = provider.with_model(model.clone());
            }
            Arc::new(provider)
        }
        ProviderKind::Stub => Arc::new(StubProvider::new(
            config.model.clone().unwrap_or_else(|| "stub-model".into()),
        )),
    }
}

pub fn build_retriever(config: &KnowledgeConfig) -> KnowledgeRetriever {
    let mut retriever = KnowledgeRetriever::with_timeout_secs(config.timeout_secs)
        .with_extract_cap(config.extract_max_chars);
    if let Some(base) = &config.base_url {
        retriever = retriever.with_base_url(base.clone());
    }
    retriever
}
