//! Model backend construction from configuration

use std::sync::Arc;

use agent_core::{ModelBackend, ModelConfig, ModelProvider, Result};

use crate::openai::OpenAiBackend;

/// Builds a backend for one model entry
pub type BackendFactory = Arc<dyn Fn(&ModelConfig) -> Result<Box<dyn ModelBackend>> + Send + Sync>;

/// Backend for `config`, reading credentials from the environment.
///
/// Both providers speak the chat-completions protocol; Ollama through its
/// `/v1` endpoint.
pub fn backend_from_config(config: &ModelConfig) -> Result<Box<dyn ModelBackend>> {
    let backend = OpenAiBackend::from_model_config(config)?;
    match config.provider {
        ModelProvider::OpenAi => tracing::debug!(model = %config.model, "Using OpenAI backend"),
        ModelProvider::Ollama => {
            tracing::debug!(model = %config.model, url = %backend.config().base_url, "Using Ollama backend");
        }
    }
    Ok(Box::new(backend))
}

/// The environment-backed factory used by default
pub fn default_factory() -> BackendFactory {
    Arc::new(backend_from_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_backend_needs_no_key() {
        let backend = backend_from_config(&ModelConfig::new(ModelProvider::Ollama, "llama3.2")).unwrap();
        assert_eq!(backend.name(), "ollama:llama3.2");
    }
}
