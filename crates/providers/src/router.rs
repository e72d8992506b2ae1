//! Critic construction — turns the `[critic]` config section into an oracle.

use crate::critic::ProviderCritic;
use crate::openai_compat::OpenAiCompatProvider;
use loopguard_config::{AppConfig, CriticConfig};
use loopguard_core::error::ProviderError;
use loopguard_core::provider::Provider;
use loopguard_core::SimilarityOracle;
use std::sync::Arc;
use tracing::{info, warn};

/// Build the similarity oracle described by the config.
///
/// Returns `None` when the critic is disabled or cannot be configured; the
/// convergence detector then runs on lexical similarity alone.
pub fn build_critic(config: &AppConfig) -> Option<Arc<dyn SimilarityOracle>> {
    if !config.critic.enabled {
        return None;
    }

    match build_provider(&config.critic) {
        Ok(provider) => {
            info!(
                provider = %config.critic.provider,
                model = %config.critic.model,
                "Critic oracle enabled"
            );
            let critic = ProviderCritic::new(provider, &config.critic.model)
                .with_max_tokens(config.critic.max_tokens);
            Some(Arc::new(critic))
        }
        Err(e) => {
            warn!(error = %e, "Critic disabled, using lexical similarity");
            None
        }
    }
}

/// Build the provider behind the critic.
pub fn build_provider(critic: &CriticConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let base_url = critic
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&critic.provider));

    let api_key = match (&critic.api_key, requires_api_key(&critic.provider)) {
        (Some(key), _) => key.clone(),
        (None, false) => String::new(),
        (None, true) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for critic provider '{}'",
                critic.provider
            )));
        }
    };

    Ok(Arc::new(OpenAiCompatProvider::new(
        &critic.provider,
        &base_url,
        &api_key,
    )))
}

/// Local servers accept any key.
fn requires_api_key(provider_name: &str) -> bool {
    !matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
