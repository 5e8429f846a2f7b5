//! Provider registry and factory.
//!
//! Maps provider names to concrete [`LlmProvider`] implementations.

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::agent::providers::{Flavor, OpenAiProvider};
use crate::error::AgentError;

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"groq"` (default): Groq's OpenAI-compatible endpoint
/// - `"openai"`: `OpenAI` or any compatible API via `base_url`
///
/// # Errors
///
/// Returns [`AgentError::ApiKeyMissing`] when the config carries no key and
/// [`AgentError::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, AgentError> {
    let flavor = match config.provider.to_lowercase().as_str() {
        "groq" => Flavor::Groq,
        "openai" => Flavor::OpenAi,
        other => {
            return Err(AgentError::UnsupportedProvider {
                name: other.to_string(),
            });
        }
    };
    if !config.has_credentials() {
        return Err(AgentError::ApiKeyMissing);
    }
    Ok(Arc::new(OpenAiProvider::new(config, flavor)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_default_provider_is_groq() {
        let config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let provider = create_provider(&config).unwrap_or_else(|_| unreachable!());
        assert_eq!(provider.name(), "groq");
    }

    #[test]
    fn test_create_openai_provider() {
        let config = AgentConfig::builder()
            .api_key("test")
            .provider("OpenAI")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let provider = create_provider(&config).unwrap_or_else(|_| unreachable!());
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_create_unknown_provider() {
        let config = AgentConfig::builder()
            .api_key("test")
            .provider("anthropic")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            create_provider(&config),
            Err(AgentError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn test_missing_key_rejected() {
        let config = AgentConfig::builder().build_unauthenticated();
        assert!(matches!(
            create_provider(&config),
            Err(AgentError::ApiKeyMissing)
        ));
    }
}
