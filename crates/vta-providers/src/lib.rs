//! # Virtual TA Providers
//!
//! Embedding provider implementations for the Virtual TA.
//!
//! All OpenAI-compatible embedding endpoints (OpenAI, OpenRouter, Ollama and
//! any `custom:<url>` server) are handled by a single `OpenAiCompatibleEmbedder`.

pub mod openai_compatible;
pub mod provider_registry;

use vta_core::config::VtaConfig;
use vta_core::error::{Result, VtaError};
use vta_core::traits::Embedder;

pub use openai_compatible::OpenAiCompatibleEmbedder;

/// Create an embedder from the `[embedding]` section.
pub fn create_embedder(config: &VtaConfig) -> Result<Box<dyn Embedder>> {
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        // Custom endpoint: "custom:http://10.0.0.5:8000/v1"
        other if other.starts_with("custom:") => Ok(Box::new(OpenAiCompatibleEmbedder::custom(other, embedding)?)),
        name => {
            let registry = provider_registry::get_provider_config(name).ok_or_else(|| {
                VtaError::Configuration(format!(
                    "unknown embedding provider '{name}', expected one of {:?}",
                    available_providers()
                ))
            })?;
            Ok(Box::new(OpenAiCompatibleEmbedder::from_registry(registry, embedding)?))
        }
    }
}

/// List all available provider names.
pub fn available_providers() -> Vec<&'static str> {
    let mut names = provider_registry::all_provider_names();
    names.push("custom");
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider() {
        let mut config = VtaConfig::default();
        config.embedding.provider = "brain".into();
        let err = create_embedder(&config).err().unwrap();
        assert!(matches!(err, VtaError::Configuration(_)));
    }

    #[test]
    fn test_custom_and_local_providers() {
        let mut config = VtaConfig::default();
        config.embedding.provider = "custom:http://localhost:9000/v1".into();
        let e = create_embedder(&config).unwrap();
        assert_eq!(e.name(), "custom");
        assert_eq!(e.dimensions(), 1536);

        config.embedding.provider = "ollama".into();
        config.embedding.dimensions = 768;
        assert_eq!(create_embedder(&config).unwrap().name(), "ollama");
    }

    #[test]
    fn test_available_providers() {
        let names = available_providers();
        assert!(names.contains(&"openai"));
        assert!(names.contains(&"custom"));
    }
}
