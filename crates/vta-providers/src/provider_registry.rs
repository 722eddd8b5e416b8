//! Provider registry: maps provider names to embedding endpoint configurations.
//!
//! All OpenAI-compatible embedding endpoints are static entries here; the
//! unified `OpenAiCompatibleEmbedder` uses them to connect to any provider.

/// How to attach auth credentials to requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// No authentication required (local servers).
    None,
}

/// Configuration for a single provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider identifier.
    pub name: &'static str,
    /// Base URL for the API.
    pub base_url: &'static str,
    /// Path for the embeddings endpoint (appended to base_url).
    pub embeddings_path: &'static str,
    /// Environment variable names to try for the API key (in order).
    pub env_keys: &'static [&'static str],
    /// How to send auth credentials.
    pub auth_style: AuthStyle,
    /// Environment variable to override the base URL (e.g., OLLAMA_HOST).
    pub base_url_env: Option<&'static str>,
    /// Model used when the config leaves `model` empty.
    pub default_model: &'static str,
    /// Output size of `default_model`.
    pub default_dimensions: usize,
    /// Whether the endpoint accepts the `dimensions` request field.
    pub sends_dimensions: bool,
}

// ─── Registry ────────────────────────────────────────────────────────────────

static PROVIDERS: &[ProviderConfig] = &[
    ProviderConfig {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        embeddings_path: "/embeddings",
        env_keys: &["OPENAI_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: Some("OPENAI_BASE_URL"),
        default_model: "text-embedding-3-small",
        default_dimensions: 1536,
        sends_dimensions: true,
    },
    ProviderConfig {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        embeddings_path: "/embeddings",
        env_keys: &["OPENROUTER_API_KEY", "OPENAI_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "openai/text-embedding-3-small",
        default_dimensions: 1536,
        sends_dimensions: true,
    },
    ProviderConfig {
        name: "ollama",
        base_url: "http://localhost:11434/v1",
        embeddings_path: "/embeddings",
        env_keys: &[],
        auth_style: AuthStyle::None,
        base_url_env: Some("OLLAMA_HOST"),
        default_model: "nomic-embed-text",
        default_dimensions: 768,
        sends_dimensions: false,
    },
];

/// Look up a provider config by name.
pub fn get_provider_config(name: &str) -> Option<&'static ProviderConfig> {
    let lookup = match name {
        "open_router" => "openrouter",
        other => other,
    };
    PROVIDERS.iter().find(|p| p.name == lookup)
}

/// List all known provider names.
pub fn all_provider_names() -> Vec<&'static str> {
    PROVIDERS.iter().map(|p| p.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let openai = get_provider_config("openai").unwrap();
        assert_eq!(openai.default_dimensions, 1536);
        assert_eq!(openai.auth_style, AuthStyle::Bearer);
        assert_eq!(get_provider_config("open_router").unwrap().name, "openrouter");
        assert_eq!(get_provider_config("ollama").unwrap().auth_style, AuthStyle::None);
        assert!(get_provider_config("nope").is_none());
    }

    #[test]
    fn test_names_unique() {
        let mut names = all_provider_names();
        let before = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), before);
    }
}
