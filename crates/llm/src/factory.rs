//! Generation client factory.
//!
//! Resolves a provider name from configuration into a concrete client.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use crate::types::{ClientOptions, ProviderType};
use grounded_core::{AppError, AppResult};
use std::sync::Arc;

/// Create a generation client based on the provider name.
///
/// # Errors
/// Returns a configuration error if the provider is unknown or the HTTP
/// client cannot be built.
pub fn create_client(provider: &str, options: &ClientOptions) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider).ok_or_else(|| {
        AppError::Config(format!(
            "Unknown generation provider: {}. Supported: {}",
            provider,
            ProviderType::supported().join(", ")
        ))
    })?;

    match provider_type {
        ProviderType::Ollama => {
            let client = OllamaClient::with_options(options.ollama_url(), options.timeout())?;
            Ok(Arc::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", &ClientOptions::default()).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint() {
        let options = ClientOptions {
            endpoint: Some("http://localhost:8080".to_string()),
            timeout_secs: 10,
        };
        assert!(create_client("ollama", &options).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("unknown", &ClientOptions::default()) {
            Err(AppError::Config(msg)) => assert!(msg.contains("Unknown generation provider")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
