//! Provider selection and client construction options.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Known generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Ollama,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
        }
    }

    /// All provider names accepted by [`ProviderType::parse`].
    pub fn supported() -> &'static [&'static str] {
        &["ollama"]
    }
}

/// Transport options shared by HTTP providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Base URL override; falls back to `OLLAMA_URL` then the default
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

impl ClientOptions {
    /// Resolve the endpoint to use for an Ollama server.
    pub fn ollama_url(&self) -> String {
        self.endpoint
            .clone()
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
