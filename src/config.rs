//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Inference backend configuration
    pub backend: BackendConfig,
    /// Retriever configuration
    pub retriever: RetrieverConfig,
    /// Prompt augmentation configuration
    pub augment: AugmentConfig,
    /// Session configuration
    pub session: SessionConfig,
    /// API authentication configuration
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Inference backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the Ollama-compatible backend
    pub url: String,
    /// Default model when the request does not name one
    pub default_model: String,
    /// Read timeout between backend stream chunks (in seconds)
    pub timeout_secs: u64,
    /// Connect timeout for backend and retriever calls (in seconds)
    pub connect_timeout_secs: u64,
}

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Base URL of the retriever service
    pub url: String,
    /// Number of chunks to request per query
    pub top_k: usize,
    /// Minimum relevance score; chunks below this are discarded
    pub score_threshold: f32,
    /// Timeout for retrieval calls (in seconds)
    pub timeout_secs: u64,
}

/// Prompt augmentation configuration
#[derive(Debug, Clone)]
pub struct AugmentConfig {
    /// System prompt prepended to every conversation
    pub system_prompt: String,
    /// Character budget for the retrieved-context block
    pub context_budget_chars: usize,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum number of messages retained per session context
    pub max_context_size: usize,
}

/// API authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Whether the chat and session routes require an API key
    pub require_api_key: bool,
    /// The expected API key; requests are rejected when unset but required
    pub api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            backend: BackendConfig {
                url: env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
                default_model: env::var("MODEL_NAME").unwrap_or_else(|_| "llama3.2".to_string()),
                timeout_secs: env::var("BACKEND_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(240),
                connect_timeout_secs: env::var("CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(10),
            },
            retriever: RetrieverConfig {
                url: env::var("RETRIEVER_URL")
                    .unwrap_or_else(|_| "http://localhost:9200".to_string()),
                top_k: env::var("RETRIEVER_TOP_K")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(5),
                score_threshold: env::var("RETRIEVER_SCORE_THRESHOLD")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0.0),
                timeout_secs: env::var("RETRIEVER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(30),
            },
            augment: AugmentConfig {
                system_prompt: env::var("SYSTEM_PROMPT")
                    .unwrap_or_else(|_| "You are a helpful assistant.".to_string()),
                context_budget_chars: env::var("CONTEXT_BUDGET_CHARS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(8000),
            },
            session: SessionConfig {
                max_context_size: env::var("MAX_CONTEXT_SIZE")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(20),
            },
            auth: AuthConfig {
                require_api_key: env::var("REQUIRE_API_KEY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(false),
                api_key: env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
