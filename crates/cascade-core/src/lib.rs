//! cascade-core - Cascading chat completions across free-tier LLM APIs
//!
//! This crate provides:
//! - A provider gateway over Groq, Google AI, SambaNova, OpenRouter and self-hosted servers
//! - A cascade engine that falls back through ranked candidates, sequentially or racing
//! - Complexity routing: a cheap model rates the prompt and picks the candidate tier
//! - TOML configuration with per-vendor keys, endpoints and routing tables

pub mod cascade;
pub mod config;
pub mod error;
pub mod keys;
pub mod providers;
pub mod routing;

// Re-export main types for convenience
pub use cascade::{CascadeEngine, CascadeOutcome, CascadeSuccess, ConcurrencyPolicy};
pub use config::CascadeConfig;
pub use error::{
    CascadeError, CascadeFailure, ConfigError, FailedAttempt, GatewayError, RoutingError,
    TransportReason,
};
pub use keys::ApiKeyRegistry;
pub use providers::{
    Candidate, ChatMessage, ChatRole, CompletionGateway, CompletionRequest, CompletionResult,
    HostedBinding, HttpGateway, StopSequence, Vendor,
};
pub use routing::{RaterConfig, Rating, RatingPolicy};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Just verify that all main types are exported
        let _ = std::mem::size_of::<CascadeEngine>();
        let _ = std::mem::size_of::<HttpGateway>();
        let _ = std::mem::size_of::<ApiKeyRegistry>();
        let _ = std::mem::size_of::<CascadeConfig>();
        let _ = std::mem::size_of::<RatingPolicy>();
        let _ = std::mem::size_of::<CompletionRequest>();
    }
}
