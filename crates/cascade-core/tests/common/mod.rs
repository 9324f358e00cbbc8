#![allow(dead_code)]

use cascade_core::{ApiKeyRegistry, HostedBinding, HttpGateway, Vendor};
use serde_json::{Value, json};
use wiremock::MockServer;

/// Route test logs through the test harness; `RUST_LOG=debug` to see them
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn test_keys() -> ApiKeyRegistry {
    ApiKeyRegistry::builder()
        .load_from_env(false)
        .key(Vendor::Groq, "gsk_test")
        .key(Vendor::GoogleAi, "AIza-test")
        .key(Vendor::SambaNova, "sn-test")
        .key(Vendor::OpenRouter, "sk-or-test")
        .build()
        .expect("test keys")
}

/// Gateway with every vendor pointed at `server`
pub fn gateway_for(server: &MockServer) -> HttpGateway {
    let base = server.uri();
    HttpGateway::builder(test_keys())
        .base_url(Vendor::Groq, format!("{}/groq", base))
        .base_url(Vendor::SambaNova, format!("{}/sambanova", base))
        .base_url(Vendor::OpenRouter, format!("{}/openrouter", base))
        .base_url(Vendor::GoogleAi, format!("{}/google", base))
        .openrouter_attribution(Some("https://example.org".to_string()), Some("cascade".to_string()))
        .hosted(HostedBinding::new(&format!("{}/hosted", base)).expect("hosted url"))
        .build()
        .expect("gateway")
}

pub fn chat_completion(text: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }]
    })
}

pub fn gemini_response(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}
