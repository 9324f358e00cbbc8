//! OpenAI-compatible chat-completions binding for Groq, SambaNova and OpenRouter.
//!
//! All three speak the OpenAI wire format behind a bearer token; they differ
//! only in base URL and, for OpenRouter, optional attribution headers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

use super::types::{
    ChatMessage, CompletionRequest, StopSequence, Vendor, VendorApi, VendorRequest, merge_params,
};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const SAMBANOVA_BASE_URL: &str = "https://api.sambanova.ai/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Binding for a vendor exposing `POST {base_url}/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiCompatBinding {
    vendor: Vendor,
    base_url: String,
    extra_headers: Vec<(String, String)>,
}

impl OpenAiCompatBinding {
    pub fn new(vendor: Vendor, base_url: impl Into<String>) -> Self {
        Self {
            vendor,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            extra_headers: Vec::new(),
        }
    }

    pub fn groq() -> Self {
        Self::new(Vendor::Groq, GROQ_BASE_URL)
    }

    pub fn sambanova() -> Self {
        Self::new(Vendor::SambaNova, SAMBANOVA_BASE_URL)
    }

    pub fn openrouter() -> Self {
        Self::new(Vendor::OpenRouter, OPENROUTER_BASE_URL)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// OpenRouter app attribution (`HTTP-Referer` / `X-Title`)
    pub fn with_attribution(mut self, referer: Option<String>, title: Option<String>) -> Self {
        if let Some(referer) = referer {
            self.extra_headers.push(("HTTP-Referer".to_string(), referer));
        }
        if let Some(title) = title {
            self.extra_headers.push(("X-Title".to_string(), title));
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn to_body(model: &str, request: &CompletionRequest) -> Result<Value, GatewayError> {
        let body = ChatCompletionBody {
            model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            n: request.n,
            stop: request.stop.as_ref(),
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
        };
        let mut value = serde_json::to_value(body)
            .map_err(|e| GatewayError::InvalidRequest(format!("cannot encode body: {}", e)))?;
        merge_params(&mut value, &request.extra);
        Ok(value)
    }
}

impl VendorApi for OpenAiCompatBinding {
    fn vendor(&self) -> Vendor {
        self.vendor
    }

    fn build_request(
        &self,
        model: &str,
        request: &CompletionRequest,
        api_key: Option<&str>,
    ) -> Result<VendorRequest, GatewayError> {
        let key = api_key.ok_or(GatewayError::Auth(self.vendor))?;

        let mut headers = self.extra_headers.clone();
        headers.push(("Authorization".to_string(), format!("Bearer {}", key)));

        Ok(VendorRequest {
            url: format!("{}/chat/completions", self.base_url),
            headers,
            body: Self::to_body(model, request)?,
        })
    }

    fn parse_text(&self, raw: &Value) -> Result<String, GatewayError> {
        parse_chat_completion(raw)
    }
}

/// Text of the first choice of an OpenAI-style chat completion
pub(crate) fn parse_chat_completion(raw: &Value) -> Result<String, GatewayError> {
    let resp = ChatCompletionResponse::deserialize(raw).map_err(|e| {
        GatewayError::MalformedResponse(format!("not a chat completion: {}", e))
    })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::MalformedResponse("response had no choices".to_string()))?;

    choice
        .message
        .content
        .ok_or_else(|| GatewayError::MalformedResponse("first choice has no content".to_string()))
}

// ── OpenAI wire types ──

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f64,
    top_p: f64,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a StopSequence>,
    presence_penalty: f64,
    frequency_penalty: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
