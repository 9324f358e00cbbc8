//! Vendor-agnostic request/response types and the binding trait

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, GatewayError};

/// A supported LLM API vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Vendor {
    Groq,
    GoogleAi,
    SambaNova,
    OpenRouter,
    /// Self-hosted or OpenAI-compatible server at a configured base URL
    Hosted,
}

impl Vendor {
    /// All vendors in default preference order
    pub const ALL: [Vendor; 5] = [
        Vendor::Groq,
        Vendor::GoogleAi,
        Vendor::SambaNova,
        Vendor::OpenRouter,
        Vendor::Hosted,
    ];

    /// Environment variable holding this vendor's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::GoogleAi => "GOOGLE_API_KEY",
            Self::SambaNova => "SAMBANOVA_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Hosted => "HOSTED_MODEL_API_KEY",
        }
    }

    /// Whether a call without an API key must be refused
    pub fn requires_key(&self) -> bool {
        !matches!(self, Self::Hosted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::GoogleAi => "googleai",
            Self::SambaNova => "sambanova",
            Self::OpenRouter => "openrouter",
            Self::Hosted => "hosted",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Vendor::ALL
            .into_iter()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| ConfigError::UnknownVendor(s.to_string()))
    }
}

impl TryFrom<String> for Vendor {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Vendor> for String {
    fn from(v: Vendor) -> String {
        v.as_str().to_string()
    }
}

/// One routable (vendor, model) target with its position in the cascade
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub vendor: Vendor,
    pub model: String,
    /// Lower runs first
    pub priority: u32,
}

impl Candidate {
    pub fn new(vendor: Vendor, model: impl Into<String>, priority: u32) -> Self {
        Self {
            vendor,
            model: model.into(),
            priority,
        }
    }

    /// Build a candidate list from (vendor, model) pairs, priority = position
    pub fn ranked<M: Into<String>>(pairs: impl IntoIterator<Item = (Vendor, M)>) -> Vec<Candidate> {
        pairs
            .into_iter()
            .enumerate()
            .map(|(i, (vendor, model))| Candidate::new(vendor, model, i as u32))
            .collect()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} (priority {})", self.vendor, self.model, self.priority)
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// Stop condition: a single string or a set of strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequence {
    One(String),
    Many(Vec<String>),
}

impl StopSequence {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

impl From<&str> for StopSequence {
    fn from(s: &str) -> Self {
        Self::One(s.to_string())
    }
}

impl From<Vec<String>> for StopSequence {
    fn from(v: Vec<String>) -> Self {
        Self::Many(v)
    }
}

/// A chat-completion request, independent of vendor.
///
/// `extra` is passed through verbatim into the vendor's JSON body and wins
/// over the typed fields on key conflicts. Use it for vendor-specific options
/// (e.g. `safetySettings` for Google AI, `provider` routing for OpenRouter).
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: f64,
    pub top_p: f64,
    pub n: u32,
    pub stop: Option<StopSequence>,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    /// Overrides the gateway's per-call timeout
    pub timeout: Option<Duration>,
    pub extra: Map<String, Value>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            max_tokens: None,
            temperature: 1.0,
            top_p: 1.0,
            n: 1,
            stop: None,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            timeout: None,
            extra: Map::new(),
        }
    }
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Single user-turn request
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::user(prompt)])
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_n(mut self, n: u32) -> Self {
        self.n = n;
        self
    }

    pub fn with_stop(mut self, stop: impl Into<StopSequence>) -> Self {
        self.stop = Some(stop.into());
        self
    }

    pub fn with_presence_penalty(mut self, penalty: f64) -> Self {
        self.presence_penalty = penalty;
        self
    }

    pub fn with_frequency_penalty(mut self, penalty: f64) -> Self {
        self.frequency_penalty = penalty;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Text of the last user message, if any
    pub fn last_user_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Normalized result of one successful call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub text: String,
    /// The vendor's untouched response payload
    pub raw: Value,
    pub vendor: Vendor,
    pub model: String,
}

/// A fully assembled outbound call, before it hits the wire
#[derive(Clone, PartialEq)]
pub struct VendorRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl fmt::Debug for VendorRequest {
    // url and headers may carry credentials
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorRequest")
            .field("headers", &self.headers.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("body", &self.body)
            .finish()
    }
}

/// Request building and response parsing for one vendor's wire format.
///
/// Bindings are pure: the gateway owns the HTTP client and performs exactly
/// one request per invocation with whatever the binding assembled.
pub trait VendorApi: Send + Sync + fmt::Debug {
    fn vendor(&self) -> Vendor;

    /// Assemble URL, headers (including auth) and JSON body
    fn build_request(
        &self,
        model: &str,
        request: &CompletionRequest,
        api_key: Option<&str>,
    ) -> Result<VendorRequest, GatewayError>;

    /// Extract the generated text from a success payload
    fn parse_text(&self, raw: &Value) -> Result<String, GatewayError>;
}

/// Merge pass-through parameters into a JSON object body, overwriting keys
pub(crate) fn merge_params(body: &mut Value, params: &Map<String, Value>) {
    if let Value::Object(obj) = body {
        for (k, v) in params {
            obj.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_round_trips_through_str() {
        for vendor in Vendor::ALL {
            assert_eq!(vendor.as_str().parse::<Vendor>().unwrap(), vendor);
        }
        assert_eq!("GoogleAI".parse::<Vendor>().unwrap(), Vendor::GoogleAi);
        assert!(matches!(
            "anthropic".parse::<Vendor>(),
            Err(ConfigError::UnknownVendor(_))
        ));
    }

    #[test]
    fn test_vendor_serde_names() {
        let json = serde_json::to_string(&Vendor::OpenRouter).unwrap();
        assert_eq!(json, "\"openrouter\"");
        let v: Vendor = serde_json::from_str("\"googleai\"").unwrap();
        assert_eq!(v, Vendor::GoogleAi);
    }

    #[test]
    fn test_vendor_serde_matches_from_str() {
        for name in ["GoogleAI", " SambaNova ", "OPENROUTER"] {
            let via_serde: Vendor = serde_json::from_value(serde_json::json!(name)).unwrap();
            assert_eq!(via_serde, name.parse::<Vendor>().unwrap());
        }
        assert!(serde_json::from_str::<Vendor>("\"anthropic\"").is_err());
    }

    #[test]
    fn test_only_hosted_key_is_optional() {
        assert!(Vendor::Groq.requires_key());
        assert!(Vendor::GoogleAi.requires_key());
        assert!(!Vendor::Hosted.requires_key());
    }

    #[test]
    fn test_request_defaults() {
        let req = CompletionRequest::from_prompt("hi");
        assert_eq!(req.temperature, 1.0);
        assert_eq!(req.top_p, 1.0);
        assert_eq!(req.n, 1);
        assert_eq!(req.presence_penalty, 0.0);
        assert_eq!(req.frequency_penalty, 0.0);
        assert!(req.max_tokens.is_none());
        assert!(req.stop.is_none());
        assert_eq!(req.last_user_prompt(), Some("hi"));
    }

    #[test]
    fn test_ranked_assigns_positions() {
        let candidates = Candidate::ranked([(Vendor::Groq, "a"), (Vendor::OpenRouter, "b")]);
        assert_eq!(candidates[0].priority, 0);
        assert_eq!(candidates[1].priority, 1);
        assert_eq!(candidates[1].vendor, Vendor::OpenRouter);
    }

    #[test]
    fn test_stop_sequence_serializes_untagged() {
        let one = serde_json::to_value(StopSequence::from("END")).unwrap();
        assert_eq!(one, serde_json::json!("END"));
        let many =
            serde_json::to_value(StopSequence::from(vec!["a".to_string(), "b".to_string()]))
                .unwrap();
        assert_eq!(many, serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_merge_params_overwrites() {
        let mut body = serde_json::json!({"temperature": 1.0, "model": "m"});
        let mut params = Map::new();
        params.insert("temperature".to_string(), serde_json::json!(0.2));
        params.insert("seed".to_string(), serde_json::json!(7));
        merge_params(&mut body, &params);
        assert_eq!(body["temperature"], serde_json::json!(0.2));
        assert_eq!(body["seed"], serde_json::json!(7));
        assert_eq!(body["model"], serde_json::json!("m"));
    }

    #[test]
    fn test_vendor_request_debug_hides_url_and_header_values() {
        let req = VendorRequest {
            url: "https://x/?key=AIza-secret".to_string(),
            headers: vec![("Authorization".to_string(), "Bearer gsk_secret".to_string())],
            body: Value::Null,
        };
        let debug = format!("{:?}", req);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("Authorization"));
    }
}
