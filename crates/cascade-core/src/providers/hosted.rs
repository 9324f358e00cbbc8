//! Generic binding for self-hosted or OpenAI-compatible model servers.
//!
//! Posts to `{base_url}/{endpoint}` with optional bearer auth, custom headers
//! and a configured parameter bag merged into every body.

use serde_json::{Map, Value, json};
use url::Url;

use crate::error::{ConfigError, GatewayError};

use super::types::{CompletionRequest, Vendor, VendorApi, VendorRequest, merge_params};

pub const DEFAULT_HOSTED_ENDPOINT: &str = "generate";

/// Response paths probed in order for the generated text
const TEXT_POINTERS: &[&str] = &[
    "/choices/0/message/content",
    "/choices/0/text",
    "/text",
    "/generated_text",
    "/0/generated_text",
    "/response",
    "/content",
    "/message/content",
];

#[derive(Debug, Clone)]
pub struct HostedBinding {
    base_url: String,
    endpoint: String,
    headers: Vec<(String, String)>,
    params: Map<String, Value>,
}

impl HostedBinding {
    /// Validates the base URL up front so request building cannot fail on it
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoint: DEFAULT_HOSTED_ENDPOINT.to_string(),
            headers: Vec::new(),
            params: Map::new(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_start_matches('/').to_string();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Default body parameter; request `extra` still wins on conflict
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    pub fn url(&self) -> String {
        self.url_for(&self.endpoint)
    }

    /// Headers for a call: configured ones, per-call ones, then auth
    pub(crate) fn headers_for(
        &self,
        per_call: &[(String, String)],
        api_key: Option<&str>,
    ) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        headers.extend(per_call.iter().cloned());
        if let Some(key) = api_key {
            headers.push(("Authorization".to_string(), format!("Bearer {}", key)));
        }
        headers
    }
}

impl VendorApi for HostedBinding {
    fn vendor(&self) -> Vendor {
        Vendor::Hosted
    }

    fn build_request(
        &self,
        model: &str,
        request: &CompletionRequest,
        api_key: Option<&str>,
    ) -> Result<VendorRequest, GatewayError> {
        let mut body = json!({
            "messages": request.messages,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "n": request.n,
        });
        if !model.is_empty() {
            body["model"] = json!(model);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(stop) = &request.stop {
            body["stop"] = json!(stop);
        }
        if request.presence_penalty != 0.0 {
            body["presence_penalty"] = json!(request.presence_penalty);
        }
        if request.frequency_penalty != 0.0 {
            body["frequency_penalty"] = json!(request.frequency_penalty);
        }
        merge_params(&mut body, &self.params);
        merge_params(&mut body, &request.extra);

        Ok(VendorRequest {
            url: self.url(),
            headers: self.headers_for(&[], api_key),
            body,
        })
    }

    fn parse_text(&self, raw: &Value) -> Result<String, GatewayError> {
        TEXT_POINTERS
            .iter()
            .find_map(|p| raw.pointer(p).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::MalformedResponse(
                    "hosted response has no recognizable text field".to_string(),
                )
            })
    }
}
