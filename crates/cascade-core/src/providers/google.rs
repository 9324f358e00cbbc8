//! Google AI (Gemini) generateContent binding

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

use crate::error::GatewayError;

use super::types::{ChatRole, CompletionRequest, Vendor, VendorApi, VendorRequest, merge_params};

pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini binding; the API key travels as the `key` query parameter
#[derive(Debug, Clone)]
pub struct GoogleBinding {
    base_url: String,
}

impl Default for GoogleBinding {
    fn default() -> Self {
        Self::new(GOOGLE_BASE_URL)
    }
}

impl GoogleBinding {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert messages to Gemini `contents`; system turns are lifted into
    /// `systemInstruction` since Gemini has no system role.
    fn to_gemini_contents(request: &CompletionRequest) -> (Vec<GeminiContent>, Option<String>) {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();

        for msg in &request.messages {
            let role = match msg.role {
                ChatRole::System => {
                    system_parts.push(msg.content.clone());
                    continue;
                }
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            };
            contents.push(GeminiContent {
                role: role.to_string(),
                parts: vec![GeminiPart {
                    text: Some(msg.content.clone()),
                }],
            });
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (contents, system)
    }

    fn generation_config(request: &CompletionRequest) -> Value {
        let mut config = json!({
            "temperature": request.temperature,
            "topP": request.top_p,
            "candidateCount": request.n,
        });
        if let Some(max_tokens) = request.max_tokens {
            config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(stop) = &request.stop {
            config["stopSequences"] = json!(stop.to_vec());
        }
        // Several Gemini models reject penalty fields outright, so only send them when set
        if request.presence_penalty != 0.0 {
            config["presencePenalty"] = json!(request.presence_penalty);
        }
        if request.frequency_penalty != 0.0 {
            config["frequencyPenalty"] = json!(request.frequency_penalty);
        }
        config
    }

    fn endpoint(&self, model: &str, key: &str) -> Result<String, GatewayError> {
        let mut url = Url::parse(&format!(
            "{}/models/{}:generateContent",
            self.base_url, model
        ))
        .map_err(|e| GatewayError::InvalidRequest(format!("bad Google AI URL: {}", e)))?;
        url.query_pairs_mut().append_pair("key", key);
        Ok(url.into())
    }
}

impl VendorApi for GoogleBinding {
    fn vendor(&self) -> Vendor {
        Vendor::GoogleAi
    }

    fn build_request(
        &self,
        model: &str,
        request: &CompletionRequest,
        api_key: Option<&str>,
    ) -> Result<VendorRequest, GatewayError> {
        let key = api_key.ok_or(GatewayError::Auth(Vendor::GoogleAi))?;
        let (contents, system) = Self::to_gemini_contents(request);

        let mut body = json!({
            "contents": contents,
            "generationConfig": Self::generation_config(request),
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        merge_params(&mut body, &request.extra);

        Ok(VendorRequest {
            url: self.endpoint(model, key)?,
            headers: Vec::new(),
            body,
        })
    }

    fn parse_text(&self, raw: &Value) -> Result<String, GatewayError> {
        let resp = GeminiApiResponse::deserialize(raw).map_err(|e| {
            GatewayError::MalformedResponse(format!("not a Gemini response: {}", e))
        })?;

        let candidate = resp.candidates.into_iter().next().ok_or_else(|| {
            let reason = resp
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!(" (blocked: {})", r))
                .unwrap_or_default();
            GatewayError::MalformedResponse(format!("Gemini response had no candidates{}", reason))
        })?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GatewayError::MalformedResponse(format!(
                "Gemini candidate has no text (finishReason={})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}

// ── Gemini wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiPromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::ChatMessage;

    #[test]
    fn test_contents_roles_and_system_instruction() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
        ]);
        let built = GoogleBinding::default()
            .build_request("gemini-1.5-flash", &req, Some("AIza-test"))
            .unwrap();
        let contents = built.body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(built.body["systemInstruction"]["parts"][0]["text"], "sys");
    }

    #[test]
    fn test_no_system_instruction_without_system_message() {
        let built = GoogleBinding::default()
            .build_request("gemini-1.5-flash", &CompletionRequest::from_prompt("x"), Some("k"))
            .unwrap();
        assert!(built.body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_key_in_query_and_no_auth_header() {
        let built = GoogleBinding::default()
            .build_request("gemini-1.5-flash", &CompletionRequest::from_prompt("x"), Some("AIza k"))
            .unwrap();
        assert_eq!(
            built.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent?key=AIza+k"
        );
        assert!(built.headers.is_empty());
    }

    #[test]
    fn test_generation_config_mapping() {
        let req = CompletionRequest::from_prompt("x")
            .with_max_tokens(100)
            .with_top_p(0.5)
            .with_stop("END")
            .with_frequency_penalty(0.25);
        let built = GoogleBinding::default()
            .build_request("m", &req, Some("k"))
            .unwrap();
        let config = &built.body["generationConfig"];
        assert_eq!(config["maxOutputTokens"], json!(100));
        assert_eq!(config["topP"], json!(0.5));
        assert_eq!(config["candidateCount"], json!(1));
        assert_eq!(config["stopSequences"], json!(["END"]));
        assert_eq!(config["frequencyPenalty"], json!(0.25));
        assert!(config.get("presencePenalty").is_none());
    }

    #[test]
    fn test_missing_key() {
        assert_eq!(
            GoogleBinding::default()
                .build_request("m", &CompletionRequest::from_prompt("x"), None)
                .unwrap_err(),
            GatewayError::Auth(Vendor::GoogleAi)
        );
    }

    #[test]
    fn test_parse_joins_parts() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello"}, {"text": " world"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3}
        });
        assert_eq!(GoogleBinding::default().parse_text(&raw).unwrap(), "Hello world");
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let raw = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = GoogleBinding::default().parse_text(&raw).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_parse_candidate_without_text() {
        let raw = json!({"candidates": [{"finishReason": "MAX_TOKENS"}]});
        let err = GoogleBinding::default().parse_text(&raw).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(m) if m.contains("MAX_TOKENS")));
    }
}
