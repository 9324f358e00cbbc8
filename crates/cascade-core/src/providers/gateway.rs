//! Provider gateway: one outbound HTTP call per invocation, typed failures

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, GatewayError};
use crate::keys::ApiKeyRegistry;

use super::google::GoogleBinding;
use super::hosted::HostedBinding;
use super::openai_compat::OpenAiCompatBinding;
use super::types::{CompletionRequest, CompletionResult, Vendor, VendorApi, VendorRequest};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Uniform call surface over every vendor.
///
/// Implementations must not retry; fallback is the cascade engine's job.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn invoke(
        &self,
        vendor: Vendor,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, GatewayError>;
}

/// HTTP gateway backed by one shared `reqwest` client
pub struct HttpGateway {
    client: Client,
    keys: Arc<ApiKeyRegistry>,
    bindings: BTreeMap<Vendor, Box<dyn VendorApi>>,
    hosted: Option<HostedBinding>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("keys", &self.keys)
            .field("vendors", &self.bindings.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpGateway {
    pub fn builder(keys: ApiKeyRegistry) -> HttpGatewayBuilder {
        HttpGatewayBuilder::new(keys)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn keys(&self) -> &ApiKeyRegistry {
        &self.keys
    }

    /// Raw call against the hosted server: `POST {base_url}/{endpoint}` with
    /// `payload` as-is, returning the JSON response untouched.
    pub async fn call_hosted(
        &self,
        endpoint: &str,
        payload: Value,
        headers: &[(String, String)],
    ) -> Result<Value, GatewayError> {
        let hosted = self
            .hosted
            .as_ref()
            .ok_or(GatewayError::NotConfigured(Vendor::Hosted))?;
        let request = VendorRequest {
            url: hosted.url_for(endpoint),
            headers: hosted.headers_for(headers, self.keys.get(Vendor::Hosted)),
            body: payload,
        };
        debug!("Hosted request: endpoint={}", endpoint);
        self.send(Vendor::Hosted, request, self.timeout).await
    }

    /// Send one request, bounded by `timeout`, and decode the JSON body
    async fn send(
        &self,
        vendor: Vendor,
        request: VendorRequest,
        timeout: Duration,
    ) -> Result<Value, GatewayError> {
        let headers = to_header_map(&request.headers)?;

        let call = async {
            let response = self
                .client
                .post(&request.url)
                .headers(headers)
                .json(&request.body)
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;

            if !status.is_success() {
                debug!("{} returned status {}", vendor, status);
                return Err(GatewayError::Vendor {
                    status: status.as_u16(),
                    body,
                });
            }

            serde_json::from_str::<Value>(&body).map_err(|e| {
                GatewayError::MalformedResponse(format!("response is not JSON: {}", e))
            })
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::timeout(format!(
                "{} did not respond within {:?}",
                vendor, timeout
            ))),
        }
    }
}

#[async_trait]
impl CompletionGateway for HttpGateway {
    async fn invoke(
        &self,
        vendor: Vendor,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, GatewayError> {
        let binding = self
            .bindings
            .get(&vendor)
            .ok_or(GatewayError::NotConfigured(vendor))?;

        let api_key = self.keys.get(vendor);
        if api_key.is_none() && vendor.requires_key() {
            return Err(GatewayError::Auth(vendor));
        }

        let outbound = binding.build_request(model, request, api_key)?;
        let timeout = request.timeout.unwrap_or(self.timeout);

        debug!(
            "{} request: model={}, messages={}, timeout={:?}",
            vendor,
            model,
            request.messages.len(),
            timeout
        );

        let raw = self.send(vendor, outbound, timeout).await?;
        let text = binding.parse_text(&raw)?;

        debug!("{} response: model={}, chars={}", vendor, model, text.len());

        Ok(CompletionResult {
            text,
            raw,
            vendor,
            model: model.to_string(),
        })
    }
}

fn to_header_map(headers: &[(String, String)]) -> Result<HeaderMap, GatewayError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| GatewayError::InvalidRequest(format!("bad header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| GatewayError::InvalidRequest(format!("bad value for header {}: {}", name, e)))?;
        // later entries (auth) replace earlier ones of the same name
        map.insert(name, value);
    }
    Ok(map)
}

pub struct HttpGatewayBuilder {
    keys: ApiKeyRegistry,
    timeout: Duration,
    user_agent: Option<String>,
    base_urls: BTreeMap<Vendor, String>,
    openrouter_referer: Option<String>,
    openrouter_title: Option<String>,
    hosted: Option<HostedBinding>,
}

impl HttpGatewayBuilder {
    fn new(keys: ApiKeyRegistry) -> Self {
        Self {
            keys,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
            base_urls: BTreeMap::new(),
            openrouter_referer: None,
            openrouter_title: None,
            hosted: None,
        }
    }

    /// Per-call timeout; requests may override it individually
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Point a vendor at a different root (proxy, regional endpoint, test server).
    /// For `Vendor::Hosted` use [`hosted`](Self::hosted) instead.
    pub fn base_url(mut self, vendor: Vendor, base_url: impl Into<String>) -> Self {
        self.base_urls.insert(vendor, base_url.into());
        self
    }

    pub fn openrouter_attribution(mut self, referer: Option<String>, title: Option<String>) -> Self {
        self.openrouter_referer = referer;
        self.openrouter_title = title;
        self
    }

    pub fn hosted(mut self, hosted: HostedBinding) -> Self {
        self.hosted = Some(hosted);
        self
    }

    pub fn build(self) -> Result<HttpGateway, ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("gateway timeout must be non-zero".to_string()));
        }
        for (vendor, url) in &self.base_urls {
            if *vendor == Vendor::Hosted {
                return Err(ConfigError::Invalid(
                    "hosted base URL is set through the hosted binding".to_string(),
                ));
            }
            url::Url::parse(url).map_err(|e| ConfigError::InvalidBaseUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        }

        let mut bindings: BTreeMap<Vendor, Box<dyn VendorApi>> = BTreeMap::new();
        for vendor in Vendor::ALL {
            let override_url = self.base_urls.get(&vendor).cloned();
            let binding: Box<dyn VendorApi> = match vendor {
                Vendor::Groq => Box::new(with_override(OpenAiCompatBinding::groq(), override_url)),
                Vendor::SambaNova => {
                    Box::new(with_override(OpenAiCompatBinding::sambanova(), override_url))
                }
                Vendor::OpenRouter => Box::new(
                    with_override(OpenAiCompatBinding::openrouter(), override_url).with_attribution(
                        self.openrouter_referer.clone(),
                        self.openrouter_title.clone(),
                    ),
                ),
                Vendor::GoogleAi => Box::new(
                    override_url
                        .map(GoogleBinding::new)
                        .unwrap_or_default(),
                ),
                Vendor::Hosted => match &self.hosted {
                    Some(hosted) => Box::new(hosted.clone()),
                    None => continue,
                },
            };
            bindings.insert(binding.vendor(), binding);
        }

        let mut client = Client::builder();
        if let Some(user_agent) = &self.user_agent {
            client = client.user_agent(user_agent.clone());
        }
        let client = client
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(HttpGateway {
            client,
            keys: Arc::new(self.keys),
            bindings,
            hosted: self.hosted,
            timeout: self.timeout,
        })
    }
}

fn with_override(binding: OpenAiCompatBinding, base_url: Option<String>) -> OpenAiCompatBinding {
    match base_url {
        Some(url) => binding.with_base_url(url),
        None => binding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> ApiKeyRegistry {
        ApiKeyRegistry::builder()
            .load_from_env(false)
            .key(Vendor::Groq, "gsk_secret_value")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let gateway = HttpGateway::builder(keys()).build().unwrap();
        assert_eq!(gateway.timeout(), DEFAULT_TIMEOUT);
        assert!(gateway.bindings.contains_key(&Vendor::Groq));
        assert!(gateway.bindings.contains_key(&Vendor::GoogleAi));
        assert!(!gateway.bindings.contains_key(&Vendor::Hosted));
    }

    #[test]
    fn test_bindings_keyed_by_their_vendor() {
        let gateway = HttpGateway::builder(keys())
            .hosted(HostedBinding::new("http://localhost:8000").unwrap())
            .build()
            .unwrap();
        assert_eq!(gateway.bindings.len(), Vendor::ALL.len());
        for (vendor, binding) in &gateway.bindings {
            assert_eq!(*vendor, binding.vendor());
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = HttpGateway::builder(keys()).timeout(Duration::ZERO).build();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let result = HttpGateway::builder(keys())
            .base_url(Vendor::Groq, "::nope")
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_debug_hides_key() {
        let gateway = HttpGateway::builder(keys()).build().unwrap();
        let debug = format!("{:?}", gateway);
        assert!(!debug.contains("secret_value"));
    }

    #[test]
    fn test_header_map_last_wins() {
        let map = to_header_map(&[
            ("Authorization".to_string(), "Bearer a".to_string()),
            ("authorization".to_string(), "Bearer b".to_string()),
        ])
        .unwrap();
        assert_eq!(map.get("authorization").unwrap(), "Bearer b");
    }

    #[test]
    fn test_header_map_rejects_bad_name() {
        let err = to_header_map(&[("bad header".to_string(), "v".to_string())]).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_missing_key_short_circuits() {
        let gateway = HttpGateway::builder(keys()).build().unwrap();
        let err = gateway
            .invoke(Vendor::SambaNova, "m", &CompletionRequest::from_prompt("x"))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Auth(Vendor::SambaNova));
    }

    #[tokio::test]
    async fn test_hosted_not_configured() {
        let gateway = HttpGateway::builder(keys()).build().unwrap();
        let err = gateway
            .invoke(Vendor::Hosted, "m", &CompletionRequest::from_prompt("x"))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::NotConfigured(Vendor::Hosted));

        let err = gateway
            .call_hosted("generate", serde_json::json!({}), &[])
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::NotConfigured(Vendor::Hosted));
    }
}
