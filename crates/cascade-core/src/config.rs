//! TOML configuration for the gateway and the cascade
//!
//! ```toml
//! [gateway]
//! timeout_secs = 30
//!
//! [keys]
//! groq = "${GROQ_API_KEY}"
//!
//! [hosted]
//! base_url = "http://localhost:8000"
//!
//! [[candidates]]
//! vendor = "groq"
//! model = "llama-3.3-70b-versatile"
//!
//! [[candidates]]
//! vendor = "hosted"
//! model = "mistral-7b"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::cascade::ConcurrencyPolicy;
use crate::error::ConfigError;
use crate::keys::{ApiKeyRegistry, mask_secret};
use crate::providers::gateway::{DEFAULT_TIMEOUT, HttpGateway};
use crate::providers::hosted::{DEFAULT_HOSTED_ENDPOINT, HostedBinding};
use crate::providers::types::{Candidate, Vendor};
use crate::routing::{DEFAULT_RATER_MODEL, RaterConfig, Rating, RatingPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    /// Base-URL overrides keyed by vendor name
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
    #[serde(default)]
    pub hosted: Option<HostedConfig>,
    #[serde(default)]
    pub cascade: CascadeSection,
    #[serde(default)]
    pub routing: Option<RoutingConfig>,
    /// Default candidate list; priority follows position
    #[serde(default)]
    pub candidates: Vec<CandidateConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Explicit API keys; each one overrides the vendor's environment variable
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct KeysConfig {
    #[serde(default)]
    pub groq: Option<String>,
    #[serde(default)]
    pub googleai: Option<String>,
    #[serde(default)]
    pub sambanova: Option<String>,
    #[serde(default)]
    pub openrouter: Option<String>,
    #[serde(default)]
    pub hosted: Option<String>,
}

impl KeysConfig {
    fn entries(&self) -> impl Iterator<Item = (Vendor, &str)> {
        [
            (Vendor::Groq, &self.groq),
            (Vendor::GoogleAi, &self.googleai),
            (Vendor::SambaNova, &self.sambanova),
            (Vendor::OpenRouter, &self.openrouter),
            (Vendor::Hosted, &self.hosted),
        ]
        .into_iter()
        .filter_map(|(vendor, key)| key.as_deref().map(|k| (vendor, k)))
    }
}

impl std::fmt::Debug for KeysConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries().map(|(v, k)| (v, mask_secret(k))))
            .finish()
    }
}

/// Attribution headers OpenRouter shows on its leaderboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct HostedConfig {
    pub base_url: String,
    #[serde(default = "default_hosted_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Default body parameters merged into every hosted request
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl std::fmt::Debug for HostedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedConfig")
            .field("base_url", &self.base_url)
            .field("endpoint", &self.endpoint)
            .field(
                "headers",
                &self
                    .headers
                    .iter()
                    .map(|(name, value)| (name, mask_secret(value)))
                    .collect::<BTreeMap<_, _>>(),
            )
            .field("params", &self.params)
            .finish()
    }
}

fn default_hosted_endpoint() -> String {
    DEFAULT_HOSTED_ENDPOINT.to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    #[default]
    Sequential,
    Racing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeSection {
    #[serde(default)]
    pub concurrency: ConcurrencyMode,
    #[serde(default = "default_racing_width")]
    pub racing_width: usize,
}

impl Default for CascadeSection {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyMode::default(),
            racing_width: default_racing_width(),
        }
    }
}

fn default_racing_width() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Vendor of the rating model
    #[serde(default = "default_rater_vendor")]
    pub vendor: Vendor,
    #[serde(default = "default_rater_model")]
    pub model: String,
    #[serde(default)]
    pub fallback_rating: Option<Rating>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

fn default_rater_vendor() -> Vendor {
    Vendor::Groq
}

fn default_rater_model() -> String {
    DEFAULT_RATER_MODEL.to_string()
}

/// Ratings `min..=max` go to `candidates`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub min: u8,
    pub max: u8,
    pub candidates: Vec<CandidateConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub vendor: Vendor,
    pub model: String,
}

fn ranked(entries: &[CandidateConfig]) -> Vec<Candidate> {
    Candidate::ranked(entries.iter().map(|c| (c.vendor, c.model.clone())))
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".llm-cascade")
}

impl CascadeConfig {
    /// Load from `custom_path`, or `~/.llm-cascade/config.toml`
    pub fn load(custom_path: Option<&Path>) -> Result<Self> {
        let path = custom_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // Config may hold API keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain API keys. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    /// Parse TOML, expanding `${VAR}` references from the process environment
    pub fn parse(content: &str) -> Result<Self> {
        Self::parse_with(content, |name| std::env::var(name).ok())
    }

    /// Parse TOML, expanding `${VAR}` references through `lookup`
    pub fn parse_with<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        warn_hardcoded_keys(content);
        let expanded = expand_env_vars_with(content, lookup);
        let config: Self = toml::from_str(&expanded).context("Invalid cascade config")?;
        Ok(config)
    }

    /// Explicit keys first, the environment for the rest
    pub fn api_keys(&self) -> Result<ApiKeyRegistry, ConfigError> {
        self.api_keys_with(|name| std::env::var(name).ok())
    }

    pub fn api_keys_with<F>(&self, lookup: F) -> Result<ApiKeyRegistry, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.keys
            .entries()
            .fold(ApiKeyRegistry::builder(), |builder, (vendor, key)| {
                builder.key(vendor, key)
            })
            .build_with(lookup)
    }

    pub fn gateway(&self, keys: ApiKeyRegistry) -> Result<HttpGateway, ConfigError> {
        let mut builder = HttpGateway::builder(keys)
            .timeout(Duration::from_secs(self.gateway.timeout_secs))
            .openrouter_attribution(self.openrouter.referer.clone(), self.openrouter.title.clone());

        if let Some(user_agent) = &self.gateway.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        for (name, url) in &self.endpoints {
            builder = builder.base_url(name.parse()?, url.clone());
        }
        if let Some(hosted) = &self.hosted {
            builder = builder.hosted(hosted.binding()?);
        }
        builder.build()
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        ranked(&self.candidates)
    }

    pub fn concurrency(&self) -> Result<ConcurrencyPolicy, ConfigError> {
        match self.cascade.concurrency {
            ConcurrencyMode::Sequential => Ok(ConcurrencyPolicy::Sequential),
            ConcurrencyMode::Racing if self.cascade.racing_width == 0 => Err(ConfigError::Invalid(
                "cascade.racing_width must be at least 1".to_string(),
            )),
            ConcurrencyMode::Racing => Ok(ConcurrencyPolicy::Racing {
                width: self.cascade.racing_width,
            }),
        }
    }

    pub fn rater(&self) -> RaterConfig {
        self.routing
            .as_ref()
            .map(|r| RaterConfig {
                vendor: r.vendor,
                model: r.model.clone(),
            })
            .unwrap_or_default()
    }

    /// `None` when no `[routing]` section is present
    pub fn rating_policy(&self) -> Result<Option<RatingPolicy>, ConfigError> {
        let Some(routing) = &self.routing else {
            return Ok(None);
        };

        let mut policy = RatingPolicy::new();
        for route in &routing.routes {
            if Rating::new(route.min).is_none() || Rating::new(route.max).is_none() || route.min > route.max {
                return Err(ConfigError::Invalid(format!(
                    "routing route {}..={} must lie within 1..=5",
                    route.min, route.max
                )));
            }
            policy = policy.route(route.min..=route.max, ranked(&route.candidates));
        }
        if let Some(rating) = routing.fallback_rating {
            policy = policy.with_fallback_rating(rating);
        }
        Ok(Some(policy))
    }
}

impl HostedConfig {
    pub fn binding(&self) -> Result<HostedBinding, ConfigError> {
        let binding = HostedBinding::new(&self.base_url)?.with_endpoint(self.endpoint.clone());
        let binding = self
            .headers
            .iter()
            .fold(binding, |b, (name, value)| b.with_header(name.clone(), value.clone()));
        Ok(self
            .params
            .iter()
            .fold(binding, |b, (key, value)| b.with_param(key.clone(), value.clone())))
    }
}

/// Environment variables that may be expanded in config files
fn allowed_env_var(name: &str) -> bool {
    Vendor::ALL.iter().any(|v| v.env_var() == name) || matches!(name, "HOME" | "USER")
}

fn warn_hardcoded_keys(raw: &str) {
    let Ok(table) = raw.parse::<toml::Table>() else {
        return;
    };
    let Some(keys) = table.get("keys").and_then(|k| k.as_table()) else {
        return;
    };
    for (vendor, value) in keys {
        let hardcoded = value
            .as_str()
            .is_some_and(|key| !key.is_empty() && !key.contains("${"));
        if hardcoded {
            warn!(
                "API key for {} is hardcoded in config file. For security, use environment variables: {} = \"${{{}}}\"",
                vendor,
                vendor,
                vendor
                    .parse::<Vendor>()
                    .map(|v| v.env_var())
                    .unwrap_or("API_KEY")
            );
        }
    }
}

fn expand_env_vars_with<F>(s: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !allowed_env_var(&var_name) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let value = lookup(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}
