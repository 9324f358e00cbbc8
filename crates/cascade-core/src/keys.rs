//! Per-vendor API key registry.
//!
//! Keys are resolved once: an explicit key always wins, otherwise the vendor's
//! environment variable is consulted (when enabled). The registry never
//! changes afterwards and is shared read-only between concurrent attempts.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::ConfigError;
use crate::providers::types::{Candidate, Vendor};

#[derive(Clone, Default)]
pub struct ApiKeyRegistry {
    keys: BTreeMap<Vendor, String>,
}

impl fmt::Debug for ApiKeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.keys.iter().map(|(v, k)| (v, mask_secret(k))))
            .finish()
    }
}

impl ApiKeyRegistry {
    pub fn builder() -> ApiKeyRegistryBuilder {
        ApiKeyRegistryBuilder::default()
    }

    /// Resolve every vendor from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    pub fn get(&self, vendor: Vendor) -> Option<&str> {
        self.keys.get(&vendor).map(String::as_str)
    }

    pub fn contains(&self, vendor: Vendor) -> bool {
        self.keys.contains_key(&vendor)
    }

    /// Vendors with a key, in default preference order
    pub fn available(&self) -> Vec<Vendor> {
        self.keys.keys().copied().collect()
    }

    /// One candidate per available vendor that has a model in `models`,
    /// ranked in default preference order.
    pub fn candidates(&self, models: &BTreeMap<Vendor, String>) -> Vec<Candidate> {
        Candidate::ranked(
            self.available()
                .into_iter()
                .filter_map(|v| models.get(&v).map(|m| (v, m.clone()))),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ApiKeyRegistryBuilder {
    explicit: BTreeMap<Vendor, String>,
    load_from_env: bool,
}

impl Default for ApiKeyRegistryBuilder {
    fn default() -> Self {
        Self {
            explicit: BTreeMap::new(),
            load_from_env: true,
        }
    }
}

impl ApiKeyRegistryBuilder {
    /// Explicit key; blank strings are treated as absent
    pub fn key(mut self, vendor: Vendor, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.explicit.insert(vendor, key);
        }
        self
    }

    pub fn load_from_env(mut self, enabled: bool) -> Self {
        self.load_from_env = enabled;
        self
    }

    pub fn build(self) -> Result<ApiKeyRegistry, ConfigError> {
        self.build_with(|name| std::env::var(name).ok())
    }

    /// Build using `lookup` in place of the process environment
    pub fn build_with<F>(self, lookup: F) -> Result<ApiKeyRegistry, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut keys = self.explicit;

        if self.load_from_env {
            for vendor in Vendor::ALL {
                if keys.contains_key(&vendor) {
                    continue;
                }
                if let Some(key) = lookup(vendor.env_var()).filter(|k| !k.trim().is_empty()) {
                    debug!("Loaded {} key from {}", vendor, vendor.env_var());
                    keys.insert(vendor, key);
                }
            }
        }

        if keys.is_empty() {
            return Err(ConfigError::NoApiKeys);
        }
        debug!(
            "API keys available for: {}",
            keys.keys().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(ApiKeyRegistry { keys })
    }
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
pub(crate) fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_no_keys_fails() {
        let result = ApiKeyRegistry::builder().build_with(env(&[]));
        assert_eq!(result.unwrap_err(), ConfigError::NoApiKeys);
    }

    #[test]
    fn test_env_keys_loaded() {
        let registry = ApiKeyRegistry::builder()
            .build_with(env(&[("GROQ_API_KEY", "gsk_1"), ("OPENROUTER_API_KEY", "sk-or-1")]))
            .unwrap();
        assert_eq!(registry.get(Vendor::Groq), Some("gsk_1"));
        assert_eq!(registry.get(Vendor::OpenRouter), Some("sk-or-1"));
        assert_eq!(registry.get(Vendor::GoogleAi), None);
        assert_eq!(registry.available(), vec![Vendor::Groq, Vendor::OpenRouter]);
    }

    #[test]
    fn test_explicit_overrides_env() {
        let registry = ApiKeyRegistry::builder()
            .key(Vendor::Groq, "explicit")
            .build_with(env(&[("GROQ_API_KEY", "from-env")]))
            .unwrap();
        assert_eq!(registry.get(Vendor::Groq), Some("explicit"));
    }

    #[test]
    fn test_env_disabled() {
        let result = ApiKeyRegistry::builder()
            .load_from_env(false)
            .build_with(env(&[("GROQ_API_KEY", "gsk")]));
        assert_eq!(result.unwrap_err(), ConfigError::NoApiKeys);
    }

    #[test]
    fn test_blank_keys_ignored() {
        let result = ApiKeyRegistry::builder()
            .key(Vendor::SambaNova, "   ")
            .build_with(env(&[("GOOGLE_API_KEY", "")]));
        assert_eq!(result.unwrap_err(), ConfigError::NoApiKeys);
    }

    #[test]
    fn test_candidates_follow_available_vendors() {
        let registry = ApiKeyRegistry::builder()
            .load_from_env(false)
            .key(Vendor::OpenRouter, "k1")
            .key(Vendor::Groq, "k2")
            .build()
            .unwrap();
        let mut models = BTreeMap::new();
        models.insert(Vendor::Groq, "llama-3.3-70b-versatile".to_string());
        models.insert(Vendor::OpenRouter, "meta-llama/llama-3.2-3b-instruct:free".to_string());
        models.insert(Vendor::GoogleAi, "gemini-1.5-flash".to_string());

        let candidates = registry.candidates(&models);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].vendor, Vendor::Groq);
        assert_eq!(candidates[0].priority, 0);
        assert_eq!(candidates[1].vendor, Vendor::OpenRouter);
        assert_eq!(candidates[1].priority, 1);
    }

    #[test]
    fn test_debug_masks_keys() {
        let registry = ApiKeyRegistry::builder()
            .load_from_env(false)
            .key(Vendor::Groq, "gsk_verysecretvalue")
            .build()
            .unwrap();
        let debug = format!("{:?}", registry);
        assert!(!debug.contains("verysecret"));
        assert!(debug.contains("gsk...alue"));
    }

    #[test]
    fn test_mask_secret_short() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("abc"), "***");
    }
}
