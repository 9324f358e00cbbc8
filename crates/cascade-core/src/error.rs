//! Error taxonomy for the gateway, the cascade engine and configuration

use std::fmt;

use thiserror::Error;

use crate::providers::types::{Candidate, Vendor};

/// Why an HTTP call could not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportReason {
    Timeout,
    Connect,
    Other,
}

impl fmt::Display for TransportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connect => write!(f, "connect"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Failure of a single gateway invocation.
///
/// Every variant is an attempt failure from the cascade's point of view:
/// the engine records it and moves on to the next candidate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// No API key is configured for the vendor.
    #[error("no API key configured for {0}")]
    Auth(Vendor),

    /// The HTTP call could not complete (network failure, timeout).
    #[error("transport error ({reason}): {message}")]
    Transport {
        reason: TransportReason,
        message: String,
    },

    /// The vendor answered with a non-success HTTP status.
    #[error("vendor returned status {status}: {body}")]
    Vendor { status: u16, body: String },

    /// The success response does not have the expected completion shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The outbound request could not be assembled (bad header, bad URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The vendor has no binding (hosted server without a base URL).
    #[error("vendor {0} is not configured")]
    NotConfigured(Vendor),
}

impl GatewayError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Transport {
            reason: TransportReason::Timeout,
            message: message.into(),
        }
    }

    /// Whether the failure is likely transient (worth trying again later or
    /// elsewhere). Auth and request-shape failures would fail identically.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Vendor { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::MalformedResponse(_) => true,
            Self::Auth(_) | Self::InvalidRequest(_) | Self::NotConfigured(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                reason: TransportReason::Timeout,
                ..
            }
        )
    }

    /// HTTP status for vendor errors
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Vendor { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            TransportReason::Timeout
        } else if err.is_connect() {
            TransportReason::Connect
        } else {
            TransportReason::Other
        };
        // without_url keeps query-string credentials (Google AI) out of messages
        Self::Transport {
            reason,
            message: err.without_url().to_string(),
        }
    }
}

/// One failed candidate attempt
#[derive(Debug, Clone, PartialEq)]
pub struct FailedAttempt {
    pub candidate: Candidate,
    pub error: GatewayError,
}

/// Every candidate was tried and none succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeFailure {
    /// Attempts in priority order
    pub attempts: Vec<FailedAttempt>,
}

impl CascadeFailure {
    /// Vendors that were tried, in order
    pub fn vendors(&self) -> Vec<Vendor> {
        self.attempts.iter().map(|a| a.candidate.vendor).collect()
    }
}

impl fmt::Display for CascadeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no candidates to try");
        }
        write!(f, "all {} candidates failed", self.attempts.len())?;
        for attempt in &self.attempts {
            write!(
                f,
                "; {}/{}: {}",
                attempt.candidate.vendor, attempt.candidate.model, attempt.error
            )?;
        }
        Ok(())
    }
}

/// The rating call that picks a candidate list failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    #[error("rating call to {vendor}/{model} failed: {source}")]
    RaterFailed {
        vendor: Vendor,
        model: String,
        #[source]
        source: GatewayError,
    },

    #[error("could not parse a 1-5 rating from {0:?}")]
    UnparsableRating(String),

    #[error("no candidates routed for rating {0}")]
    NoRoute(u8),

    /// Routing needs user text to rate
    #[error("request has no user prompt to rate")]
    NoPrompt,
}

/// Terminal failure of a cascade run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CascadeError {
    #[error("{0}")]
    Exhausted(CascadeFailure),

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

impl CascadeError {
    /// Attempt log, empty for routing failures
    pub fn attempts(&self) -> &[FailedAttempt] {
        match self {
            Self::Exhausted(failure) => &failure.attempts,
            Self::Routing(_) => &[],
        }
    }
}

/// Construction-time configuration problems
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(
        "no API keys configured; provide one explicitly or set GROQ_API_KEY, GOOGLE_API_KEY, \
         SAMBANOVA_API_KEY, OPENROUTER_API_KEY or HOSTED_MODEL_API_KEY"
    )]
    NoApiKeys,

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("unknown vendor {0:?}")]
    UnknownVendor(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
