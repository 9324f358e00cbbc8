//! Cascade engine with sequential or racing fallback across candidates

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use crate::config::CascadeConfig;
use crate::error::{CascadeError, CascadeFailure, ConfigError, FailedAttempt, GatewayError, RoutingError};
use crate::providers::gateway::CompletionGateway;
use crate::providers::types::{Candidate, CompletionRequest, CompletionResult, Vendor};
use crate::routing::{RaterConfig, Rating, RatingPolicy, parse_rating, rating_request};

/// How many candidates may be in flight at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyPolicy {
    /// One call at a time in priority order
    #[default]
    Sequential,
    /// Keep up to `width` calls in flight; the first success wins and the
    /// rest are cancelled.
    Racing { width: usize },
}

/// A successful cascade run
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeSuccess {
    pub result: CompletionResult,
    /// Candidates that failed during the run, in priority order
    pub failed_attempts: Vec<FailedAttempt>,
    /// Rating that selected the candidate list, for routed runs
    pub rating: Option<Rating>,
}

pub type CascadeOutcome = Result<CascadeSuccess, CascadeError>;

/// Runs a request against an ordered list of candidates until one succeeds
pub struct CascadeEngine {
    gateway: Arc<dyn CompletionGateway>,
    concurrency: ConcurrencyPolicy,
    rater: RaterConfig,
    candidates: Vec<Candidate>,
    policy: Option<RatingPolicy>,
}

impl CascadeEngine {
    pub fn new(gateway: Arc<dyn CompletionGateway>) -> Self {
        Self {
            gateway,
            concurrency: ConcurrencyPolicy::Sequential,
            rater: RaterConfig::default(),
            candidates: Vec::new(),
            policy: None,
        }
    }

    /// Engine over an [`HttpGateway`] built from `config`, keys from the process environment
    pub fn from_config(config: &CascadeConfig) -> Result<Self, ConfigError> {
        Self::from_config_with(config, |name| std::env::var(name).ok())
    }

    /// Like [`from_config`](Self::from_config) with `lookup` in place of the environment
    pub fn from_config_with<F>(config: &CascadeConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let keys = config.api_keys_with(lookup)?;
        let gateway = config.gateway(keys)?;
        let mut engine = Self::new(Arc::new(gateway))
            .with_concurrency(config.concurrency()?)?
            .with_rater(config.rater())
            .with_candidates(config.candidates());
        if let Some(policy) = config.rating_policy()? {
            engine = engine.with_policy(policy);
        }
        Ok(engine)
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyPolicy) -> Result<Self, ConfigError> {
        if let ConcurrencyPolicy::Racing { width: 0 } = concurrency {
            return Err(ConfigError::Invalid("racing width must be at least 1".to_string()));
        }
        self.concurrency = concurrency;
        Ok(self)
    }

    pub fn with_rater(mut self, rater: RaterConfig) -> Self {
        self.rater = rater;
        self
    }

    /// Candidates used by [`run`](Self::run) when no policy is set
    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Route [`run`](Self::run) through a rating call
    pub fn with_policy(mut self, policy: RatingPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn concurrency(&self) -> ConcurrencyPolicy {
        self.concurrency
    }

    pub fn rater(&self) -> &RaterConfig {
        &self.rater
    }

    /// One call to one (vendor, model), no fallback
    pub async fn invoke_single(
        &self,
        vendor: Vendor,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, GatewayError> {
        self.gateway.invoke(vendor, model, request).await
    }

    /// Cascade with the engine's own setup: routed on the last user message
    /// when a policy is set, otherwise over the default candidates.
    pub async fn run(&self, request: &CompletionRequest) -> CascadeOutcome {
        match &self.policy {
            Some(policy) => {
                let prompt = request.last_user_prompt().ok_or(RoutingError::NoPrompt)?;
                self.complete_routed(prompt, policy, request).await
            }
            None => self.complete(&self.candidates, request).await,
        }
    }

    /// Try `candidates` in priority order; equal priorities keep list order.
    pub async fn complete(&self, candidates: &[Candidate], request: &CompletionRequest) -> CascadeOutcome {
        let mut ordered = candidates.to_vec();
        ordered.sort_by_key(|c| c.priority);

        if ordered.is_empty() {
            warn!("Cascade called with no candidates");
            return Err(CascadeError::Exhausted(CascadeFailure::default()));
        }

        match self.concurrency {
            ConcurrencyPolicy::Sequential => self.run_sequential(ordered, request).await,
            ConcurrencyPolicy::Racing { width } => self.run_racing(ordered, request, width).await,
        }
    }

    /// Rate the prompt, pick the candidate list for that rating, cascade over it.
    ///
    /// A failed or unparsable rating call never reaches the primary candidates.
    pub async fn complete_routed(
        &self,
        user_prompt: &str,
        policy: &RatingPolicy,
        request: &CompletionRequest,
    ) -> CascadeOutcome {
        if user_prompt.trim().is_empty() {
            return Err(RoutingError::NoPrompt.into());
        }

        let rating = match self.rate(user_prompt).await {
            Ok(rating) => rating,
            Err(RoutingError::UnparsableRating(reply)) => match policy.fallback_rating() {
                Some(fallback) => {
                    warn!(
                        "Rater reply {:?} is not a rating, using fallback rating {}",
                        reply, fallback
                    );
                    fallback
                }
                None => return Err(RoutingError::UnparsableRating(reply).into()),
            },
            Err(e) => return Err(e.into()),
        };

        let candidates = policy
            .candidates_for(rating)
            .ok_or(RoutingError::NoRoute(rating.value()))?;

        info!("Prompt rated {}, routing to {} candidate(s)", rating, candidates.len());

        let mut success = self.complete(candidates, request).await?;
        success.rating = Some(rating);
        Ok(success)
    }

    /// Ask the configured rater for a 1–5 difficulty rating
    pub async fn rate(&self, user_prompt: &str) -> Result<Rating, RoutingError> {
        let RaterConfig { vendor, model } = &self.rater;
        debug!("Rating prompt with {}/{}", vendor, model);

        let reply = self
            .gateway
            .invoke(*vendor, model, &rating_request(user_prompt))
            .await
            .map_err(|source| {
                warn!("Rating call to {}/{} failed: {}", vendor, model, source);
                RoutingError::RaterFailed {
                    vendor: *vendor,
                    model: model.clone(),
                    source,
                }
            })?;

        parse_rating(&reply.text)
    }

    async fn run_sequential(&self, ordered: Vec<Candidate>, request: &CompletionRequest) -> CascadeOutcome {
        let total = ordered.len();
        let mut attempts = Vec::new();

        for (idx, candidate) in ordered.into_iter().enumerate() {
            debug!("Trying {} ({}/{})", candidate, idx + 1, total);

            match self
                .gateway
                .invoke(candidate.vendor, &candidate.model, request)
                .await
            {
                Ok(result) => {
                    if idx > 0 {
                        info!(
                            "Request succeeded on fallback candidate {}/{}",
                            candidate.vendor, candidate.model
                        );
                    }
                    return Ok(CascadeSuccess {
                        result,
                        failed_attempts: attempts,
                        rating: None,
                    });
                }
                Err(error) => {
                    warn!(
                        "Candidate {}/{} failed (retryable={}): {}",
                        candidate.vendor,
                        candidate.model,
                        error.is_retryable(),
                        error
                    );
                    attempts.push(FailedAttempt { candidate, error });
                }
            }
        }

        Err(CascadeError::Exhausted(CascadeFailure { attempts }))
    }

    async fn run_racing(
        &self,
        ordered: Vec<Candidate>,
        request: &CompletionRequest,
        width: usize,
    ) -> CascadeOutcome {
        let total = ordered.len();
        let mut pending = ordered.into_iter().enumerate();
        let mut attempts: Vec<(usize, FailedAttempt)> = Vec::new();
        let mut in_flight = FuturesUnordered::new();

        let launch = |(position, candidate): (usize, Candidate)| {
            let gateway = Arc::clone(&self.gateway);
            async move {
                let result = gateway
                    .invoke(candidate.vendor, &candidate.model, request)
                    .await;
                (position, candidate, result)
            }
        };

        for next in pending.by_ref().take(width.max(1)) {
            in_flight.push(launch(next));
        }
        debug!("Racing {} of {} candidates", in_flight.len(), total);

        while let Some(first) = in_flight.next().await {
            let mut winners: Vec<_> = settle(first, &mut attempts).into_iter().collect();
            if winners.is_empty() {
                if let Some(next) = pending.next() {
                    in_flight.push(launch(next));
                }
                continue;
            }

            // Anything that finished alongside the first success competes on priority
            while let Some(Some(done)) = in_flight.next().now_or_never() {
                winners.extend(settle(done, &mut attempts));
            }
            winners.sort_by_key(|(priority, position, _)| (*priority, *position));
            let (_, position, result) = winners.remove(0);

            if !in_flight.is_empty() {
                debug!("Cancelling {} in-flight attempt(s)", in_flight.len());
            }
            drop(in_flight);

            if position > 0 {
                info!(
                    "Request won by fallback candidate {}/{}",
                    result.vendor, result.model
                );
            }
            return Ok(CascadeSuccess {
                result,
                failed_attempts: in_priority_order(attempts),
                rating: None,
            });
        }

        Err(CascadeError::Exhausted(CascadeFailure {
            attempts: in_priority_order(attempts),
        }))
    }
}

type AttemptOutcome = (usize, Candidate, Result<CompletionResult, GatewayError>);

/// Log a failure, or hand back a success keyed for the tie-break
fn settle(
    (position, candidate, result): AttemptOutcome,
    attempts: &mut Vec<(usize, FailedAttempt)>,
) -> Option<(u32, usize, CompletionResult)> {
    match result {
        Ok(result) => Some((candidate.priority, position, result)),
        Err(error) => {
            warn!(
                "Candidate {}/{} failed (retryable={}): {}",
                candidate.vendor,
                candidate.model,
                error.is_retryable(),
                error
            );
            attempts.push((position, FailedAttempt { candidate, error }));
            None
        }
    }
}

fn in_priority_order(mut attempts: Vec<(usize, FailedAttempt)>) -> Vec<FailedAttempt> {
    attempts.sort_by_key(|(position, _)| *position);
    attempts.into_iter().map(|(_, attempt)| attempt).collect()
}
