//! Complexity-based candidate selection
//!
//! A cheap model rates the user's prompt from 1 (trivial) to 5 (needs deep
//! analysis); a [`RatingPolicy`] maps that rating to the candidate list the
//! cascade then runs over.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::providers::types::{Candidate, CompletionRequest, Vendor};

pub const DEFAULT_RATER_MODEL: &str = "llama-3.1-8b-instant";

/// Prompt difficulty in `1..=5`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Rating {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Rating::new(value).ok_or_else(|| format!("rating {} is outside 1-5", value))
    }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> u8 {
        r.0
    }
}

/// The fixed (vendor, model) pair that performs the rating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaterConfig {
    pub vendor: Vendor,
    pub model: String,
}

impl Default for RaterConfig {
    fn default() -> Self {
        Self {
            vendor: Vendor::Groq,
            model: DEFAULT_RATER_MODEL.to_string(),
        }
    }
}

/// Rating → candidate list table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingPolicy {
    routes: BTreeMap<Rating, Vec<Candidate>>,
    fallback_rating: Option<Rating>,
}

impl RatingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Three tiers: 1–2 → `fast`, 3 → `balanced`, 4–5 → `strong`
    pub fn tiered(fast: Vec<Candidate>, balanced: Vec<Candidate>, strong: Vec<Candidate>) -> Self {
        Self::new()
            .route(1..=2, fast)
            .route(3..=3, balanced)
            .route(4..=5, strong)
    }

    /// Route every rating in `ratings` to `candidates`; values outside 1–5 are ignored
    pub fn route(mut self, ratings: RangeInclusive<u8>, candidates: Vec<Candidate>) -> Self {
        for rating in ratings.filter_map(Rating::new) {
            self.routes.insert(rating, candidates.clone());
        }
        self
    }

    /// Rating to assume when the rater's reply is not a digit.
    /// Without one, an unparsable reply fails the routed call.
    pub fn with_fallback_rating(mut self, rating: Rating) -> Self {
        self.fallback_rating = Some(rating);
        self
    }

    pub fn fallback_rating(&self) -> Option<Rating> {
        self.fallback_rating
    }

    pub fn candidates_for(&self, rating: Rating) -> Option<&[Candidate]> {
        self.routes
            .get(&rating)
            .map(Vec::as_slice)
            .filter(|c| !c.is_empty())
    }
}

/// Prompt asking the rater for a single 1–5 digit
pub fn rating_prompt(user_prompt: &str) -> String {
    format!(
        "Given the user's prompt below, assign a complexity rating between 1 and 5 based on \
         how difficult you think the question is to answer.\n\n\
         User Prompt: {}\n\n\
         Rating Scale:\n\
         - 1: Very simple, factual question with a clear, straightforward answer.\n\
         - 2: Basic question that requires general knowledge or reasoning.\n\
         - 3: Question that requires explanation or intermediate-level understanding.\n\
         - 4: Complex question involving technical or specialized knowledge.\n\
         - 5: Highly complex, requiring in-depth analysis or a nuanced answer.\n\n\
         Examples:\n\
         1. User Prompt: \"What is 2 + 2?\"\nRating: 1\n\
         2. User Prompt: \"What is the capital of Japan?\"\nRating: 2\n\
         3. User Prompt: \"How does photosynthesis work?\"\nRating: 3\n\
         4. User Prompt: \"Can you explain quantum entanglement?\"\nRating: 4\n\
         5. User Prompt: \"What are the social, economic, and political effects of the Industrial Revolution?\"\nRating: 5\n\n\
         Respond with only the rating digit (1-5) and nothing else.",
        user_prompt
    )
}

/// Request sent to the rater: deterministic and a few tokens long
pub fn rating_request(user_prompt: &str) -> CompletionRequest {
    CompletionRequest::from_prompt(rating_prompt(user_prompt))
        .with_temperature(0.0)
        .with_max_tokens(4)
}

/// Parse the rater's reply.
///
/// Accepts a lone digit with optional whitespace, a trailing period, or a
/// leading `Rating:` label. Anything else is rejected rather than guessed.
pub fn parse_rating(reply: &str) -> Result<Rating, RoutingError> {
    let mut text = reply.trim();
    if let Some(rest) = strip_prefix_ignore_case(text, "rating:") {
        text = rest.trim_start();
    }
    let text = text.trim_end_matches('.').trim();

    text.parse::<u8>()
        .ok()
        .filter(|_| text.len() == 1)
        .and_then(Rating::new)
        .ok_or_else(|| RoutingError::UnparsableRating(reply.to_string()))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}
