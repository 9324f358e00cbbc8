//! Provider gateway over the supported LLM vendors
//!
//! Each vendor is a [`VendorApi`] binding (request building + response parsing);
//! [`HttpGateway`] owns the HTTP client and performs the single outbound call.

pub mod gateway;
pub mod google;
pub mod hosted;
pub mod openai_compat;
pub mod types;

pub use gateway::{CompletionGateway, HttpGateway, HttpGatewayBuilder};
pub use hosted::HostedBinding;
pub use types::{
    Candidate, ChatMessage, ChatRole, CompletionRequest, CompletionResult, StopSequence, Vendor,
    VendorApi,
};
