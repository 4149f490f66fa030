//! Grok API integration
//!
//! HTTP client for the Grok chat-completion API, plus the response cache,
//! outbound rate limiter and search-result extraction it relies on.

pub mod cache;
pub mod client;
pub mod limiter;
pub mod search;
pub mod types;
