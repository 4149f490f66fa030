//! Grok MCP Server Library
//!
//! A Model Context Protocol (MCP) server that exposes xAI's Grok models as
//! tools: question answering, multi-turn chat, live search and diagnostics.

pub mod config;
pub mod error;
pub mod grok;
pub mod mcp;
pub mod metrics;

pub use config::Config;
pub use error::{GrokMcpError, Result};
