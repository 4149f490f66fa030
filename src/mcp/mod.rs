//! MCP (Model Context Protocol) module
//!
//! Implements the MCP server protocol and the request pipeline behind
//! `tools/call`.

pub mod auth;
pub mod pipeline;
pub mod sanitize;
pub mod server;
pub mod tools;
pub mod types;
