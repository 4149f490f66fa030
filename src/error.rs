//! Error types for the Grok MCP Server
//!
//! This module defines the error hierarchy for all operations in the server,
//! and how each kind is rendered back to an MCP caller.

use std::fmt;

use thiserror::Error;

/// Main error type for the Grok MCP Server
#[derive(Error, Debug)]
pub enum GrokMcpError {
    /// Shared-secret authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Upstream (Grok API) errors
    #[error("{0}")]
    ExternalService(#[from] ExternalServiceError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GrokMcpError {
    /// Message that is safe to hand back to a tool caller.
    ///
    /// Only validation, authentication and upstream failures carry their own
    /// message. Everything else is reported as a generic internal error.
    pub fn public_message(&self) -> String {
        match self {
            GrokMcpError::Auth(_)
            | GrokMcpError::Validation(_)
            | GrokMcpError::ExternalService(_) => self.to_string(),
            _ => "Internal error".to_string(),
        }
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            GrokMcpError::Auth(_) => "auth",
            GrokMcpError::ExternalService(_) => "external_service",
            GrokMcpError::Config(_) => "config",
            GrokMcpError::Validation(_) => "validation",
            GrokMcpError::Mcp(_) => "mcp",
            GrokMcpError::Io(_) => "io",
            GrokMcpError::Json(_) => "json",
        }
    }
}

/// Shared-secret authentication errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authentication token")]
    MissingToken,

    #[error("invalid authentication token")]
    InvalidToken,
}

/// Grok API errors
#[derive(Error, Debug)]
pub enum ExternalServiceError {
    #[error("Grok API error during {operation}{}: {message}", status_suffix(.status))]
    RequestFailed {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Grok API request timed out during {operation}")]
    Timeout { operation: String },

    #[error("Grok API returned an unexpected response during {operation}: {message}")]
    InvalidResponse { operation: String, message: String },

    #[error("Grok API is overloaded: {queued} requests already waiting")]
    Overloaded { queued: usize },
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({})", code),
        None => String::new(),
    }
}

impl ExternalServiceError {
    /// Wrap a reqwest failure with the operation it happened in
    pub fn from_reqwest(operation: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ExternalServiceError::Timeout {
                operation: operation.to_string(),
            };
        }
        if err.is_decode() {
            return ExternalServiceError::InvalidResponse {
                operation: operation.to_string(),
                message: err.to_string(),
            };
        }

        ExternalServiceError::RequestFailed {
            operation: operation.to_string(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// A single field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Argument name, or `arguments` when the problem is not tied to one field
    pub field: String,

    /// Human-readable description
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{}", join_issues(.issues))]
    InvalidArguments { issues: Vec<FieldIssue> },
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidArguments {
            issues: vec![FieldIssue::new(field, message)],
        }
    }

    pub fn issues(&self) -> &[FieldIssue] {
        match self {
            ValidationError::InvalidArguments { issues } => issues,
        }
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("Transport error: {message}")]
    TransportError { message: String },
}

/// Result type alias for Grok MCP operations
pub type Result<T> = std::result::Result<T, GrokMcpError>;
