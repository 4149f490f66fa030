//! Tool request pipeline
//!
//! Every `tools/call` passes through the same stages: authenticate, sanitize,
//! validate, dispatch to the Grok client, then record metrics and shape the
//! response. Failures at any stage become an error result, never a crash.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::error::{GrokMcpError, Result};
use crate::grok::client::{CompletionOptions, GrokClient};
use crate::grok::types::{ModelList, ModelSource, SearchRequest, SearchResponse, SearchStrategy};
use crate::mcp::auth::AuthGate;
use crate::mcp::sanitize::sanitize;
use crate::mcp::tools::{validate_arguments, ToolArgs, ToolName, DEFAULT_MAX_RESULTS};
use crate::mcp::types::CallToolResult;
use crate::metrics::Metrics;

/// One tool invocation as received from the transport
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub name: String,
    pub arguments: Value,
    pub auth_token: Option<String>,
}

impl ToolRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Pipeline stage, for logging where a call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticating,
    Validating,
    Dispatching,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Authenticating => "authenticating",
            Stage::Validating => "validating",
            Stage::Dispatching => "dispatching",
        };
        f.write_str(name)
    }
}

/// Shared request pipeline; one per server, used concurrently
pub struct RequestPipeline {
    client: Arc<GrokClient>,
    metrics: Arc<Metrics>,
    auth: AuthGate,
    started_at: Instant,
}

impl RequestPipeline {
    pub fn new(client: Arc<GrokClient>, metrics: Arc<Metrics>) -> Self {
        let auth = AuthGate::new(client.config().auth_token.clone());
        Self {
            client,
            metrics,
            auth,
            started_at: Instant::now(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Run a tool call end to end and shape the MCP result
    pub async fn handle(&self, request: ToolRequest) -> CallToolResult {
        let started = Instant::now();

        let Some(tool) = ToolName::parse(&request.name) else {
            if let Err(e) = self.auth.check(request.auth_token.as_deref()) {
                return CallToolResult::error(GrokMcpError::from(e).public_message());
            }
            tracing::warn!(tool = %request.name, "unknown tool requested");
            return CallToolResult::error(format!("Unknown tool: {}", request.name));
        };

        let result = self.execute(tool, request).await;
        let elapsed = started.elapsed();
        self.metrics.record(tool.as_str(), elapsed, result.is_err());

        match result {
            Ok(text) => {
                tracing::info!(tool = tool.as_str(), duration_ms = elapsed.as_millis() as u64, "tool call completed");
                CallToolResult::text(text).with_duration(elapsed)
            }
            Err(e) => CallToolResult::error(e.public_message()),
        }
    }

    /// Authenticate, sanitize, validate and dispatch. Returns the response text.
    pub async fn execute(&self, tool: ToolName, request: ToolRequest) -> Result<String> {
        self.auth
            .check(request.auth_token.as_deref())
            .map_err(|e| failed(tool, Stage::Authenticating, e.into()))?;

        let arguments = sanitize(request.arguments);
        let args = validate_arguments(tool, arguments)
            .map_err(|e| failed(tool, Stage::Validating, e.into()))?;

        self.dispatch(args)
            .await
            .map_err(|e| failed(tool, Stage::Dispatching, e))
    }

    async fn dispatch(&self, args: ToolArgs) -> Result<String> {
        match args {
            ToolArgs::Ask(ask) => {
                let options = CompletionOptions {
                    model: ask.model,
                    temperature: ask.temperature,
                    max_tokens: ask.max_tokens,
                    include_search: ask.include_search,
                };
                self.client
                    .ask(
                        &ask.question,
                        non_blank(ask.context.as_deref()),
                        non_blank(ask.system_prompt.as_deref()),
                        options,
                    )
                    .await
            }
            ToolArgs::Chat(chat) => {
                let options = CompletionOptions {
                    model: chat.model,
                    temperature: chat.temperature,
                    max_tokens: chat.max_tokens,
                    include_search: false,
                };
                self.client.chat(chat.messages, options).await
            }
            ToolArgs::Search(search) => {
                let request = SearchRequest {
                    query: search.query,
                    max_results: search.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
                    include_images: search.include_images,
                    include_news: search.include_news,
                    time_filter: search.time_filter,
                };
                let response = self.client.live_search(request).await?;
                Ok(format_search_response(&response))
            }
            ToolArgs::Models => Ok(format_models(&self.client.get_models().await)),
            ToolArgs::TestConnection => {
                let base_url = &self.client.config().base_url;
                Ok(if self.client.test_connection().await {
                    format!("Successfully connected to Grok API at {}", base_url)
                } else {
                    format!("Failed to connect to Grok API at {}", base_url)
                })
            }
            ToolArgs::Health => self.health_report(),
        }
    }

    fn health_report(&self) -> Result<String> {
        let config = self.client.config();
        let cache = self.client.cache_stats();
        let snapshot = self.metrics.snapshot();
        let per_tool: String = snapshot
            .iter()
            .map(|(tool, m)| {
                format!(
                    "  {}: {} requests, {} errors, avg {}ms\n",
                    tool,
                    m.requests,
                    m.errors,
                    m.average_latency_ms()
                )
            })
            .collect();
        let metrics = serde_json::to_string_pretty(&snapshot)?;

        Ok(format!(
            "Grok MCP server is healthy\n\
             Server: {} v{}\n\
             Uptime: {}s\n\
             Upstream: {} (default model {})\n\
             Auth: {}\n\
             Cache: {} entries, {} hits, {} misses, {} evictions\n\
             Total requests: {}\n{}\n\
             Metrics:\n{}",
            config.server_name,
            config.server_version,
            self.started_at.elapsed().as_secs(),
            config.base_url,
            config.default_model,
            if self.auth.is_enabled() { "enabled" } else { "disabled" },
            cache.entries,
            cache.hits,
            cache.misses,
            cache.evictions,
            self.metrics.total_requests(),
            per_tool,
            metrics,
        ))
    }
}

fn failed(tool: ToolName, stage: Stage, err: GrokMcpError) -> GrokMcpError {
    tracing::warn!(tool = tool.as_str(), %stage, kind = err.kind(), error = %err, "tool call failed");
    err
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Numbered list of results with a header line
pub fn format_search_response(response: &SearchResponse) -> String {
    let strategy = match response.strategy {
        SearchStrategy::Native => "live search",
        SearchStrategy::Simulated => "simulated search",
        SearchStrategy::Fallback => "fallback",
    };
    let mut out = format!(
        "Search results for \"{}\" ({} results in {:.2}s via {}):\n",
        response.query,
        response.total_results,
        response.search_time_ms as f64 / 1000.0,
        strategy
    );

    if response.results.is_empty() {
        out.push_str("\nNo results found.");
        return out;
    }

    for (i, result) in response.results.iter().enumerate() {
        out.push_str(&format!("\n{}. {}\n   URL: {}\n", i + 1, result.title, result.url));
        if !result.snippet.is_empty() {
            out.push_str(&format!("   {}\n", result.snippet));
        }
        if let Some(date) = &result.published_date {
            out.push_str(&format!("   Published: {}\n", date));
        }
        if let Some(source) = &result.source {
            out.push_str(&format!("   Source: {}\n", source));
        }
    }
    out.trim_end().to_string()
}

/// One model id per line
pub fn format_models(list: &ModelList) -> String {
    let mut out = list.models.join("\n");
    if list.source == ModelSource::Fallback {
        out.push_str("\n\n(Model list unavailable from the API; showing known models)");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::grok::types::SearchResult;
    use serde_json::json;

    fn pipeline(auth_token: Option<&str>) -> RequestPipeline {
        let mut vars = vec![
            ("XAI_API_KEY", "test-key"),
            ("XAI_BASE_URL", "http://127.0.0.1:1"),
            ("GROK_MIN_INTERVAL_MS", "0"),
            ("GROK_REQUEST_TIMEOUT_SECS", "1"),
        ];
        if let Some(token) = auth_token {
            vars.push(("MCP_AUTH_TOKEN", token));
        }
        let config = Config::from_vars(|key| {
            vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
        })
        .unwrap();
        let client = Arc::new(GrokClient::new(config).unwrap());
        RequestPipeline::new(client, Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_recorded() {
        let pipeline = pipeline(None);
        let result = pipeline.handle(ToolRequest::new("grok_unknown", json!({}))).await;
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("Error: Unknown tool: grok_unknown"));
        assert_eq!(pipeline.metrics().total_requests(), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_is_reported_and_counted() {
        let pipeline = pipeline(None);
        let result = pipeline
            .handle(ToolRequest::new("grok_ask", json!({"question": "<>"})))
            .await;
        assert!(result.is_error);
        assert_eq!(
            result.first_text(),
            Some("Error: Validation error: question: must not be empty")
        );

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot["grok_ask"].requests, 1);
        assert_eq!(snapshot["grok_ask"].errors, 1);
    }

    #[tokio::test]
    async fn test_auth_runs_before_validation() {
        let pipeline = pipeline(Some("abc"));
        let err = pipeline
            .execute(ToolName::Ask, ToolRequest::new("grok_ask", json!({})).with_auth_token("ab"))
            .await
            .unwrap_err();
        assert!(matches!(err, GrokMcpError::Auth(_)));

        let err = pipeline
            .execute(ToolName::Health, ToolRequest::new("grok_health", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, GrokMcpError::Auth(_)));
    }

    #[tokio::test]
    async fn test_health_reports_metrics() {
        let pipeline = pipeline(Some("abc"));
        pipeline.metrics().record("grok_ask", std::time::Duration::from_millis(10), false);

        let result = pipeline
            .handle(ToolRequest::new("grok_health", json!({})).with_auth_token("abc"))
            .await;
        assert!(!result.is_error);
        let text = result.first_text().unwrap();
        assert!(text.starts_with("Grok MCP server is healthy"));
        assert!(text.contains("Auth: enabled"));
        assert!(text.contains("\"grok_ask\""));
        assert!(result.meta.is_some());
    }

    #[test]
    fn test_format_search_response() {
        let response = SearchResponse {
            query: "rust".to_string(),
            results: vec![SearchResult {
                title: "The Rust Book".to_string(),
                url: "https://doc.rust-lang.org/book/".to_string(),
                snippet: "Learn Rust".to_string(),
                published_date: Some("2024-01-01".to_string()),
                source: Some("citation".to_string()),
            }],
            total_results: 1,
            search_time_ms: 1500,
            strategy: SearchStrategy::Native,
        };

        let text = format_search_response(&response);
        assert!(text.starts_with("Search results for \"rust\" (1 results in 1.50s via live search):"));
        assert!(text.contains("1. The Rust Book\n   URL: https://doc.rust-lang.org/book/"));
        assert!(text.contains("Published: 2024-01-01"));
        assert!(text.ends_with("Source: citation"));
    }

    #[test]
    fn test_format_models_marks_fallback() {
        let list = ModelList {
            models: vec!["grok-4".to_string(), "grok-3".to_string()],
            source: ModelSource::Upstream,
        };
        assert_eq!(format_models(&list), "grok-4\ngrok-3");

        let fallback = ModelList {
            source: ModelSource::Fallback,
            ..list
        };
        assert!(format_models(&fallback).starts_with("grok-4\ngrok-3\n\n"));
    }
}
