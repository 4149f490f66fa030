//! MCP Server implementation
//!
//! Implements the Model Context Protocol server for stdio transport. Each
//! incoming line is handled on its own task so slow tool calls do not block
//! the ones behind them; responses are written by a single writer task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::error::{GrokMcpError, McpError, Result};
use crate::grok::client::GrokClient;
use crate::mcp::pipeline::{RequestPipeline, ToolRequest};
use crate::mcp::tools::list_tools;
use crate::mcp::types::*;
use crate::metrics::Metrics;

/// MCP Server for Grok
pub struct McpServer {
    pipeline: RequestPipeline,
    server_info: ServerInfo,

    /// Set once the client sends `notifications/initialized`
    initialized: AtomicBool,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(client: Arc<GrokClient>, metrics: Arc<Metrics>) -> Self {
        let server_info = ServerInfo {
            name: client.config().server_name.clone(),
            version: client.config().server_version.clone(),
        };

        Self {
            pipeline: RequestPipeline::new(client, metrics),
            server_info,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Run the server on stdio until stdin closes
    pub async fn run_stdio(self: Arc<Self>) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC from `reader`, answering on `writer`.
    ///
    /// Returns after the reader hits EOF and every in-flight call has answered.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response) = rx.recv().await {
                let mut line = serde_json::to_string(&response)?;
                line.push('\n');
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            Ok::<_, GrokMcpError>(())
        });

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let server = Arc::clone(&self);
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = server.handle_message(&line).await {
                    if tx.send(response).is_err() {
                        tracing::warn!("response writer closed, dropping response");
                    }
                }
            });
        }

        tracing::info!("stdin closed, draining in-flight requests");
        drop(tx);
        writer_task.await.map_err(|e| McpError::TransportError {
            message: e.to_string(),
        })?
    }

    /// Handle one JSON-RPC message. Notifications yield no response.
    pub async fn handle_message(&self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable message");
                return Some(JsonRpcResponse::error(None, JsonRpcError::parse_error(e.to_string())));
            }
        };

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        let id = request.id.clone();
        let result = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request.params),
            methods::PING => Ok(json!({})),
            methods::LIST_TOOLS => self.handle_list_tools(),
            methods::CALL_TOOL => self.handle_call_tool(request.params).await,
            _ => {
                tracing::debug!(method = %request.method, "unsupported method");
                return Some(JsonRpcResponse::error(id, JsonRpcError::method_not_found(&request.method)));
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, rpc_error(&e)),
        })
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            methods::INITIALIZED => {
                self.initialized.store(true, Ordering::Release);
                tracing::info!("client initialized");
            }
            other => tracing::debug!(method = %other, "ignoring notification"),
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = params
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                protocol = params.protocol_version.as_deref().unwrap_or("unknown"),
                "initialize"
            );
        }

        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            server_info: self.server_info.clone(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {}),
            },
        };

        Ok(serde_json::to_value(result)?)
    }

    /// Handle list tools request
    fn handle_list_tools(&self) -> Result<Value> {
        let result = ListToolsResult { tools: list_tools() };
        Ok(serde_json::to_value(result)?)
    }

    /// Handle call tool request
    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = parse_params(params)?;
        let auth_token = params.auth_token();

        let request = ToolRequest {
            name: params.name,
            arguments: params.arguments,
            auth_token,
        };
        let result = self.pipeline.handle(request).await;
        Ok(serde_json::to_value(result)?)
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params = params.ok_or_else(|| McpError::InvalidParams {
        message: "missing params".to_string(),
    })?;
    serde_json::from_value(params).map_err(|e| {
        McpError::InvalidParams {
            message: e.to_string(),
        }
        .into()
    })
}

fn rpc_error(err: &GrokMcpError) -> JsonRpcError {
    match err {
        GrokMcpError::Mcp(McpError::InvalidParams { .. }) | GrokMcpError::Json(_) => {
            JsonRpcError::invalid_params(err.to_string())
        }
        _ => JsonRpcError::internal_error(err.public_message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn server() -> Arc<McpServer> {
        let config = Config::from_vars(|key| match key {
            "XAI_API_KEY" => Some("test-key".to_string()),
            "XAI_BASE_URL" => Some("http://127.0.0.1:1".to_string()),
            "MCP_SERVER_NAME" => Some("grok-test".to_string()),
            "GROK_MIN_INTERVAL_MS" => Some("0".to_string()),
            _ => None,
        })
        .unwrap();
        let client = Arc::new(GrokClient::new(config).unwrap());
        Arc::new(McpServer::new(client, Arc::new(Metrics::new())))
    }

    #[tokio::test]
    async fn test_initialize_reports_configured_name() {
        let server = server();
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"test"}}}"#)
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "grok-test");
        assert_eq!(result["protocolVersion"], MCP_VERSION);
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let server = server();
        assert!(!server.is_initialized());
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
        assert!(server.is_initialized());

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{}}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let server = server();

        let response = server.handle_message("not json").await.unwrap();
        assert_eq!(response.id, None);
        assert_eq!(response.error.unwrap().code, -32700);

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":"a","method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response.id, Some(RequestId::String("a".to_string())));
        assert_eq!(response.error.unwrap().code, -32601);

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"tools/call"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_serve_answers_each_request() {
        let server = server();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n"
        );
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);

        server.serve(input.as_bytes(), server_end).await.unwrap();

        let mut output = String::new();
        let mut reader = BufReader::new(client_end);
        let mut ids = Vec::new();
        while reader.read_line(&mut output).await.unwrap() > 0 {
            let response: JsonRpcResponse = serde_json::from_str(output.trim()).unwrap();
            ids.push(response.id.unwrap());
            output.clear();
            if ids.len() == 2 {
                break;
            }
        }
        ids.sort_by_key(|id| format!("{:?}", id));
        assert_eq!(ids, vec![RequestId::Number(1), RequestId::Number(2)]);
    }
}
