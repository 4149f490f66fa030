//! Grok API client
//!
//! High-level client for the Grok chat-completion API. Owns the response cache
//! and the outbound limiter; every network call goes through both.

use std::time::Instant;

use serde_json::Value;

use crate::config::{grok::FALLBACK_MODELS, grok::NO_RESPONSE, Config, SearchMode};
use crate::error::{ExternalServiceError, GrokMcpError, Result};
use crate::grok::cache::{cache_key, CacheKind, CacheStats, ResponseCache};
use crate::grok::limiter::{LimiterPermit, RateLimiter};
use crate::grok::search::{
    fallback_result, from_date, parse_simulated_results, results_from_completion,
    simulated_search_prompt,
};
use crate::grok::types::*;

/// Per-call overrides for ask/chat
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub include_search: bool,
}

/// Grok API client
pub struct GrokClient {
    /// HTTP client
    http_client: reqwest::Client,

    config: Config,
    cache: ResponseCache,
    limiter: RateLimiter,
}

impl GrokClient {
    /// Create a new Grok client
    pub fn new(config: Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("grok-mcp-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExternalServiceError::from_reqwest("client setup", e))?;

        let cache = ResponseCache::new(config.cache_ttl, config.cache_max_entries);
        let limiter = RateLimiter::new(
            config.max_concurrent_requests,
            config.min_request_interval,
            config.max_queue_depth,
        );

        Ok(Self {
            http_client,
            config,
            cache,
            limiter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.base_url)
    }

    // ==================== Chat Operations ====================

    /// Run a chat completion, serving repeats from the cache
    pub async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        let request = self.with_defaults(request);
        let key = cache_key(CacheKind::ChatCompletion, &request);

        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(model = ?request.model, "chat completion served from cache");
            return Ok(serde_json::from_value(cached)?);
        }

        let _permit = self.limiter.acquire().await?;
        // An identical call may have finished while this one waited for a slot
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(model = ?request.model, "chat completion cached while waiting");
            return Ok(serde_json::from_value(cached)?);
        }

        let response = self.post_chat(&request, "chat completion").await?;
        self.cache.insert(key, serde_json::to_value(&response)?);
        Ok(response)
    }

    /// Ask a single question, optionally with context and live search
    pub async fn ask(
        &self,
        question: &str,
        context: Option<&str>,
        system_prompt: Option<&str>,
        options: CompletionOptions,
    ) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(match context {
            Some(context) => format!("Context: {}\n\nQuestion: {}", context, question),
            None => question.to_string(),
        }));

        let response = self.chat_completion(Self::request_with(messages, options)).await?;
        Ok(response.first_content().unwrap_or(NO_RESPONSE).to_string())
    }

    /// Continue a caller-supplied conversation
    pub async fn chat(&self, messages: Vec<ChatMessage>, options: CompletionOptions) -> Result<String> {
        let response = self.chat_completion(Self::request_with(messages, options)).await?;
        Ok(response.first_content().unwrap_or(NO_RESPONSE).to_string())
    }

    fn request_with(messages: Vec<ChatMessage>, options: CompletionOptions) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: options.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            search_parameters: options.include_search.then(|| SearchParameters {
                mode: LiveSearchMode::Auto,
                return_citations: true,
                sources: Vec::new(),
                from_date: None,
                max_search_results: None,
            }),
        }
    }

    // ==================== Search Operations ====================

    /// Live search with graceful degradation.
    ///
    /// Upstream failures never surface: native search degrades to the single
    /// fallback result (or, in `auto` mode, to the simulated search first).
    pub async fn live_search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let key = cache_key(CacheKind::LiveSearch, &request);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(query = %request.query, "live search served from cache");
            return Ok(serde_json::from_value(cached)?);
        }

        let started = Instant::now();
        let permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::warn!(error = %e, "no upstream slot for live search");
                let fallback = (vec![fallback_result(&request.query)], SearchStrategy::Fallback);
                return Ok(search_response(&request, fallback, started));
            }
        };
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(query = %request.query, "live search cached while waiting");
            return Ok(serde_json::from_value(cached)?);
        }

        let outcome = match self.config.search_mode {
            SearchMode::Native => match self.native_search(&request).await {
                Ok(results) if !results.is_empty() => (results, SearchStrategy::Native),
                Ok(_) => (vec![fallback_result(&request.query)], SearchStrategy::Fallback),
                Err(e) => {
                    tracing::warn!(error = %e, "native search failed, using fallback result");
                    (vec![fallback_result(&request.query)], SearchStrategy::Fallback)
                }
            },
            SearchMode::Simulated => self.simulated_search(&request, Some(permit)).await,
            SearchMode::Auto => match self.native_search(&request).await {
                Ok(results) if !results.is_empty() => (results, SearchStrategy::Native),
                Ok(_) => {
                    tracing::info!(query = %request.query, "native search returned nothing, simulating");
                    drop(permit);
                    self.simulated_search(&request, None).await
                }
                Err(e) => {
                    tracing::warn!(error = %e, "native search failed, simulating");
                    drop(permit);
                    self.simulated_search(&request, None).await
                }
            },
        };

        let response = search_response(&request, outcome, started);
        if response.strategy != SearchStrategy::Fallback {
            self.cache.insert(key, serde_json::to_value(&response)?);
        }
        Ok(response)
    }

    /// Native live search; the caller holds the limiter slot
    async fn native_search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let mut sources = vec![SearchSource::Web, SearchSource::X];
        if request.include_news {
            sources.push(SearchSource::News);
        }

        let chat_request = self.with_defaults(ChatCompletionRequest {
            search_parameters: Some(SearchParameters {
                mode: LiveSearchMode::On,
                return_citations: true,
                sources,
                from_date: from_date(request.time_filter, chrono::Utc::now().date_naive()),
                max_search_results: Some(request.max_results),
            }),
            ..ChatCompletionRequest::new(vec![ChatMessage::user(request.query.clone())])
        });

        let response = self.post_chat(&chat_request, "live search").await?;
        Ok(results_from_completion(&response, request))
    }

    /// JSON-prompted search. Any failure degrades to the single fallback result.
    ///
    /// Takes a slot of its own unless the caller passes one in.
    async fn simulated_search(
        &self,
        request: &SearchRequest,
        permit: Option<LimiterPermit>,
    ) -> (Vec<SearchResult>, SearchStrategy) {
        let chat_request = self.with_defaults(ChatCompletionRequest {
            temperature: Some(0.2),
            ..ChatCompletionRequest::new(vec![
                ChatMessage::system(simulated_search_prompt(request)),
                ChatMessage::user(request.query.clone()),
            ])
        });

        let outcome: Result<ChatCompletionResponse> = async {
            let _permit = match permit {
                Some(permit) => permit,
                None => self.limiter.acquire().await?,
            };
            self.post_chat(&chat_request, "simulated search").await
        }
        .await;

        let parsed = match outcome {
            Ok(response) => response
                .first_content()
                .and_then(|text| parse_simulated_results(text, request.max_results)),
            Err(e) => {
                tracing::warn!(error = %e, "simulated search request failed");
                None
            }
        };

        match parsed {
            Some(results) => (results, SearchStrategy::Simulated),
            None => (vec![fallback_result(&request.query)], SearchStrategy::Fallback),
        }
    }

    // ==================== Diagnostics ====================

    /// List available models, falling back to a built-in list on any failure
    pub async fn get_models(&self) -> ModelList {
        match self.fetch_models().await {
            Ok(models) if !models.is_empty() => ModelList {
                models,
                source: ModelSource::Upstream,
            },
            Ok(_) => Self::fallback_models(),
            Err(e) => {
                tracing::warn!(error = %e, "model listing failed, using fallback list");
                Self::fallback_models()
            }
        }
    }

    fn fallback_models() -> ModelList {
        ModelList {
            models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            source: ModelSource::Fallback,
        }
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let _permit = self.limiter.acquire().await?;

        let response = self
            .http_client
            .get(self.models_url())
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ExternalServiceError::from_reqwest("model listing", e))?;

        let response = check_status(response, "model listing").await?;
        let list: ModelListResponse = response
            .json()
            .await
            .map_err(|e| ExternalServiceError::from_reqwest("model listing", e))?;

        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    /// Minimal uncached completion; `false` on any failure
    pub async fn test_connection(&self) -> bool {
        let request = self.with_defaults(ChatCompletionRequest {
            max_tokens: Some(8),
            ..ChatCompletionRequest::new(vec![ChatMessage::user("ping")])
        });

        match self.send_chat(&request, "connection test").await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "connection test failed");
                false
            }
        }
    }

    // ==================== Transport ====================

    fn with_defaults(&self, request: ChatCompletionRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request
                .model
                .or_else(|| Some(self.config.default_model.clone())),
            temperature: request.temperature.or(Some(self.config.default_temperature)),
            max_tokens: request.max_tokens.or(Some(self.config.default_max_tokens)),
            ..request
        }
    }

    async fn send_chat(
        &self,
        request: &ChatCompletionRequest,
        operation: &str,
    ) -> Result<ChatCompletionResponse> {
        let _permit = self.limiter.acquire().await?;
        self.post_chat(request, operation).await
    }

    /// POST a chat completion; the caller holds the limiter slot
    async fn post_chat(
        &self,
        request: &ChatCompletionRequest,
        operation: &str,
    ) -> Result<ChatCompletionResponse> {
        let started = Instant::now();

        let response = self
            .http_client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ExternalServiceError::from_reqwest(operation, e))?;

        let response = check_status(response, operation).await?;
        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ExternalServiceError::from_reqwest(operation, e))?;

        tracing::debug!(
            operation,
            model = ?request.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upstream call completed"
        );
        Ok(body)
    }
}

fn search_response(
    request: &SearchRequest,
    (results, strategy): (Vec<SearchResult>, SearchStrategy),
    started: Instant,
) -> SearchResponse {
    SearchResponse {
        query: request.query.clone(),
        total_results: results.len(),
        results,
        search_time_ms: started.elapsed().as_millis() as u64,
        strategy,
    }
}

/// Turn a non-2xx response into a descriptive upstream error
async fn check_status(response: reqwest::Response, operation: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    tracing::warn!(operation, status = status.as_u16(), "upstream returned an error");

    Err(GrokMcpError::ExternalService(ExternalServiceError::RequestFailed {
        operation: operation.to_string(),
        status: Some(status.as_u16()),
        message: upstream_error_message(&text)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
    }))
}

/// Pull a human-readable message out of an upstream error body
fn upstream_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => json
            .pointer("/error/message")
            .or_else(|| json.get("error"))
            .or_else(|| json.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Err(_) => Some(trimmed.chars().take(200).collect()),
    }
}
