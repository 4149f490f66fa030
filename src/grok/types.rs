//! Grok API type definitions
//!
//! These types mirror the Grok chat-completion and models endpoints and are used
//! for serialization/deserialization.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChatMessage {
    /// Message author
    pub role: Role,

    /// Message text
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Live-search mode understood by the upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveSearchMode {
    Off,
    Auto,
    On,
}

/// Data source consulted by live search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchSource {
    Web,
    News,
    X,
}

/// Search parameters attached to a chat completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParameters {
    /// Whether the model searches always, never, or when it decides to
    pub mode: LiveSearchMode,

    /// Return cited URLs alongside the answer
    pub return_citations: bool,

    /// Sources to search
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SearchSource>,

    /// Lower bound on publication date (YYYY-MM-DD)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,

    /// Cap on sources consulted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_search_results: Option<u32>,
}

/// Chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model ID; filled from config when `None`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Conversation so far
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature; filled from config when `None`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Completion token cap; filled from config when `None`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Live-search settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_parameters: Option<SearchParameters>,
}

impl ChatCompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            model: None,
            messages,
            temperature: None,
            max_tokens: None,
            search_parameters: None,
        }
    }
}

/// Message returned inside a choice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One completion choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,

    #[serde(default)]
    pub message: ResponseMessage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A citation returned by live search
///
/// The upstream has returned both bare URL strings and `{url, title}` objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Citation {
    Url(String),
    Detailed {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl Citation {
    pub fn url(&self) -> &str {
        match self {
            Citation::Url(url) => url,
            Citation::Detailed { url, .. } => url,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Citation::Url(_) => None,
            Citation::Detailed { title, .. } => title.as_deref(),
        }
    }
}

/// Token accounting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,

    #[serde(default)]
    pub completion_tokens: u32,

    #[serde(default)]
    pub total_tokens: u32,
}

/// Chat completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub choices: Vec<Choice>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Content of the first choice, if any
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

/// Entry in the models list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
}

/// Models list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelListResponse {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

/// Time window for search results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Day,
    Week,
    Month,
    Year,
    #[default]
    All,
}

impl TimeFilter {
    /// Length of the window in days; `None` for no bound
    pub fn days(self) -> Option<i64> {
        match self {
            TimeFilter::Day => Some(1),
            TimeFilter::Week => Some(7),
            TimeFilter::Month => Some(30),
            TimeFilter::Year => Some(365),
            TimeFilter::All => None,
        }
    }
}

/// Live-search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,
    pub include_images: bool,
    pub include_news: bool,
    pub time_filter: TimeFilter,
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,

    #[serde(default)]
    pub snippet: String,

    #[serde(
        default,
        alias = "publishedDate",
        alias = "date",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// How a search response was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Native,
    Simulated,
    Fallback,
}

/// Live-search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    pub search_time_ms: u64,
    pub strategy: SearchStrategy,
}

/// Where a model list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    Upstream,
    Fallback,
}

/// Result of `get_models`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelList {
    pub models: Vec<String>,
    pub source: ModelSource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_omits_unset_fields() {
        let request = ChatCompletionRequest::new(vec![ChatMessage::user("hi")]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"messages": [{"role": "user", "content": "hi"}]}));
    }

    #[test]
    fn test_search_parameters_serialize() {
        let params = SearchParameters {
            mode: LiveSearchMode::On,
            return_citations: true,
            sources: vec![SearchSource::Web, SearchSource::News],
            from_date: Some("2026-01-01".to_string()),
            max_search_results: Some(5),
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["mode"], "on");
        assert_eq!(value["sources"], json!([{"type": "web"}, {"type": "news"}]));
        assert_eq!(value["from_date"], "2026-01-01");
    }

    #[test]
    fn test_response_with_mixed_citations() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "resp-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "answer"}}],
            "citations": ["https://a.example/x", {"url": "https://b.example/y", "title": "B"}]
        }))
        .unwrap();

        assert_eq!(response.first_content(), Some("answer"));
        assert_eq!(response.citations[0].url(), "https://a.example/x");
        assert_eq!(response.citations[1].title(), Some("B"));
    }

    #[test]
    fn test_empty_choices_have_no_content() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(response.first_content(), None);
    }

    #[test]
    fn test_search_result_accepts_camel_case_date() {
        let result: SearchResult = serde_json::from_value(json!({
            "title": "T",
            "url": "https://example.com",
            "publishedDate": "2025-03-01"
        }))
        .unwrap();
        assert_eq!(result.published_date.as_deref(), Some("2025-03-01"));
        assert_eq!(result.snippet, "");
    }
}
