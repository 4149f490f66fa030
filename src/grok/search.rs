//! Search result utilities
//!
//! Turning chat completions into search results: citation and URL extraction,
//! parsing of JSON-prompted ("simulated") search answers, and the deterministic
//! fallback result.

use std::collections::HashSet;

use chrono::{Duration as ChronoDuration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::grok::types::{ChatCompletionResponse, SearchRequest, SearchResult, TimeFilter};

/// Maximum length of a title derived from a URL
pub const MAX_TITLE_LEN: usize = 80;

/// Maximum length of a snippet taken from response text
pub const MAX_SNIPPET_LEN: usize = 300;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"'`()\[\]{}]+"#).expect("valid URL pattern"));

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid JSON object pattern"));

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z]*").expect("valid code fence pattern"));

/// Lower publication-date bound for a time window, counted back from `today`
pub fn from_date(filter: TimeFilter, today: NaiveDate) -> Option<String> {
    filter
        .days()
        .map(|days| (today - ChronoDuration::days(days)).format("%Y-%m-%d").to_string())
}

/// Human-ish title for a bare URL.
///
/// Uses the last non-empty path segment (or the host when the path is empty),
/// with dashes and underscores turned into spaces.
pub fn title_from_url(raw: &str) -> String {
    let parsed = match url::Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return truncate(raw, MAX_TITLE_LEN),
    };

    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        });

    let base = match segment {
        Some(s) => s,
        None => parsed.host_str().unwrap_or(raw).to_string(),
    };

    truncate(&base.replace(['-', '_'], " "), MAX_TITLE_LEN)
}

/// Every distinct URL literally present in `text`, in order of appearance
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    URL_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']).to_string())
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Build results from a native live-search completion.
///
/// Citations come first, then URLs found in the text that were not cited, and
/// when neither yields anything, one result summarising the text itself.
pub fn results_from_completion(
    response: &ChatCompletionResponse,
    request: &SearchRequest,
) -> Vec<SearchResult> {
    let content = response.first_content().unwrap_or_default();
    let limit = request.max_results as usize;
    let snippet = truncate(content.trim(), MAX_SNIPPET_LEN);

    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for citation in &response.citations {
        if results.len() >= limit {
            break;
        }
        let url = citation.url().trim();
        if url.is_empty() || !seen.insert(url.to_string()) {
            continue;
        }
        results.push(SearchResult {
            title: citation
                .title()
                .map(|t| truncate(t, MAX_TITLE_LEN))
                .unwrap_or_else(|| title_from_url(url)),
            url: url.to_string(),
            snippet: snippet.clone(),
            published_date: None,
            source: Some("citation".to_string()),
        });
    }

    if results.len() < limit {
        for url in extract_urls(content) {
            if results.len() >= limit {
                break;
            }
            if !seen.insert(url.clone()) {
                continue;
            }
            results.push(SearchResult {
                title: title_from_url(&url),
                snippet: snippet.clone(),
                url,
                published_date: None,
                source: Some("content".to_string()),
            });
        }
    }

    if results.is_empty() && !snippet.is_empty() && limit > 0 {
        results.push(SearchResult {
            title: format!("Grok search: {}", truncate(&request.query, MAX_TITLE_LEN)),
            url: web_search_url(&request.query),
            snippet,
            published_date: None,
            source: Some("grok".to_string()),
        });
    }

    results
}

/// System prompt for the JSON-prompted search
pub fn simulated_search_prompt(request: &SearchRequest) -> String {
    let mut prompt = format!(
        "You are a web search engine. Return up to {} results for the user's query \
         as strict JSON with no commentary, in the form \
         {{\"results\": [{{\"title\": string, \"url\": string, \"snippet\": string, \
         \"published_date\": string or null, \"source\": string or null}}]}}.",
        request.max_results
    );
    if request.include_news {
        prompt.push_str(" Prefer recent news coverage where relevant.");
    }
    if request.include_images {
        prompt.push_str(" Include direct image URLs as results where relevant.");
    }
    if let Some(days) = request.time_filter.days() {
        prompt.push_str(&format!(
            " Only include results published within the last {} day(s).",
            days
        ));
    }
    prompt
}

#[derive(Deserialize)]
struct SimulatedPayload {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// Remove markdown code fences around a model answer
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

/// The first top-level JSON object in `text`, if one is present
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|m| m.as_str())
}

/// Parse a simulated-search answer. `None` when nothing usable came back.
pub fn parse_simulated_results(text: &str, max_results: u32) -> Option<Vec<SearchResult>> {
    let cleaned = strip_code_fences(text);
    let json = extract_json_object(&cleaned)?;
    let payload: SimulatedPayload = match serde_json::from_str(json) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(error = %e, "simulated search answer was not valid JSON");
            return None;
        }
    };

    let results: Vec<SearchResult> = payload
        .results
        .into_iter()
        .filter(|r| !r.url.trim().is_empty())
        .take(max_results as usize)
        .collect();

    if results.is_empty() {
        None
    } else {
        Some(results)
    }
}

/// Generic web-search link for a query
pub fn web_search_url(query: &str) -> String {
    format!("https://www.google.com/search?q={}", urlencoding::encode(query))
}

/// Deterministic single result used when search cannot produce anything else
pub fn fallback_result(query: &str) -> SearchResult {
    SearchResult {
        title: format!("Search results for \"{}\"", query),
        url: web_search_url(query),
        snippet: "Live search is currently unavailable. Open the link to run this search on the web."
            .to_string(),
        published_date: None,
        source: Some("fallback".to_string()),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grok::types::Citation;
    use serde_json::json;

    fn request(max_results: u32) -> SearchRequest {
        SearchRequest {
            query: "rust async".to_string(),
            max_results,
            include_images: false,
            include_news: false,
            time_filter: TimeFilter::All,
        }
    }

    fn completion(content: &str, citations: Vec<Citation>) -> ChatCompletionResponse {
        serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "citations": citations,
        }))
        .unwrap()
    }

    #[test]
    fn test_title_from_url() {
        assert_eq!(
            title_from_url("https://blog.example.com/posts/async-rust_explained/"),
            "async rust explained"
        );
        assert_eq!(title_from_url("https://example.com/"), "example.com");
        assert_eq!(title_from_url("https://example.com"), "example.com");

        let long = format!("https://example.com/{}", "a".repeat(200));
        assert_eq!(title_from_url(&long).chars().count(), MAX_TITLE_LEN);
    }

    #[test]
    fn test_extract_urls_trims_punctuation_and_dedupes() {
        let text = "See https://a.example/one. Also (https://b.example/two), and https://a.example/one!";
        assert_eq!(
            extract_urls(text),
            vec!["https://a.example/one".to_string(), "https://b.example/two".to_string()]
        );
    }

    #[test]
    fn test_citations_come_before_content_urls() {
        let response = completion(
            "Details at https://c.example/extra and https://a.example/first",
            vec![
                Citation::Url("https://a.example/first".to_string()),
                Citation::Detailed {
                    url: "https://b.example/second".to_string(),
                    title: Some("Second".to_string()),
                },
            ],
        );

        let results = results_from_completion(&response, &request(5));
        let urls: Vec<_> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://a.example/first", "https://b.example/second", "https://c.example/extra"]
        );
        assert_eq!(results[0].title, "first");
        assert_eq!(results[1].title, "Second");
        assert_eq!(results[2].source.as_deref(), Some("content"));
    }

    #[test]
    fn test_results_respect_max_results() {
        let citations = (0..6)
            .map(|i| Citation::Url(format!("https://example.com/page-{}", i)))
            .collect();
        let results = results_from_completion(&completion("text", citations), &request(3));
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_synthesized_result_when_nothing_to_extract() {
        let results = results_from_completion(&completion("Just prose, no links.", vec![]), &request(5));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "Just prose, no links.");
        assert_eq!(results[0].source.as_deref(), Some("grok"));
        assert!(results[0].url.contains("rust%20async"));
    }

    #[test]
    fn test_parse_simulated_results_with_fences() {
        let answer = "Here you go:\n```json\n{\"results\": [{\"title\": \"A\", \"url\": \"https://a.example\", \"snippet\": \"s\"}, {\"title\": \"B\", \"url\": \"https://b.example\"}]}\n```";
        let results = parse_simulated_results(answer, 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "A");
    }

    #[test]
    fn test_parse_simulated_results_rejects_garbage() {
        assert!(parse_simulated_results("no json here", 5).is_none());
        assert!(parse_simulated_results("{not: valid}", 5).is_none());
        assert!(parse_simulated_results("{\"results\": []}", 5).is_none());
    }

    #[test]
    fn test_fallback_result_is_deterministic() {
        let a = fallback_result("rust & tokio");
        assert_eq!(a, fallback_result("rust & tokio"));
        assert_eq!(a.url, "https://www.google.com/search?q=rust%20%26%20tokio");
    }

    #[test]
    fn test_from_date_windows() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        assert_eq!(from_date(TimeFilter::Day, today).as_deref(), Some("2026-03-09"));
        assert_eq!(from_date(TimeFilter::Week, today).as_deref(), Some("2026-03-03"));
        assert_eq!(from_date(TimeFilter::Month, today).as_deref(), Some("2026-02-08"));
        assert_eq!(from_date(TimeFilter::Year, today).as_deref(), Some("2025-03-10"));
        assert_eq!(from_date(TimeFilter::All, today), None);
    }
}
