//! MCP Tool definitions
//!
//! Each tool's contract lives here: its name, description, typed arguments
//! (with JSON Schema generated from the same struct) and validation rules.

use once_cell::sync::Lazy;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use validator::{Validate, ValidationErrors};

use crate::error::{FieldIssue, ValidationError};
use crate::grok::types::{ChatMessage, TimeFilter};
use crate::mcp::types::Tool;

/// Results returned by `grok_search` when `max_results` is omitted
pub const DEFAULT_MAX_RESULTS: u32 = 10;

static ASK_SCHEMA: Lazy<Value> = Lazy::new(schema_of::<AskArgs>);
static CHAT_SCHEMA: Lazy<Value> = Lazy::new(schema_of::<ChatArgs>);
static SEARCH_SCHEMA: Lazy<Value> = Lazy::new(schema_of::<SearchArgs>);

/// Registered tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    Ask,
    Chat,
    Search,
    Models,
    TestConnection,
    Health,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::Ask,
        ToolName::Chat,
        ToolName::Search,
        ToolName::Models,
        ToolName::TestConnection,
        ToolName::Health,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::Ask => "grok_ask",
            ToolName::Chat => "grok_chat",
            ToolName::Search => "grok_search",
            ToolName::Models => "grok_models",
            ToolName::TestConnection => "grok_test_connection",
            ToolName::Health => "grok_health",
        }
    }

    /// Look up a tool by its wire name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolName::Ask => "Ask Grok a question, optionally with context, a system prompt and live search",
            ToolName::Chat => "Continue a multi-turn conversation with Grok",
            ToolName::Search => "Search the web and X through Grok live search",
            ToolName::Models => "List the Grok models available to this API key",
            ToolName::TestConnection => "Check that the Grok API is reachable with the configured key",
            ToolName::Health => "Report server health and per-tool metrics",
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            ToolName::Ask => ASK_SCHEMA.clone(),
            ToolName::Chat => CHAT_SCHEMA.clone(),
            ToolName::Search => SEARCH_SCHEMA.clone(),
            ToolName::Models | ToolName::TestConnection | ToolName::Health => {
                json!({"type": "object", "properties": {}})
            }
        }
    }
}

/// All tool definitions, for `tools/list`
pub fn list_tools() -> Vec<Tool> {
    ToolName::ALL
        .into_iter()
        .map(|tool| Tool {
            name: tool.as_str().to_string(),
            description: Some(tool.description().to_string()),
            input_schema: tool.input_schema(),
        })
        .collect()
}

// ==================== Argument Contracts ====================

/// Arguments for `grok_ask`
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema, Validate)]
pub struct AskArgs {
    /// The question to ask
    #[validate(length(min = 1, message = "must not be empty"))]
    pub question: String,

    /// Background material the answer should draw on
    pub context: Option<String>,

    /// System prompt to steer the model
    pub system_prompt: Option<String>,

    /// Sampling temperature (0-1)
    #[validate(range(min = 0.0, max = 1.0, message = "must be between 0 and 1"))]
    pub temperature: Option<f64>,

    /// Maximum tokens in the answer (1-8000)
    #[validate(range(min = 1, max = 8000, message = "must be between 1 and 8000"))]
    pub max_tokens: Option<u32>,

    /// Let the model consult live search while answering
    #[serde(default)]
    pub include_search: bool,

    /// Model to use instead of the server default
    #[validate(length(min = 1, message = "must not be empty"))]
    pub model: Option<String>,
}

/// Arguments for `grok_chat`
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema, Validate)]
pub struct ChatArgs {
    /// Conversation so far, oldest first
    #[validate(length(min = 1, message = "must contain at least one message"))]
    pub messages: Vec<ChatMessage>,

    /// Model to use instead of the server default
    #[validate(length(min = 1, message = "must not be empty"))]
    pub model: Option<String>,

    /// Sampling temperature (0-1)
    #[validate(range(min = 0.0, max = 1.0, message = "must be between 0 and 1"))]
    pub temperature: Option<f64>,

    /// Maximum tokens in the reply (1-8000)
    #[validate(range(min = 1, max = 8000, message = "must be between 1 and 8000"))]
    pub max_tokens: Option<u32>,
}

/// Arguments for `grok_search`
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema, Validate)]
pub struct SearchArgs {
    /// What to search for
    #[validate(length(min = 1, message = "must not be empty"))]
    pub query: String,

    /// Maximum number of results (default 10)
    #[validate(range(min = 1, message = "must be a positive integer"))]
    pub max_results: Option<u32>,

    /// Include image results
    #[serde(default)]
    pub include_images: bool,

    /// Include news sources
    #[serde(default)]
    pub include_news: bool,

    /// Restrict results to a recent time window
    #[serde(default)]
    pub time_filter: TimeFilter,
}

/// Validated arguments, one variant per tool
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArgs {
    Ask(AskArgs),
    Chat(ChatArgs),
    Search(SearchArgs),
    Models,
    TestConnection,
    Health,
}

/// Validate (sanitized) raw arguments against a tool's contract
pub fn validate_arguments(tool: ToolName, arguments: Value) -> Result<ToolArgs, ValidationError> {
    match tool {
        ToolName::Ask => parse_args(arguments, &ASK_SCHEMA).map(ToolArgs::Ask),
        ToolName::Chat => parse_args(arguments, &CHAT_SCHEMA).map(ToolArgs::Chat),
        ToolName::Search => {
            let mut arguments = arguments;
            coerce_integer(&mut arguments, "max_results");
            parse_args(arguments, &SEARCH_SCHEMA).map(ToolArgs::Search)
        }
        ToolName::Models => Ok(ToolArgs::Models),
        ToolName::TestConnection => Ok(ToolArgs::TestConnection),
        ToolName::Health => Ok(ToolArgs::Health),
    }
}

/// Truncate a fractional number field to an integer in place
fn coerce_integer(arguments: &mut Value, field: &str) {
    let Some(slot) = arguments.get_mut(field) else {
        return;
    };
    if !slot.is_f64() {
        return;
    }
    if let Some(n) = slot.as_f64().filter(|n| n.is_finite()) {
        *slot = Value::from(n.trunc() as i64);
    }
}

/// Check arguments against the tool's schema, then parse and range-check them.
///
/// Every offending field is reported, not just the first one serde trips over.
fn parse_args<T>(arguments: Value, schema: &Value) -> Result<T, ValidationError>
where
    T: DeserializeOwned + Validate,
{
    let mut arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        object @ Value::Object(_) => object,
        _ => return Err(ValidationError::single("arguments", "must be an object")),
    };

    let mut issues = Vec::new();
    check_value("", &arguments, schema, &mut issues);

    // Stand in for rejected fields so the remaining ones still reach the validator
    if let Some(map) = arguments.as_object_mut() {
        for issue in &issues {
            let field = top_level(&issue.field);
            map.insert(field.to_string(), placeholder(&schema["properties"][field]));
        }
    }

    let flagged = |issues: &[FieldIssue], field: &str| {
        issues.iter().any(|issue| top_level(&issue.field) == field)
    };

    let parsed = match serde_json::from_value::<T>(arguments) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            let issue = serde_issue(&e);
            if !flagged(&issues, &issue.field) {
                issues.push(issue);
            }
            None
        }
    };

    if let Some(parsed) = &parsed {
        if let Err(errors) = parsed.validate() {
            for issue in validator_issues(&errors) {
                if !flagged(&issues, &issue.field) {
                    issues.push(issue);
                }
            }
        }
    }

    match parsed {
        Some(parsed) if issues.is_empty() => Ok(parsed),
        _ => {
            issues.sort_by(|a, b| a.field.cmp(&b.field));
            Err(ValidationError::InvalidArguments { issues })
        }
    }
}

/// Structural check of `value` against a generated schema: types, enums,
/// unsigned formats and required keys, recursing into objects and arrays.
fn check_value(path: &str, value: &Value, schema: &Value, issues: &mut Vec<FieldIssue>) {
    if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
        for part in parts {
            check_value(path, value, part, issues);
        }
    }
    for key in ["anyOf", "oneOf"] {
        if let Some(options) = schema.get(key).and_then(Value::as_array) {
            let mut first = None;
            let matched = options.iter().any(|option| {
                let mut found = Vec::new();
                check_value(path, value, option, &mut found);
                let ok = found.is_empty();
                first.get_or_insert(found);
                ok
            });
            if !matched {
                issues.extend(first.unwrap_or_default());
            }
        }
    }

    let field = if path.is_empty() { "arguments" } else { path };

    let expected: Vec<&str> = match schema.get("type") {
        Some(Value::String(ty)) => vec![ty.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    if !expected.is_empty() && !expected.iter().any(|ty| has_type(value, ty)) {
        issues.push(FieldIssue::new(field, format!("expected {}", expected.join(" or "))));
        return;
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let names: Vec<String> = allowed.iter().map(Value::to_string).collect();
            issues.push(FieldIssue::new(field, format!("must be one of {}", names.join(", "))));
            return;
        }
    }

    if let Some(format) = schema.get("format").and_then(Value::as_str) {
        if format.starts_with("uint") && value.as_f64().is_some_and(|n| n < 0.0) {
            issues.push(FieldIssue::new(field, "must not be negative"));
            return;
        }
        if format == "uint32" && value.as_u64().is_some_and(|n| n > u64::from(u32::MAX)) {
            issues.push(FieldIssue::new(field, "is too large"));
            return;
        }
    }

    match value {
        Value::Object(map) => {
            let required = schema.get("required").and_then(Value::as_array);
            for key in required.into_iter().flatten().filter_map(Value::as_str) {
                if !map.contains_key(key) {
                    issues.push(FieldIssue::new(join(path, key), "is required"));
                }
            }
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (key, property) in properties {
                    if let Some(value) = map.get(key) {
                        check_value(&join(path, key), value, property, issues);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check_value(&format!("{}[{}]", path, i), item, item_schema, issues);
                }
            }
        }
        _ => {}
    }
}

fn has_type(value: &Value, ty: &str) -> bool {
    match ty {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// `messages[0].role` -> `messages`
fn top_level(path: &str) -> &str {
    path.split(['.', '[']).next().unwrap_or(path)
}

/// A value that satisfies `schema`, used in place of a rejected field
fn placeholder(schema: &Value) -> Value {
    if let Some(default) = schema.get("default") {
        return default.clone();
    }
    if let Some(first) = schema.get("enum").and_then(|values| values.get(0)) {
        return first.clone();
    }
    if let Some(part) = schema.get("allOf").and_then(|parts| parts.get(0)) {
        return placeholder(part);
    }

    let types: Vec<&str> = match schema.get("type") {
        Some(Value::String(ty)) => vec![ty.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    if types.contains(&"null") {
        return Value::Null;
    }
    match types.first().copied() {
        Some("string") => json!(""),
        Some("array") => json!([]),
        Some("object") => json!({}),
        Some("boolean") => json!(false),
        Some("integer") | Some("number") => json!(0),
        _ => Value::Null,
    }
}

fn serde_issue(err: &serde_json::Error) -> FieldIssue {
    let message = err.to_string();
    if let Some(field) = message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
    {
        return FieldIssue::new(field, "is required");
    }
    FieldIssue::new("arguments", message)
}

fn validator_issues(errors: &ValidationErrors) -> Vec<FieldIssue> {
    errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("failed {} check", e.code));
                FieldIssue::new(field, message)
            })
        })
        .collect()
}

/// Inline JSON Schema for an argument struct, without the root title/meta-schema
fn schema_of<T: JsonSchema>() -> Value {
    let schema = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator()
        .into_root_schema_for::<T>();

    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(object) = value.as_object_mut() {
        object.remove("title");
    }
    value
}
