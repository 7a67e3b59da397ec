//! Argument parsing. Recovers a flat argument map from whatever the model sent.
//!
//! Strategies are tried in order: strict JSON, JSON with normalized quotes,
//! JSON without trailing commas (alone and combined with quote
//! normalization), and finally `key=value` pairs.

use std::sync::LazyLock;

use ferrule_core::error::ToolError;
use ferrule_core::tool::ToolArgs;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentParseError {
    #[error("expected a JSON object of arguments, got {found}")]
    NotAnObject { found: &'static str },

    #[error("could not parse arguments {snippet:?}: {reason}")]
    Unparsable { snippet: String, reason: String },
}

impl From<ArgumentParseError> for ToolError {
    fn from(e: ArgumentParseError) -> Self {
        ToolError::MalformedInput(e.to_string())
    }
}

static TRAILING_COMMA: LazyLock<Option<regex_lite::Regex>> =
    LazyLock::new(|| regex_lite::Regex::new(r",\s*([}\]])").ok());

static KEY_VALUE: LazyLock<Option<regex_lite::Regex>> = LazyLock::new(|| {
    regex_lite::Regex::new(
        r#"([A-Za-z_][A-Za-z0-9_.\-]*)\s*[=:]\s*("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|[^,;\s]*)"#,
    )
    .ok()
});

/// Parse raw tool-call arguments into a map.
pub fn parse_arguments(raw: &str) -> Result<ToolArgs, ArgumentParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(ToolArgs::new());
    }

    let strict_error = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return into_object(value),
        Err(e) => e.to_string(),
    };

    let quoted = normalize_quotes(trimmed);
    let without_commas = strip_trailing_commas(trimmed);
    let both = strip_trailing_commas(&quoted);
    for candidate in [&quoted, &without_commas, &both] {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return into_object(value);
        }
    }

    if !trimmed.starts_with(['{', '[']) && let Some(map) = parse_key_values(trimmed) {
        return Ok(map);
    }

    Err(ArgumentParseError::Unparsable {
        snippet: snippet(trimmed),
        reason: strict_error,
    })
}

fn into_object(value: Value) -> Result<ToolArgs, ArgumentParseError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ArgumentParseError::NotAnObject {
            found: json_type(&other),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn normalize_quotes(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\'' | '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect()
}

fn strip_trailing_commas(input: &str) -> String {
    match TRAILING_COMMA.as_ref() {
        Some(re) => re.replace_all(input, "$1").into_owned(),
        None => input.to_string(),
    }
}

/// `key=value` pairs separated by commas, semicolons, newlines or whitespace.
/// Anything left over between pairs makes the whole input unparsable.
fn parse_key_values(input: &str) -> Option<ToolArgs> {
    let re = KEY_VALUE.as_ref()?;
    let mut map = ToolArgs::new();
    let mut last_end = 0;

    for caps in re.captures_iter(input) {
        let whole = caps.get(0)?;
        if !is_separator_run(&input[last_end..whole.start()]) {
            return None;
        }
        last_end = whole.end();
        let key = caps.get(1)?.as_str().to_string();
        let value = typed_value(caps.get(2)?.as_str());
        map.insert(key, value);
    }

    if map.is_empty() || !is_separator_run(&input[last_end..]) {
        return None;
    }
    Some(map)
}

fn is_separator_run(s: &str) -> bool {
    s.chars().all(|c| c == ',' || c == ';' || c.is_whitespace())
}

fn typed_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
    {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }
    match raw {
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>()
        && let Some(n) = serde_json::Number::from_f64(f)
    {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

fn snippet(input: &str) -> String {
    const MAX: usize = 80;
    if input.chars().count() <= MAX {
        input.to_string()
    } else {
        let head: String = input.chars().take(MAX).collect();
        format!("{head}...")
    }
}
