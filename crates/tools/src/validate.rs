//! Schema validation of parsed tool arguments.

use ferrule_core::error::ToolError;
use ferrule_core::tool::{PropertySchema, PropertyType, ToolArgs, ToolSchema};
use serde_json::Value;

/// Outcome of checking arguments against a [`ToolSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Arguments with defaults filled in and scalar strings coerced.
    pub normalized_args: ToolArgs,
    /// Required parameters that were absent.
    pub missing_fields: Vec<String>,
}

impl ValidationResult {
    /// The normalized arguments, or a tool error listing every problem.
    pub fn into_result(self) -> Result<ToolArgs, ToolError> {
        if self.valid {
            return Ok(self.normalized_args);
        }
        if self.errors.len() == self.missing_fields.len() {
            return Err(ToolError::MissingField(self.missing_fields.join("', '")));
        }
        Err(ToolError::InvalidArguments(self.errors.join("; ")))
    }
}

/// Validate `args` against `schema`. Unknown keys pass through untouched.
pub fn validate_args(schema: &ToolSchema, args: &ToolArgs) -> ValidationResult {
    let mut normalized = args.clone();
    let mut errors = Vec::new();
    let mut missing_fields = Vec::new();

    for (name, property) in &schema.properties {
        let present = normalized.get(name).filter(|v| !v.is_null()).cloned();
        let Some(value) = present else {
            if let Some(default) = &property.default {
                normalized.insert(name.clone(), default.clone());
            } else if schema.required.contains(name) {
                errors.push(format!("Missing required argument '{name}'"));
                missing_fields.push(name.clone());
            }
            continue;
        };

        match check_property(name, property, value) {
            Ok(coerced) => {
                normalized.insert(name.clone(), coerced);
            }
            Err(e) => errors.push(e),
        }
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        normalized_args: normalized,
        missing_fields,
    }
}

fn check_property(name: &str, property: &PropertySchema, value: Value) -> Result<Value, String> {
    let value = coerce(property.kind, value).map_err(|found| {
        format!(
            "Argument '{name}' must be {}, got {found}",
            property.kind.as_str()
        )
    })?;

    if let Some(allowed) = &property.enum_values
        && !allowed.contains(&value)
    {
        let options: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
        return Err(format!(
            "Argument '{name}' must be one of [{}], got {value}",
            options.join(", ")
        ));
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = property.min
            && n < min
        {
            return Err(format!("Argument '{name}' must be at least {min}, got {n}"));
        }
        if let Some(max) = property.max
            && n > max
        {
            return Err(format!("Argument '{name}' must be at most {max}, got {n}"));
        }
    }

    Ok(value)
}

/// Convert `value` to the declared type; on failure return a description of
/// what was found.
fn coerce(kind: PropertyType, value: Value) -> Result<Value, String> {
    match (kind, value) {
        (PropertyType::String, Value::String(s)) => Ok(Value::String(s)),
        (PropertyType::String, v @ (Value::Number(_) | Value::Bool(_))) => {
            Ok(Value::String(v.to_string()))
        }

        (PropertyType::Integer, Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(Value::from(i)),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Value::from(f as i64)),
            _ => Err(format!("number {n}")),
        },
        (PropertyType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("string {s:?}")),

        (PropertyType::Number, Value::Number(n)) => Ok(Value::Number(n)),
        (PropertyType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("string {s:?}")),

        (PropertyType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (PropertyType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("string {s:?}")),
        },

        (PropertyType::Array, v @ Value::Array(_)) => Ok(v),
        (PropertyType::Object, v @ Value::Object(_)) => Ok(v),
        (PropertyType::Array | PropertyType::Object, Value::String(s)) => {
            match serde_json::from_str::<Value>(&s) {
                Ok(v @ Value::Array(_)) if kind == PropertyType::Array => Ok(v),
                Ok(v @ Value::Object(_)) if kind == PropertyType::Object => Ok(v),
                _ => Err(format!("string {s:?}")),
            }
        }

        (_, other) => Err(describe(&other)),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "an array".into(),
        Value::Object(_) => "an object".into(),
    }
}
