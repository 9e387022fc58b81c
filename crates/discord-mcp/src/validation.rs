// crates/discord-mcp/src/validation.rs
// ============================================================================
// Module: Parameter Validation
// Description: Recursive constraint engine for tool parameter payloads.
// Purpose: Reject malformed tool arguments before any permission check runs.
// Dependencies: bigdecimal, regex, serde_json
// ============================================================================

//! ## Overview
//! [`Validator::validate`] checks a payload against a [`Schema`] in a fixed
//! order: required fields, unknown fields, per-field constraints in payload
//! order, then composition conditions. The first failure short-circuits.
//!
//! ## Invariants
//! - One validator is shared by the router for the process lifetime; the
//!   pattern cache carries its own lock so `validate` takes `&self`.
//! - A pattern string is compiled at most once per validator.
//! - Numeric bounds compare as decimals regardless of integer/float encoding.
//!
//! Security posture: tool arguments are untrusted client input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::PoisonError;

use bigdecimal::BigDecimal;
use regex::Regex;
use serde::Serialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::protocol::ToolCallResult;
use crate::schema::Condition;
use crate::schema::Schema;
use crate::schema::SchemaType;

// ============================================================================
// SECTION: Failure Types
// ============================================================================

/// Validation failure classification.
///
/// # Invariants
/// - Labels are stable; clients match on `error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A required field is absent.
    MissingRequired,
    /// A field is not declared by the schema.
    UnknownParameter,
    /// A field is explicitly null.
    NullValue,
    /// A field has the wrong JSON type.
    TypeMismatch,
    /// A string is too short or too long.
    LengthConstraint,
    /// A declared pattern does not compile.
    PatternError,
    /// A string does not match the declared pattern.
    PatternMismatch,
    /// A string is outside the declared value set.
    EnumConstraint,
    /// A number is outside the declared bounds.
    RangeConstraint,
    /// An array has too few or too many items.
    ArrayConstraint,
    /// An array contains duplicate items.
    UniquenessConstraint,
    /// A composition condition failed.
    ConditionalConstraint,
}

impl ValidationErrorKind {
    /// Returns the stable label for the failure kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingRequired => "missing required parameter",
            Self::UnknownParameter => "unknown parameter",
            Self::NullValue => "null value",
            Self::TypeMismatch => "type mismatch",
            Self::LengthConstraint => "length constraint",
            Self::PatternError => "pattern error",
            Self::PatternMismatch => "pattern mismatch",
            Self::EnumConstraint => "enum constraint",
            Self::RangeConstraint => "range constraint",
            Self::ArrayConstraint => "array constraint",
            Self::UniquenessConstraint => "uniqueness constraint",
            Self::ConditionalConstraint => "conditional constraint",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl Serialize for ValidationErrorKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// First constraint violation found in a payload.
///
/// # Invariants
/// - `field` is `None` only for payload-wide composition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct ValidationFailure {
    /// Failure classification.
    pub kind: ValidationErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Offending field path (`embeds[0].title`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ValidationFailure {
    /// Builds a failure attributed to a field.
    fn at(kind: ValidationErrorKind, field: &str, message: String) -> Self {
        Self {
            kind,
            message,
            field: Some(field.to_string()),
        }
    }

    /// Builds a payload-wide failure.
    fn payload(kind: ValidationErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_string(),
            field: None,
        }
    }

    /// Renders the failure as an `isError` tool result.
    #[must_use]
    pub fn to_tool_result(&self) -> ToolCallResult {
        let mut data = json!({
            "error_type": self.kind.as_str(),
            "message": self.message,
        });
        if let (Some(field), Value::Object(map)) = (&self.field, &mut data) {
            map.insert("field".to_string(), Value::String(field.clone()));
        }
        ToolCallResult::error(format!("❌ Validation Error: {}", self.message), data)
    }
}

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Schema validator with a lazily populated pattern cache.
#[derive(Debug, Default)]
pub struct Validator {
    /// Compiled patterns keyed by pattern string.
    patterns: Mutex<BTreeMap<String, Regex>>,
}

impl Validator {
    /// Creates a validator with an empty pattern cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `payload` against `schema`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationFailure`] encountered.
    pub fn validate(
        &self,
        schema: &Schema,
        payload: &Map<String, Value>,
    ) -> Result<(), ValidationFailure> {
        self.validate_object(None, schema, payload)
    }

    /// Returns the number of distinct compiled patterns.
    #[must_use]
    pub fn cached_patterns(&self) -> usize {
        self.patterns.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Validates an object against its schema; `prefix` is the parent path.
    fn validate_object(
        &self,
        prefix: Option<&str>,
        schema: &Schema,
        payload: &Map<String, Value>,
    ) -> Result<(), ValidationFailure> {
        for name in &schema.required {
            if !payload.contains_key(name) {
                let field = join_path(prefix, name);
                return Err(ValidationFailure::at(
                    ValidationErrorKind::MissingRequired,
                    &field,
                    format!("required parameter '{field}' is missing"),
                ));
            }
        }
        if schema.properties.is_some() {
            for name in payload.keys() {
                if schema.property_schema(name).is_none() && !schema.required.contains(name) {
                    let field = join_path(prefix, name);
                    return Err(ValidationFailure::at(
                        ValidationErrorKind::UnknownParameter,
                        &field,
                        format!("parameter '{field}' is not defined"),
                    ));
                }
            }
            for (name, value) in payload {
                if let Some(property) = schema.property_schema(name) {
                    self.validate_value(&join_path(prefix, name), property, value)?;
                }
            }
        }
        for condition in &schema.conditions {
            if !condition.holds(payload) {
                let message = match condition {
                    Condition::Not(_) => "the specified condition must not be satisfied",
                    _ => "at least one of the specified conditions must be met",
                };
                return Err(ValidationFailure::payload(
                    ValidationErrorKind::ConditionalConstraint,
                    message,
                ));
            }
        }
        Ok(())
    }

    /// Validates one value against its property schema.
    fn validate_value(
        &self,
        field: &str,
        schema: &Schema,
        value: &Value,
    ) -> Result<(), ValidationFailure> {
        check_type(field, schema.kind, value)?;
        match value {
            Value::String(text) => self.validate_string(field, schema, text),
            Value::Number(number) => validate_number(field, schema, number),
            Value::Array(items) => self.validate_array(field, schema, items),
            Value::Object(map) if schema.properties.is_some() => {
                self.validate_object(Some(field), schema, map)
            }
            _ => Ok(()),
        }
    }

    /// Applies string length, pattern and enum constraints.
    fn validate_string(
        &self,
        field: &str,
        schema: &Schema,
        text: &str,
    ) -> Result<(), ValidationFailure> {
        let length = text.chars().count();
        if let Some(min) = schema.min_length
            && length < min
        {
            return Err(ValidationFailure::at(
                ValidationErrorKind::LengthConstraint,
                field,
                format!("parameter '{field}' must be at least {min} characters, got {length}"),
            ));
        }
        if let Some(max) = schema.max_length
            && length > max
        {
            return Err(ValidationFailure::at(
                ValidationErrorKind::LengthConstraint,
                field,
                format!("parameter '{field}' must be at most {max} characters, got {length}"),
            ));
        }
        if let Some(pattern) = &schema.pattern {
            let regex = self.compiled(pattern).map_err(|err| {
                ValidationFailure::at(
                    ValidationErrorKind::PatternError,
                    field,
                    format!("invalid regex pattern for parameter '{field}': {err}"),
                )
            })?;
            if !regex.is_match(text) {
                return Err(ValidationFailure::at(
                    ValidationErrorKind::PatternMismatch,
                    field,
                    format!("parameter '{field}' does not match required pattern: {pattern}"),
                ));
            }
        }
        if !schema.enum_values.is_empty() && !schema.enum_values.iter().any(|value| value == text)
        {
            return Err(ValidationFailure::at(
                ValidationErrorKind::EnumConstraint,
                field,
                format!(
                    "parameter '{field}' must be one of: {}, got '{text}'",
                    schema.enum_values.join(", ")
                ),
            ));
        }
        Ok(())
    }

    /// Applies item count, uniqueness and item schema constraints.
    fn validate_array(
        &self,
        field: &str,
        schema: &Schema,
        items: &[Value],
    ) -> Result<(), ValidationFailure> {
        let count = items.len();
        if let Some(min) = schema.min_items
            && count < min
        {
            return Err(ValidationFailure::at(
                ValidationErrorKind::ArrayConstraint,
                field,
                format!("parameter '{field}' must have at least {min} items, got {count}"),
            ));
        }
        if let Some(max) = schema.max_items
            && count > max
        {
            return Err(ValidationFailure::at(
                ValidationErrorKind::ArrayConstraint,
                field,
                format!("parameter '{field}' must have at most {max} items, got {count}"),
            ));
        }
        if schema.unique_items {
            for (index, item) in items.iter().enumerate() {
                if items[..index].contains(item) {
                    return Err(ValidationFailure::at(
                        ValidationErrorKind::UniquenessConstraint,
                        field,
                        format!("parameter '{field}' contains duplicate items"),
                    ));
                }
            }
        }
        if let Some(item_schema) = &schema.items {
            for (index, item) in items.iter().enumerate() {
                self.validate_value(&format!("{field}[{index}]"), item_schema, item)?;
            }
        }
        Ok(())
    }

    /// Returns the compiled pattern, compiling and caching it on first use.
    fn compiled(&self, pattern: &str) -> Result<Regex, regex::Error> {
        let mut cache = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)?;
        cache.insert(pattern.to_string(), regex.clone());
        drop(cache);
        Ok(regex)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Joins a parent path and a field name.
fn join_path(prefix: Option<&str>, name: &str) -> String {
    prefix.map_or_else(|| name.to_string(), |prefix| format!("{prefix}.{name}"))
}

/// Checks the structural JSON type of a value.
fn check_type(field: &str, expected: SchemaType, value: &Value) -> Result<(), ValidationFailure> {
    if value.is_null() {
        return Err(ValidationFailure::at(
            ValidationErrorKind::NullValue,
            field,
            format!("parameter '{field}' cannot be null"),
        ));
    }
    let matches = match expected {
        SchemaType::String => value.is_string(),
        SchemaType::Number => value.is_number(),
        SchemaType::Integer => value.as_number().is_some_and(is_integral),
        SchemaType::Boolean => value.is_boolean(),
        SchemaType::Array => value.is_array(),
        SchemaType::Object => value.is_object(),
    };
    if matches {
        return Ok(());
    }
    let article = if matches!(expected, SchemaType::Integer | SchemaType::Object | SchemaType::Array)
    {
        "an"
    } else {
        "a"
    };
    Err(ValidationFailure::at(
        ValidationErrorKind::TypeMismatch,
        field,
        format!(
            "parameter '{field}' must be {article} {}, got {}",
            expected.as_str(),
            json_type_name(value)
        ),
    ))
}

/// Applies inclusive numeric bounds using decimal comparison.
fn validate_number(field: &str, schema: &Schema, number: &Number) -> Result<(), ValidationFailure> {
    let Some(value) = decimal(number) else {
        return Err(ValidationFailure::at(
            ValidationErrorKind::TypeMismatch,
            field,
            format!("parameter '{field}' must be a finite number"),
        ));
    };
    if let Some(min) = &schema.minimum
        && decimal(min).is_some_and(|bound| value < bound)
    {
        return Err(ValidationFailure::at(
            ValidationErrorKind::RangeConstraint,
            field,
            format!("parameter '{field}' must be at least {min}, got {number}"),
        ));
    }
    if let Some(max) = &schema.maximum
        && decimal(max).is_some_and(|bound| value > bound)
    {
        return Err(ValidationFailure::at(
            ValidationErrorKind::RangeConstraint,
            field,
            format!("parameter '{field}' must be at most {max}, got {number}"),
        ));
    }
    Ok(())
}

/// Converts a JSON number to a decimal.
fn decimal(number: &Number) -> Option<BigDecimal> {
    BigDecimal::from_str(&number.to_string()).ok()
}

/// Returns true when the number has no fractional part.
fn is_integral(number: &Number) -> bool {
    number.is_i64() || number.is_u64() || decimal(number).is_some_and(|value| value.is_integer())
}

/// Returns the JSON type label of a value.
const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
