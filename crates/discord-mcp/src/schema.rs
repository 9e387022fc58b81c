// crates/discord-mcp/src/schema.rs
// ============================================================================
// Module: Tool Parameter Schemas
// Description: Typed constraint tree for tool parameters.
// Purpose: Declare parameter constraints once and render them as JSON Schema.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! A [`Schema`] is a recursive constraint node: a declared type plus optional
//! string, numeric, array and object constraints, a required-field list and
//! composition [`Condition`]s. The same tree drives [`crate::validation`] and
//! is serialized as the `inputSchema` advertised by `tools/list`.

// ============================================================================
// SECTION: Imports
// ============================================================================


use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Declared JSON type of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    /// UTF-8 string.
    String,
    /// Number without a fractional part.
    Integer,
    /// Any JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl SchemaType {
    /// Returns the JSON Schema type keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// Payload-wide composition constraint evaluated over field presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Every named field is present.
    Required(Vec<String>),
    /// Every sub-condition holds.
    AllOf(Vec<Self>),
    /// At least one sub-condition holds.
    AnyOf(Vec<Self>),
    /// The sub-condition does not hold.
    Not(Box<Self>),
}

impl Condition {
    /// Builds a presence requirement over the given fields.
    #[must_use]
    pub fn required(fields: &[&str]) -> Self {
        Self::Required(fields.iter().map(|field| (*field).to_string()).collect())
    }

    /// Builds an "at most one of" constraint over the given fields.
    #[must_use]
    pub fn at_most_one_of(fields: &[&str]) -> Self {
        let mut pairs = Vec::new();
        for (index, first) in fields.iter().enumerate() {
            for second in &fields[index + 1..] {
                pairs.push(Self::AllOf(vec![Self::required(&[*first]), Self::required(&[*second])]));
            }
        }
        Self::Not(Box::new(Self::AnyOf(pairs)))
    }

    /// Builds an "at least one of" constraint over the given fields.
    #[must_use]
    pub fn at_least_one_of(fields: &[&str]) -> Self {
        Self::AnyOf(fields.iter().map(|field| Self::required(&[*field])).collect())
    }

    /// Returns true when the condition holds for the payload.
    #[must_use]
    pub fn holds(&self, payload: &Map<String, Value>) -> bool {
        match self {
            Self::Required(fields) => fields.iter().all(|field| payload.contains_key(field)),
            Self::AllOf(conditions) => conditions.iter().all(|condition| condition.holds(payload)),
            Self::AnyOf(conditions) => conditions.iter().any(|condition| condition.holds(payload)),
            Self::Not(condition) => !condition.holds(payload),
        }
    }

    /// Renders the condition as a JSON Schema fragment.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        match self {
            Self::Required(fields) => {
                out.insert("required".to_string(), strings(fields));
            }
            Self::AllOf(conditions) => {
                out.insert("allOf".to_string(), conditions_json(conditions));
            }
            Self::AnyOf(conditions) => {
                out.insert("anyOf".to_string(), conditions_json(conditions));
            }
            Self::Not(condition) => {
                out.insert("not".to_string(), condition.to_json());
            }
        }
        Value::Object(out)
    }
}

/// Recursive parameter constraint node.
///
/// # Invariants
/// - `properties == None` disables the unknown-field check for this node.
/// - Property names are unique and keep their declaration order.
/// - Fields named in `required` count as declared even without a property.
/// - Length bounds count characters, not bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Declared type.
    pub kind: SchemaType,
    /// Human-readable description.
    pub description: Option<String>,
    /// Minimum string length.
    pub min_length: Option<usize>,
    /// Maximum string length.
    pub max_length: Option<usize>,
    /// Regex the string must match.
    pub pattern: Option<String>,
    /// Allowed string values.
    pub enum_values: Vec<String>,
    /// Inclusive numeric lower bound.
    pub minimum: Option<Number>,
    /// Inclusive numeric upper bound.
    pub maximum: Option<Number>,
    /// Minimum array item count.
    pub min_items: Option<usize>,
    /// Maximum array item count.
    pub max_items: Option<usize>,
    /// Whether array items must be distinct.
    pub unique_items: bool,
    /// Array item schema.
    pub items: Option<Box<Self>>,
    /// Declared object properties in declaration order.
    pub properties: Option<Vec<(String, Self)>>,
    /// Required object fields.
    pub required: Vec<String>,
    /// Composition constraints checked after per-field validation.
    pub conditions: Vec<Condition>,
    /// Advertised default value.
    pub default: Option<Value>,
}

impl Schema {
    /// Builds an unconstrained node of the given type.
    #[must_use]
    pub const fn of(kind: SchemaType) -> Self {
        Self {
            kind,
            description: None,
            min_length: None,
            max_length: None,
            pattern: None,
            enum_values: Vec::new(),
            minimum: None,
            maximum: None,
            min_items: None,
            max_items: None,
            unique_items: false,
            items: None,
            properties: None,
            required: Vec::new(),
            conditions: Vec::new(),
            default: None,
        }
    }

    /// Builds an object node with an empty property set.
    #[must_use]
    pub fn object() -> Self {
        let mut schema = Self::of(SchemaType::Object);
        schema.properties = Some(Vec::new());
        schema
    }

    /// Builds a string node.
    #[must_use]
    pub const fn string() -> Self {
        Self::of(SchemaType::String)
    }

    /// Builds an integer node.
    #[must_use]
    pub const fn integer() -> Self {
        Self::of(SchemaType::Integer)
    }

    /// Builds a number node.
    #[must_use]
    pub const fn number() -> Self {
        Self::of(SchemaType::Number)
    }

    /// Builds a boolean node.
    #[must_use]
    pub const fn boolean() -> Self {
        Self::of(SchemaType::Boolean)
    }

    /// Builds an array node with the given item schema.
    #[must_use]
    pub fn array(items: Self) -> Self {
        let mut schema = Self::of(SchemaType::Array);
        schema.items = Some(Box::new(items));
        schema
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Sets the minimum string length.
    #[must_use]
    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    /// Sets the maximum string length.
    #[must_use]
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Sets the pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    /// Restricts the string to the given values.
    #[must_use]
    pub fn one_of_values(mut self, values: &[&str]) -> Self {
        self.enum_values = values.iter().map(|value| (*value).to_string()).collect();
        self
    }

    /// Sets the inclusive lower bound.
    #[must_use]
    pub fn minimum(mut self, min: i64) -> Self {
        self.minimum = Some(Number::from(min));
        self
    }

    /// Sets the inclusive upper bound.
    #[must_use]
    pub fn maximum(mut self, max: i64) -> Self {
        self.maximum = Some(Number::from(max));
        self
    }

    /// Sets the minimum item count.
    #[must_use]
    pub fn min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    /// Sets the maximum item count.
    #[must_use]
    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    /// Requires array items to be distinct.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique_items = true;
        self
    }

    /// Declares an object property. Redeclaring a name replaces it in place.
    #[must_use]
    pub fn property(mut self, name: &str, schema: Self) -> Self {
        let properties = self.properties.get_or_insert_with(Vec::new);
        match properties.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = schema,
            None => properties.push((name.to_string(), schema)),
        }
        self
    }

    /// Returns the declared schema of property `name`.
    #[must_use]
    pub fn property_schema(&self, name: &str) -> Option<&Self> {
        self.properties
            .as_ref()?
            .iter()
            .find_map(|(existing, schema)| (existing == name).then_some(schema))
    }

    /// Appends required fields.
    #[must_use]
    pub fn require(mut self, fields: &[&str]) -> Self {
        self.required.extend(fields.iter().map(|field| (*field).to_string()));
        self
    }

    /// Appends a composition condition.
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the advertised default.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Renders the node as a JSON Schema document.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("type".to_string(), Value::String(self.kind.as_str().to_string()));
        if let Some(description) = &self.description {
            out.insert("description".to_string(), Value::String(description.clone()));
        }
        if let Some(min) = self.min_length {
            out.insert("minLength".to_string(), Value::from(min));
        }
        if let Some(max) = self.max_length {
            out.insert("maxLength".to_string(), Value::from(max));
        }
        if let Some(pattern) = &self.pattern {
            out.insert("pattern".to_string(), Value::String(pattern.clone()));
        }
        if !self.enum_values.is_empty() {
            out.insert("enum".to_string(), strings(&self.enum_values));
        }
        if let Some(min) = &self.minimum {
            out.insert("minimum".to_string(), Value::Number(min.clone()));
        }
        if let Some(max) = &self.maximum {
            out.insert("maximum".to_string(), Value::Number(max.clone()));
        }
        if let Some(min) = self.min_items {
            out.insert("minItems".to_string(), Value::from(min));
        }
        if let Some(max) = self.max_items {
            out.insert("maxItems".to_string(), Value::from(max));
        }
        if self.unique_items {
            out.insert("uniqueItems".to_string(), Value::Bool(true));
        }
        if let Some(items) = &self.items {
            out.insert("items".to_string(), items.to_json());
        }
        if let Some(properties) = &self.properties {
            let rendered =
                properties.iter().map(|(name, schema)| (name.clone(), schema.to_json())).collect();
            out.insert("properties".to_string(), Value::Object(rendered));
            out.insert("additionalProperties".to_string(), Value::Bool(false));
        }
        if !self.required.is_empty() {
            out.insert("required".to_string(), strings(&self.required));
        }
        match self.conditions.as_slice() {
            [] => {}
            [single @ (Condition::AnyOf(_) | Condition::Not(_))] => {
                if let Value::Object(fragment) = single.to_json() {
                    out.extend(fragment);
                }
            }
            conditions => {
                out.insert("allOf".to_string(), conditions_json(conditions));
            }
        }
        if let Some(default) = &self.default {
            out.insert("default".to_string(), default.clone());
        }
        Value::Object(out)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Renders a string list as a JSON array.
fn strings(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

/// Renders a condition list as a JSON array.
fn conditions_json(conditions: &[Condition]) -> Value {
    Value::Array(conditions.iter().map(Condition::to_json).collect())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
