//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type. A schema is data: every
//! attribute carries its type, its requiredness, and the comparator and state
//! function that decide whether an observed value differs from the desired one.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::normalize::{hash_value, json_equivalent};
use crate::resource::{Attributes, SetHashFn, Value, ValueSet};

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Floating point number
    Float,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Set (unordered, elements keyed by hash)
    Set(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested block with its own attribute schema
    Block(Box<BlockSchema>),
}

impl AttributeType {
    pub fn list_of(inner: AttributeType) -> Self {
        AttributeType::List(Box::new(inner))
    }

    pub fn set_of(inner: AttributeType) -> Self {
        AttributeType::Set(Box::new(inner))
    }

    pub fn map_of(inner: AttributeType) -> Self {
        AttributeType::Map(Box::new(inner))
    }

    pub fn block(block: BlockSchema) -> Self {
        AttributeType::Block(Box::new(block))
    }

    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Float, Value::Float(_) | Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Set(inner), Value::Set(set)) => {
                for (i, item) in set.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(block), Value::Map(map)) => {
                block.validate(map).map_err(|mut errors| errors.remove(0))
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    /// Whether values of this type are scalars (string, number, bool, enum)
    pub fn is_scalar(&self) -> bool {
        match self {
            AttributeType::String
            | AttributeType::Int
            | AttributeType::Float
            | AttributeType::Bool
            | AttributeType::Enum(_) => true,
            AttributeType::Custom { base, .. } => base.is_scalar(),
            _ => false,
        }
    }

    /// The scalar type behind enums and custom types
    pub fn base(&self) -> &AttributeType {
        match self {
            AttributeType::Custom { base, .. } => base.base(),
            other => other,
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Float => "Float".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedOnly { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },
}

/// Equality capability used when comparing a desired value with an observed one
pub type EqualFn = fn(desired: &Value, observed: &Value, config: &Attributes) -> bool;

/// Transformation applied to a desired value before it is stored or compared
pub type StateFn = fn(&Value) -> Value;

/// Per-attribute comparator, chosen when the schema is constructed
#[derive(Debug, Clone, Copy, Default)]
pub enum Comparator {
    /// Structural equality
    #[default]
    Exact,
    /// String equality ignoring ASCII case
    CaseInsensitive,
    /// JSON documents equal modulo key order and whitespace
    JsonEquivalent,
    /// Attribute-specific rule that may consult the rest of the configuration
    Custom(EqualFn),
}

impl Comparator {
    pub fn equal(&self, desired: &Value, observed: &Value, config: &Attributes) -> bool {
        match self {
            Comparator::Exact => desired == observed,
            Comparator::CaseInsensitive => match (desired, observed) {
                (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
                _ => desired == observed,
            },
            Comparator::JsonEquivalent => match (desired, observed) {
                (Value::String(a), Value::String(b)) => json_equivalent(a, b),
                _ => desired == observed,
            },
            Comparator::Custom(f) => f(desired, observed, config),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Filled in by the upstream; may also be set by the user unless `required`
    pub computed: bool,
    /// Only the upstream sets this attribute
    pub computed_only: bool,
    /// Changing this attribute requires replacing the resource
    pub force_new: bool,
    /// Never shown in plan output
    pub sensitive: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Provider-side property name (e.g., "size_slug" on the wire)
    pub provider_name: Option<String>,
    pub comparator: Comparator,
    pub state_fn: Option<StateFn>,
    /// Element hash for set-typed attributes; defaults to the value hash
    pub set_hash: Option<SetHashFn>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            computed_only: false,
            force_new: false,
            sensitive: false,
            default: None,
            description: None,
            provider_name: None,
            comparator: Comparator::Exact,
            state_fn: None,
            set_hash: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Optional attribute whose value the upstream fills in when unset
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Read-only attribute reported by the upstream
    pub fn computed_only(mut self) -> Self {
        self.computed = true;
        self.computed_only = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_state_fn(mut self, state_fn: StateFn) -> Self {
        self.state_fn = Some(state_fn);
        self
    }

    pub fn with_set_hash(mut self, hasher: SetHashFn) -> Self {
        self.set_hash = Some(hasher);
        self
    }

    /// Wire name of this attribute
    pub fn wire_name(&self) -> &str {
        self.provider_name.as_deref().unwrap_or(&self.name)
    }

    /// Apply the state function and set hashing to a desired value
    pub fn normalize(&self, value: &Value) -> Value {
        let value = match self.state_fn {
            Some(f) => f(value),
            None => value.clone(),
        };
        match (&self.attr_type, value) {
            (AttributeType::Set(_), Value::List(items)) => {
                Value::Set(ValueSet::with_hasher(items, self.set_hash.unwrap_or(hash_value)))
            }
            (AttributeType::Set(_), Value::Set(set)) if self.set_hash.is_some() => {
                let hasher = self.set_hash.unwrap_or(hash_value);
                Value::Set(ValueSet::with_hasher(set.iter().cloned(), hasher))
            }
            (_, other) => other,
        }
    }
}

/// Attribute set of a nested block
#[derive(Debug, Clone, Default)]
pub struct BlockSchema {
    pub attributes: HashMap<String, AttributeSchema>,
}

impl BlockSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn validate(&self, attributes: &Attributes) -> Result<(), Vec<TypeError>> {
        validate_attributes(&self.attributes, attributes, false)
    }
}

/// Operation timeouts of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const DEFAULT: Duration = Duration::from_secs(60 * 60);

    pub fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            update: timeout,
            delete: timeout,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(Self::DEFAULT)
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    pub timeouts: Timeouts,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            timeouts: Timeouts::default(),
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &Attributes) -> Result<(), Vec<TypeError>> {
        validate_attributes(&self.attributes, attributes, true)
    }

    /// Apply defaults, state functions and set hashing to desired attributes
    pub fn normalize(&self, attributes: &Attributes) -> Attributes {
        let mut normalized = Attributes::new();
        for (name, value) in attributes {
            let value = match self.attributes.get(name) {
                Some(schema) => schema.normalize(value),
                None => value.clone(),
            };
            normalized.insert(name.clone(), value);
        }
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default
                && !normalized.contains_key(name)
            {
                normalized.insert(name.clone(), schema.normalize(default));
            }
        }
        normalized
    }

    /// Names of every attribute that changing forces a replacement
    pub fn force_new_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .attributes
            .values()
            .filter(|a| a.force_new)
            .map(|a| a.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

fn validate_attributes(
    schemas: &HashMap<String, AttributeSchema>,
    attributes: &Attributes,
    top_level: bool,
) -> Result<(), Vec<TypeError>> {
    let mut errors = Vec::new();

    // Check required attributes
    for (name, schema) in schemas {
        if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
            errors.push(TypeError::MissingRequired { name: name.clone() });
        }
    }

    // Type check each attribute
    for (name, value) in attributes {
        match schemas.get(name) {
            Some(schema) if schema.computed_only && top_level => {
                errors.push(TypeError::ComputedOnly { name: name.clone() });
            }
            Some(schema) => {
                if let Err(e) = schema.attr_type.validate(value) {
                    errors.push(TypeError::AttributeError {
                        name: name.clone(),
                        inner: Box::new(e),
                    });
                }
            }
            None if !top_level => {
                errors.push(TypeError::UnknownAttribute { name: name.clone() });
            }
            // Unknown top-level attributes are allowed (for flexibility)
            None => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if *n > 0 {
                        Ok(())
                    } else {
                        Err("Value must be positive".to_string())
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// TCP/UDP port number (1-65535)
    pub fn port() -> AttributeType {
        AttributeType::Custom {
            name: "Port".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if (1..=65535).contains(n) => Ok(()),
                Value::Int(n) => Err(format!("Port {} out of range 1-65535", n)),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// CIDR block type (e.g., "10.0.0.0/16")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| {
                if let Value::String(s) = value {
                    validate_cidr(s)
                } else {
                    Err("Expected string".to_string())
                }
            },
        }
    }

    /// Region slug type; must already be lowercase after normalization
    pub fn region() -> AttributeType {
        AttributeType::Custom {
            name: "Region".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()) => {
                    Ok(())
                }
                Value::String(s) => Err(format!("Invalid region slug '{}'", s)),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// JSON document type
    pub fn json() -> AttributeType {
        AttributeType::Custom {
            name: "Json".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                    .map(|_| ())
                    .map_err(|e| format!("Invalid JSON: {}", e)),
                _ => Err("Expected string".to_string()),
            },
        }
    }
}

/// Validate CIDR block format (e.g., "10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let parts: Vec<&str> = cidr.split('/').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid CIDR format '{}': expected IP/prefix",
            cidr
        ));
    }

    let ip = parts[0];
    let prefix = parts[1];

    // Validate IP address
    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return Err(format!("Invalid IP address '{}': expected 4 octets", ip));
    }

    for octet in &octets {
        if octet.parse::<u8>().is_err() {
            return Err(format!(
                "Invalid octet '{}' in IP address: must be 0-255",
                octet
            ));
        }
    }

    // Validate prefix length
    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-32", p)),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            prefix
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_region_value;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["asc".to_string(), "desc".to_string()]);
        assert!(t.validate(&Value::from("asc")).is_ok());
        assert!(t.validate(&Value::from("sideways")).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(100)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
    }

    #[test]
    fn validate_port() {
        let t = types::port();
        assert!(t.validate(&Value::Int(443)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(70000)).is_err());
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("resource")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("count", types::positive_int()))
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("my-resource".to_string()));
        attrs.insert("count".to_string(), Value::Int(5));
        attrs.insert("enabled".to_string(), Value::Bool(true));

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("bucket")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let attrs = HashMap::new();
        let result = schema.validate(&attrs);
        assert!(result.is_err());
    }

    #[test]
    fn computed_only_attribute_cannot_be_set() {
        let schema = ResourceSchema::new("droplet")
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed_only());
        let attrs = HashMap::from([("urn".to_string(), Value::from("do:droplet:1"))]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(errors[0], TypeError::ComputedOnly { .. }));
    }

    #[test]
    fn block_rejects_unknown_keys() {
        let block = BlockSchema::new()
            .attribute(AttributeSchema::new("day", AttributeType::String).required())
            .attribute(AttributeSchema::new("hour", AttributeType::String).required());
        let t = AttributeType::list_of(AttributeType::block(block));
        let good = Value::List(vec![Value::Map(HashMap::from([
            ("day".to_string(), Value::from("monday")),
            ("hour".to_string(), Value::from("10:00")),
        ]))]);
        assert!(t.validate(&good).is_ok());

        let bad = Value::List(vec![Value::Map(HashMap::from([
            ("day".to_string(), Value::from("monday")),
            ("hour".to_string(), Value::from("10:00")),
            ("minute".to_string(), Value::Int(3)),
        ]))]);
        assert!(t.validate(&bad).is_err());
    }

    #[test]
    fn normalize_applies_state_fn_and_set_hash() {
        let schema = ResourceSchema::new("droplet")
            .attribute(
                AttributeSchema::new("region", AttributeType::String)
                    .with_state_fn(normalize_region_value),
            )
            .attribute(AttributeSchema::new(
                "tags",
                AttributeType::set_of(AttributeType::String),
            ))
            .attribute(
                AttributeSchema::new("monitoring", AttributeType::Bool).with_default(false),
            );

        let attrs = HashMap::from([
            ("region".to_string(), Value::from("NYC3")),
            (
                "tags".to_string(),
                Value::List(vec![Value::from("b"), Value::from("a")]),
            ),
        ]);
        let normalized = schema.normalize(&attrs);
        assert_eq!(normalized["region"], Value::from("nyc3"));
        assert_eq!(normalized["tags"], Value::string_set(["a", "b"]));
        assert_eq!(normalized["monitoring"], Value::Bool(false));
    }

    #[test]
    fn comparators() {
        let config = Attributes::new();
        assert!(Comparator::CaseInsensitive.equal(
            &Value::from("NYC1"),
            &Value::from("nyc1"),
            &config
        ));
        assert!(Comparator::JsonEquivalent.equal(
            &Value::from(r#"{"a": 1, "b": 2}"#),
            &Value::from(r#"{"b":2,"a":1}"#),
            &config
        ));
        assert!(!Comparator::Exact.equal(&Value::from("a"), &Value::from("A"), &config));
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();

        // Valid CIDRs
        assert!(
            t.validate(&Value::String("10.0.0.0/16".to_string()))
                .is_ok()
        );
        assert!(
            t.validate(&Value::String("192.168.1.0/24".to_string()))
                .is_ok()
        );

        // Invalid CIDRs
        assert!(t.validate(&Value::String("10.0.0.0".to_string())).is_err()); // no prefix
        assert!(
            t.validate(&Value::String("10.0.0.0/33".to_string()))
                .is_err()
        ); // prefix too large
        assert!(t.validate(&Value::Int(42)).is_err()); // wrong type
    }
}
