//! Resource - Representing resources and their state

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::normalize::hash_value;

/// Attribute map shared by desired resources, observed states and data-list records
pub type Attributes = HashMap<String, Value>;

/// Hash function used to key the elements of a set-typed attribute
pub type SetHashFn = fn(&Value) -> u32;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    /// Resource type (e.g., "digitalocean_droplet")
    pub resource_type: String,
    /// Resource name (the host's local name for this instance)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Value>),
    /// Unordered collection keyed by element hash
    Set(ValueSet),
    /// Nested block or string-keyed map
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Build a set from values using the default element hash
    pub fn set(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(ValueSet::from_values(values))
    }

    /// Build a set of strings
    pub fn string_set<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Value::set(values.into_iter().map(|s| Value::String(s.into())))
    }

    /// Build a set of integers
    pub fn int_set(values: impl IntoIterator<Item = i64>) -> Self {
        Value::set(values.into_iter().map(Value::Int))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Elements of a list or set, in list order or hash order respectively
    pub fn elements(&self) -> Option<Vec<&Value>> {
        match self {
            Value::List(items) => Some(items.iter().collect()),
            Value::Set(set) => Some(set.iter().collect()),
            _ => None,
        }
    }

    /// String elements of a list or set, skipping non-string members
    pub fn string_elements(&self) -> Vec<String> {
        self.elements()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Integer elements of a list or set, skipping non-integer members
    pub fn int_elements(&self) -> Vec<i64> {
        self.elements()
            .unwrap_or_default()
            .into_iter()
            .filter_map(Value::as_int)
            .collect()
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Set(_) => "Set".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }

    /// Whether this value is the zero value of its kind
    pub fn is_empty(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Int(n) => *n == 0,
            Value::Float(f) => *f == 0.0,
            Value::Bool(b) => !*b,
            Value::List(items) => items.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::Map(map) => map.is_empty(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// Set-typed attribute value.
///
/// Elements are keyed by a deterministic hash, so two sets are equal when they
/// hold the same hashes regardless of insertion order. Iteration follows hash
/// order, which keeps re-reads after a create from re-ordering elements.
#[derive(Debug, Clone, Default)]
pub struct ValueSet {
    items: BTreeMap<u32, Value>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self::with_hasher(values, hash_value)
    }

    /// Build a set whose element identity is decided by `hasher`
    pub fn with_hasher(values: impl IntoIterator<Item = Value>, hasher: SetHashFn) -> Self {
        let mut set = Self::new();
        for value in values {
            set.items.insert(hasher(&value), value);
        }
        set
    }

    pub fn insert(&mut self, value: Value) {
        self.items.insert(hash_value(&value), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.values()
    }

    pub fn hashes(&self) -> impl Iterator<Item = u32> + '_ {
        self.items.keys().copied()
    }

    pub fn get(&self, hash: u32) -> Option<&Value> {
        self.items.get(&hash)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl PartialEq for ValueSet {
    fn eq(&self, other: &Self) -> bool {
        self.items.keys().eq(other.items.keys())
    }
}

/// Desired state declared by the user
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: Attributes,
    /// If true, this is a data source (read-only) that won't be modified
    pub read_only: bool,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            read_only: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(Value::as_int)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(Value::as_bool)
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.attributes
            .get(key)
            .map(Value::string_elements)
            .unwrap_or_default()
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Upstream handle (droplet ID, IP address, composite key, ...)
    pub identifier: Option<String>,
    pub attributes: Attributes,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: Attributes) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Keep `prior` values for attributes a refresh did not report.
    ///
    /// Write-only inputs (SSH keys, user data, secrets) are never echoed by the
    /// upstream, so a refreshed state inherits them from the stored one.
    pub fn carry_over(mut self, prior: &State) -> Self {
        if !self.exists {
            return self;
        }
        for (key, value) in &prior.attributes {
            self.attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(Value::as_int)
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.attributes
            .get(key)
            .map(Value::string_elements)
            .unwrap_or_default()
    }
}
