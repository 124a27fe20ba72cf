//! Codec - Convert attribute trees to and from wire JSON
//!
//! Attribute names are translated through each schema's `provider_name`, nested
//! blocks recursively, and set-typed attributes are re-keyed with their element
//! hash on the way in.

use serde_json::{Map, json};

use crate::resource::{Attributes, Value, ValueSet};
use crate::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema};

/// Convert a JSON value into an attribute value; `null` has no counterpart
pub fn json_to_value(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Value::Int(i)),
            None => n.as_f64().map(Value::Float),
        },
        serde_json::Value::Array(arr) => Some(Value::List(
            arr.iter().filter_map(json_to_value).collect(),
        )),
        serde_json::Value::Object(obj) => Some(Value::Map(
            obj.iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
    }
}

/// Convert an attribute value into JSON; sets become arrays in hash order
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => json!(s),
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Bool(b) => json!(b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Set(set) => serde_json::Value::Array(set.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

/// Encode desired attributes into a wire object.
///
/// Computed-only attributes and `_`-prefixed keys are skipped; attributes
/// without a schema entry pass through under their own name.
pub fn to_wire(schema: &ResourceSchema, attributes: &Attributes) -> Map<String, serde_json::Value> {
    let attributes = schema.normalize(attributes);
    let mut wire = Map::new();
    for (name, value) in &attributes {
        if name.starts_with('_') {
            continue;
        }
        match schema.get(name) {
            Some(attr) if attr.computed_only => {}
            Some(attr) => {
                wire.insert(
                    attr.wire_name().to_string(),
                    encode(&attr.attr_type, value),
                );
            }
            None => {
                wire.insert(name.clone(), value_to_json(value));
            }
        }
    }
    wire
}

/// Decode a wire object into attributes, keeping only what the schema declares
pub fn from_wire(schema: &ResourceSchema, wire: &serde_json::Value) -> Attributes {
    decode_attributes(schema.attributes.values(), wire)
}

/// Decode a wire object against a nested block schema (e.g. a data-list record)
pub fn from_wire_block(block: &BlockSchema, wire: &serde_json::Value) -> Attributes {
    decode_attributes(block.attributes.values(), wire)
}

fn decode_attributes<'a>(
    attrs: impl Iterator<Item = &'a AttributeSchema>,
    wire: &serde_json::Value,
) -> Attributes {
    let mut attributes = Attributes::new();
    for attr in attrs {
        if let Some(value) = wire.get(attr.wire_name()).and_then(|j| decode(attr, j)) {
            attributes.insert(attr.name.clone(), value);
        }
    }
    attributes
}

fn encode(attr_type: &AttributeType, value: &Value) -> serde_json::Value {
    match (attr_type, value) {
        (AttributeType::Block(block), Value::Map(map)) => encode_block(block, map),
        (
            AttributeType::List(inner) | AttributeType::Set(inner),
            Value::List(_) | Value::Set(_),
        ) => serde_json::Value::Array(
            value
                .elements()
                .unwrap_or_default()
                .into_iter()
                .map(|v| encode(inner, v))
                .collect(),
        ),
        (AttributeType::Map(inner), Value::Map(map)) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), encode(inner, v)))
                .collect(),
        ),
        _ => value_to_json(value),
    }
}

fn encode_block(block: &BlockSchema, map: &Attributes) -> serde_json::Value {
    let mut obj = Map::new();
    for (name, value) in map {
        match block.attributes.get(name) {
            Some(attr) if attr.computed_only => {}
            Some(attr) => {
                obj.insert(attr.wire_name().to_string(), encode(&attr.attr_type, value));
            }
            None => {
                obj.insert(name.clone(), value_to_json(value));
            }
        }
    }
    serde_json::Value::Object(obj)
}

fn decode(attr: &AttributeSchema, json: &serde_json::Value) -> Option<Value> {
    let value = decode_typed(&attr.attr_type, json)?;
    Some(match (&attr.attr_type, value) {
        (AttributeType::Set(_), Value::List(items)) => match attr.set_hash {
            Some(hasher) => Value::Set(ValueSet::with_hasher(items, hasher)),
            None => Value::Set(ValueSet::from_values(items)),
        },
        (_, other) => other,
    })
}

fn decode_typed(attr_type: &AttributeType, json: &serde_json::Value) -> Option<Value> {
    match (attr_type.base(), json) {
        (AttributeType::Int, serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Value::Int),
        (AttributeType::Float, serde_json::Value::Number(n)) => n.as_f64().map(Value::Float),
        (AttributeType::Block(block), serde_json::Value::Object(_)) => {
            Some(Value::Map(decode_attributes(block.attributes.values(), json)))
        }
        (AttributeType::List(inner) | AttributeType::Set(inner), serde_json::Value::Array(arr)) => {
            Some(Value::List(
                arr.iter().filter_map(|j| decode_typed(inner, j)).collect(),
            ))
        }
        (AttributeType::Map(inner), serde_json::Value::Object(obj)) => Some(Value::Map(
            obj.iter()
                .filter_map(|(k, v)| decode_typed(inner, v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        _ => json_to_value(json),
    }
}
