//! Small helpers shared by resource implementations

use doform_core::codec::{json_to_value, value_to_json};
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, Value};
use serde_json::{Map, Value as Json};
use uuid::Uuid;

/// Desired string attribute that must be present
pub fn required_str<'a>(resource: &'a Resource, key: &str) -> ProviderResult<&'a str> {
    resource
        .get_string(key)
        .ok_or_else(|| ProviderError::invalid(format!("attribute '{key}' is required")))
}

pub fn required_int(resource: &Resource, key: &str) -> ProviderResult<i64> {
    resource
        .get_int(key)
        .ok_or_else(|| ProviderError::invalid(format!("attribute '{key}' is required")))
}

/// Parse a numeric handle such as a droplet ID
pub fn numeric_id(identifier: &str) -> ProviderResult<u64> {
    identifier
        .parse()
        .map_err(|_| ProviderError::invalid(format!("invalid numeric ID '{identifier}'")))
}

/// ID field of an upstream object, whether it is a number or a string
pub fn json_id(object: &Json) -> Option<String> {
    match object.get("id")? {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Unwrap `{ "<key>": { ... } }`, failing when the upstream omitted the object
pub fn unwrap_object(mut body: Json, key: &str) -> ProviderResult<Json> {
    match body.get_mut(key).map(Json::take) {
        Some(obj @ Json::Object(_)) => Ok(obj),
        _ => Err(ProviderError::new(format!("response has no '{key}' object"))),
    }
}

pub fn str_field(object: &Json, key: &str) -> Option<String> {
    object.get(key).and_then(Json::as_str).map(str::to_string)
}

/// Slug of a nested object such as `"region": { "slug": "nyc3", ... }`
pub fn nested_slug(object: &Json, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(|v| v.get("slug"))
        .and_then(Json::as_str)
        .map(str::to_string)
}

/// Insert a JSON field as an attribute when it is present and not null
pub fn copy_field(attributes: &mut Attributes, object: &Json, wire: &str, name: &str) {
    if let Some(value) = object.get(wire).and_then(json_to_value) {
        attributes.insert(name.to_string(), value);
    }
}

/// Copy a desired attribute into a request body when the user set it
pub fn insert_present(body: &mut Map<String, Json>, resource: &Resource, key: &str) {
    if let Some(value) = resource.get(key) {
        body.insert(key.to_string(), value_to_json(value));
    }
}

/// String set attribute from a JSON array of strings (tags, URNs, ...)
pub fn string_set(object: &Json, key: &str) -> Value {
    let items = object
        .get(key)
        .and_then(Json::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Json::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Value::string_set(items)
}

/// Integer set attribute from a JSON array of numbers (droplet IDs, ...)
pub fn int_set(object: &Json, key: &str) -> Value {
    let items = object
        .get(key)
        .and_then(Json::as_array)
        .map(|arr| arr.iter().filter_map(Json::as_i64).collect::<Vec<_>>())
        .unwrap_or_default();
    Value::int_set(items)
}

/// 422 messages of an unassign whose IP has no droplet
pub const ALREADY_UNASSIGNED: &[&str] = &["not assigned", "is already unassigned"];

/// 422 messages of a detach whose volume is not attached to the droplet
pub const ALREADY_DETACHED: &[&str] = &["not attached", "attachment not found"];

/// 422 from a detach or unassign whose target is already in the requested state.
///
/// Any other 422 (a pending event, a locked droplet) is a real failure.
pub fn already_in_state(err: &ProviderError, fragments: &[&str]) -> bool {
    fragments
        .iter()
        .any(|fragment| err.is_status_with_message(422, fragment))
}

/// Unique suffix for handles the provider composes itself
pub fn unique_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Split a `/`-separated handle into exactly `n` non-empty parts
pub fn split_handle<'a>(identifier: &'a str, n: usize, shape: &str) -> ProviderResult<Vec<&'a str>> {
    let parts: Vec<&str> = identifier.splitn(n, '/').collect();
    if parts.len() != n || parts.iter().any(|p| p.is_empty()) {
        return Err(ProviderError::invalid(format!(
            "invalid ID '{identifier}': expected \"{shape}\""
        )));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_of_either_type() {
        assert_eq!(json_id(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(json_id(&json!({"id": "abc"})), Some("abc".to_string()));
        assert_eq!(json_id(&json!({})), None);
        assert!(numeric_id("12x").is_err());
    }

    #[test]
    fn unwraps_named_object() {
        let body = json!({"droplet": {"id": 1}, "links": {}});
        assert_eq!(unwrap_object(body, "droplet").unwrap(), json!({"id": 1}));
        assert!(unwrap_object(json!({"droplet": null}), "droplet").is_err());
    }

    #[test]
    fn only_known_422_messages_mean_already_done() {
        let unassigned = ProviderError::from_status(422, "The floating IP is not assigned to a Droplet.");
        let pending = ProviderError::from_status(422, "Droplet already has a pending event.");
        let missing = ProviderError::from_status(404, "not assigned");
        assert!(already_in_state(&unassigned, ALREADY_UNASSIGNED));
        assert!(!already_in_state(&pending, ALREADY_UNASSIGNED));
        assert!(!already_in_state(&missing, ALREADY_UNASSIGNED));

        let detached = ProviderError::from_status(422, "Attachment not found");
        assert!(already_in_state(&detached, ALREADY_DETACHED));
        assert!(!already_in_state(&pending, ALREADY_DETACHED));
    }

    #[test]
    fn handles_split_into_parts() {
        assert_eq!(
            split_handle("example.com/123", 2, "<domain>/<id>").unwrap(),
            vec!["example.com", "123"]
        );
        assert!(split_handle("example.com", 2, "<domain>/<id>").is_err());
        assert!(split_handle("/123", 2, "<domain>/<id>").is_err());
    }

    #[test]
    fn sets_from_arrays() {
        let obj = json!({"tags": ["web", "prod"], "droplet_ids": [3, 1]});
        assert_eq!(string_set(&obj, "tags"), Value::string_set(["prod", "web"]));
        assert_eq!(int_set(&obj, "droplet_ids"), Value::int_set([1, 3]));
        assert_eq!(string_set(&obj, "missing"), Value::string_set(Vec::<String>::new()));
        assert_eq!(unique_suffix().len(), 8);
    }
}
