//! Value normalizers
//!
//! Pure functions that canonicalize attribute values so that semantically
//! equal values never show up as a diff: region slugs, DNS record data,
//! JSON documents, and the deterministic hashes used to key set elements.

use sha2::{Digest, Sha256};

use crate::resource::Value;

/// DNS record types whose `data` names a host
pub const HOST_RECORD_TYPES: &[&str] = &["CNAME", "MX", "NS", "SRV", "CAA"];

/// Normalize a region slug (e.g., "NYC3" -> "nyc3")
pub fn normalize_region(s: &str) -> String {
    s.to_lowercase()
}

/// State function form of [`normalize_region`]
pub fn normalize_region_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_region(s)),
        other => other.clone(),
    }
}

/// Stable non-negative 31-bit hash of a string
pub fn hash_string(s: &str) -> u32 {
    let digest = Sha256::digest(s.as_bytes());
    let bytes = [digest[0], digest[1], digest[2], digest[3]];
    u32::from_be_bytes(bytes) & 0x7fff_ffff
}

/// Stable hash of an attribute value, used as the default set-element key
pub fn hash_value(value: &Value) -> u32 {
    hash_string(&canonical_string(value))
}

/// Canonical textual form of a value: map keys sorted, sets in hash order
pub fn canonical_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(canonical_string).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Set(set) => {
            let parts: Vec<String> = set.hashes().map(|h| h.to_string()).collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Map(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}={}", k, canonical_string(&map[k])))
                .collect();
            format!("<{}>", parts.join(";"))
        }
    }
}

fn is_host_record(record_type: &str) -> bool {
    HOST_RECORD_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(record_type))
}

/// Ensure host-typed record data is fully qualified with a single trailing dot.
///
/// `@` (the zone apex) and data of non-host record types pass through unchanged.
pub fn normalize_dns_data(record_type: &str, data: &str) -> String {
    if !is_host_record(record_type) || data == "@" {
        return data.to_string();
    }
    format!("{}.", data.trim_end_matches('.'))
}

/// Whether two record data values name the same target within `domain`.
///
/// Host data is absolute with or without its trailing dot, the same way
/// [`normalize_dns_data`] writes it; `@` stands for the bare domain.
pub fn dns_data_equivalent(record_type: &str, a: &str, b: &str, domain: &str) -> bool {
    if a == b {
        return true;
    }
    if !is_host_record(record_type) {
        return false;
    }
    let expand = |v: &str| -> String {
        let v = if v == "@" { domain } else { v };
        v.trim_end_matches('.').to_lowercase()
    };
    expand(a) == expand(b)
}

/// Whether two JSON documents are structurally equal, ignoring key order and whitespace.
///
/// Unparseable input is only equal to byte-identical input.
pub fn json_equivalent(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) {
        (Ok(left), Ok(right)) => left == right,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_region() {
        assert_eq!(normalize_region("NYC3"), "nyc3");
        assert_eq!(normalize_region("lon1"), "lon1");
        assert_eq!(
            normalize_region_value(&Value::from("AMS3")),
            Value::from("ams3")
        );
    }

    #[test]
    fn hashes_are_stable_and_non_negative() {
        assert_eq!(hash_string("web"), hash_string("web"));
        assert_ne!(hash_string("web"), hash_string("db"));
        assert!(hash_string("anything") <= 0x7fff_ffff);
    }

    #[test]
    fn canonical_string_ignores_map_order() {
        let a = Value::Map(
            [("a".to_string(), Value::Int(1)), ("b".to_string(), Value::Int(2))]
                .into_iter()
                .collect(),
        );
        let b = Value::Map(
            [("b".to_string(), Value::Int(2)), ("a".to_string(), Value::Int(1))]
                .into_iter()
                .collect(),
        );
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn dns_data_gets_single_trailing_dot() {
        assert_eq!(
            normalize_dns_data("CNAME", "target.example.com"),
            "target.example.com."
        );
        assert_eq!(
            normalize_dns_data("MX", "mail.example.com.."),
            "mail.example.com."
        );
        assert_eq!(normalize_dns_data("CNAME", "@"), "@");
        assert_eq!(normalize_dns_data("A", "192.0.2.1"), "192.0.2.1");
    }

    #[test]
    fn dns_trailing_dot_is_equivalent() {
        assert!(dns_data_equivalent(
            "CNAME",
            "target.example.com",
            "target.example.com.",
            "example.com"
        ));
        assert!(dns_data_equivalent(
            "NS",
            "NS1.Example.com",
            "ns1.example.com.",
            "example.com"
        ));
        assert!(dns_data_equivalent("CNAME", "@", "example.com.", "example.com"));
        assert!(!dns_data_equivalent(
            "CNAME",
            "a.example.com",
            "b.example.com.",
            "example.com"
        ));
        assert!(!dns_data_equivalent("A", "192.0.2.1", "192.0.2.1.", "example.com"));
    }

    #[test]
    fn host_data_outside_the_zone_is_absolute() {
        assert!(dns_data_equivalent(
            "CNAME",
            "foo.herokuapp.com",
            "foo.herokuapp.com.",
            "example.com"
        ));
        assert!(dns_data_equivalent(
            "CNAME",
            &normalize_dns_data("CNAME", "foo.herokuapp.com"),
            "foo.herokuapp.com",
            "example.com"
        ));
        assert!(!dns_data_equivalent(
            "CNAME",
            "foo",
            "foo.example.com.",
            "example.com"
        ));
        assert!(dns_data_equivalent("MX", "@", "@", "example.com"));
    }

    #[test]
    fn json_policies_ignore_order_and_whitespace() {
        let a = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":"s3:GetObject"}]}"#;
        let b = r#"{
            "Statement": [ { "Action": "s3:GetObject", "Effect": "Allow" } ],
            "Version": "2012-10-17"
        }"#;
        assert!(json_equivalent(a, b));
        assert!(!json_equivalent(a, r#"{"Version":"2012-10-17","Statement":[]}"#));
        assert!(!json_equivalent("not json", "also not json"));
    }
}
