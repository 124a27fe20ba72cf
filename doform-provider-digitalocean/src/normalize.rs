//! DigitalOcean-specific comparators and set hashes

use doform_core::normalize::{dns_data_equivalent, hash_string, hash_value};
use doform_core::resource::{Attributes, Value};

/// Hash of a load balancer forwarding rule.
///
/// The certificate enters the hash by name when one is set, so a Let's Encrypt
/// renewal (new ID, same name) leaves the rule unchanged.
pub fn hash_forwarding_rule(rule: &Value) -> u32 {
    let Some(map) = rule.as_map() else {
        return hash_string(&doform_core::normalize::canonical_string(rule));
    };
    let int = |k: &str| map.get(k).and_then(Value::as_int).unwrap_or_default();
    let lower = |k: &str| {
        map.get(k)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase()
    };
    let certificate = match map.get("certificate_name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => map
            .get("certificate_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };
    let tls_passthrough = map
        .get("tls_passthrough")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    hash_string(&format!(
        "{}-{}-{}-{}-{}-{}-",
        int("entry_port"),
        lower("entry_protocol"),
        int("target_port"),
        lower("target_protocol"),
        certificate,
        tls_passthrough
    ))
}

/// Forwarding rule set comparator.
///
/// Observed rules carry both the certificate ID and its resolved name, while a
/// configured rule may give either. Each configured rule is matched on the
/// reference it sets, so a rule naming only the ID converges as well as one
/// naming the certificate.
pub fn forwarding_rules_equal(desired: &Value, observed: &Value, _config: &Attributes) -> bool {
    let (Some(desired), Some(observed)) = (desired.elements(), observed.elements()) else {
        return desired == observed;
    };
    if desired.len() != observed.len() {
        return false;
    }
    let mut unmatched = observed;
    for want in desired {
        match unmatched.iter().position(|have| forwarding_rule_matches(want, have)) {
            Some(index) => {
                unmatched.swap_remove(index);
            }
            None => return false,
        }
    }
    true
}

fn forwarding_rule_matches(want: &Value, have: &Value) -> bool {
    let (Some(want), Some(have)) = (want.as_map(), have.as_map()) else {
        return want == have;
    };
    let int = |m: &Attributes, k: &str| m.get(k).and_then(Value::as_int).unwrap_or_default();
    let text = |m: &Attributes, k: &str| {
        m.get(k)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    };
    let flag = |m: &Attributes, k: &str| m.get(k).and_then(Value::as_bool).unwrap_or(false);

    let same_route = ["entry_port", "target_port"]
        .iter()
        .all(|k| int(want, k) == int(have, k))
        && ["entry_protocol", "target_protocol"]
            .iter()
            .all(|k| text(want, k) == text(have, k))
        && flag(want, "tls_passthrough") == flag(have, "tls_passthrough");
    if !same_route {
        return false;
    }

    match (text(want, "certificate_name"), text(want, "certificate_id")) {
        (Some(name), _) => text(have, "certificate_name") == Some(name),
        (None, Some(id)) => text(have, "certificate_id") == Some(id),
        (None, None) => text(have, "certificate_id").is_none() && text(have, "certificate_name").is_none(),
    }
}

/// Hash of a firewall rule; endpoint lists hash as sets so their order never matters
pub fn hash_firewall_rule(rule: &Value) -> u32 {
    let Some(map) = rule.as_map() else {
        return hash_value(rule);
    };
    let normalized = map
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| {
            let v = match v {
                Value::List(items) => Value::set(items.iter().cloned()),
                other => other.clone(),
            };
            (k.clone(), v)
        })
        .collect();
    hash_value(&Value::Map(normalized))
}

/// Block comparator: only the keys the configuration sets are compared, so
/// fields the upstream fills in (IDs, defaults) never show up as changes
pub fn block_settings_equal(desired: &Value, observed: &Value, _config: &Attributes) -> bool {
    let as_set = |v: &Value| match v {
        Value::List(items) => Value::set(items.iter().cloned()),
        other => other.clone(),
    };
    match (desired.as_map(), observed.as_map()) {
        (Some(desired), Some(observed)) => desired.iter().all(|(key, want)| match observed.get(key) {
            Some(have) => as_set(want) == as_set(have),
            None => want.is_empty(),
        }),
        _ => desired == observed,
    }
}

/// Map the legacy floating IP URN spelling onto the reserved IP one
pub fn canonical_urn(urn: &str) -> String {
    match urn.strip_prefix("do:floatingip:") {
        Some(ip) => format!("do:reservedip:{ip}"),
        None => urn.to_string(),
    }
}

/// Reserved IP URN in the legacy floating IP spelling
pub fn legacy_floating_urn(urn: &str) -> String {
    match urn.strip_prefix("do:reservedip:") {
        Some(ip) => format!("do:floatingip:{ip}"),
        None => urn.to_string(),
    }
}

/// URN sets are equal when they name the same resources under either spelling
pub fn urn_sets_equal(desired: &Value, observed: &Value, _config: &Attributes) -> bool {
    let canonical = |v: &Value| {
        let mut urns: Vec<String> = v
            .string_elements()
            .iter()
            .map(|u| canonical_urn(u))
            .collect();
        urns.sort();
        urns.dedup();
        urns
    };
    canonical(desired) == canonical(observed)
}

/// Record data comparator; reads `type` and `domain` from the configuration
pub fn record_data_equal(desired: &Value, observed: &Value, config: &Attributes) -> bool {
    match (desired.as_str(), observed.as_str()) {
        (Some(a), Some(b)) => {
            let record_type = config.get("type").and_then(Value::as_str).unwrap_or_default();
            let domain = config.get("domain").and_then(Value::as_str).unwrap_or_default();
            dns_data_equivalent(record_type, a, b, domain)
        }
        _ => desired == observed,
    }
}
