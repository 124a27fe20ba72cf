//! Composite import IDs
//!
//! Users import child objects with IDs such as `<cluster>,<name>`. Fields are
//! separated without escaping and must all be non-empty.

use crate::provider::{ProviderError, ProviderResult};

/// A user-supplied import ID split into named fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportId {
    fields: Vec<(String, String)>,
}

impl ImportId {
    /// Split `raw` on `separator` into exactly `names.len()` non-empty fields
    pub fn parse(raw: &str, separator: &str, names: &[&str]) -> ProviderResult<Self> {
        let parts: Vec<&str> = raw.split(separator).collect();
        if parts.len() != names.len() || parts.iter().any(|p| p.is_empty()) {
            return Err(ProviderError::invalid(format!(
                "invalid import ID '{}': expected \"{}\"",
                raw,
                names
                    .iter()
                    .map(|n| format!("<{}>", n))
                    .collect::<Vec<_>>()
                    .join(separator)
            )));
        }
        Ok(Self {
            fields: names
                .iter()
                .zip(parts)
                .map(|(n, p)| (n.to_string(), p.to_string()))
                .collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Field value by name; a missing name is a caller bug surfaced as an error
    pub fn field(&self, name: &str) -> ProviderResult<&str> {
        self.get(name)
            .ok_or_else(|| ProviderError::invalid(format!("import ID has no field '{}'", name)))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_composite_id() {
        let id = ImportId::parse("abc-123,analytics", ",", &["cluster_id", "name"]).unwrap();
        assert_eq!(id.get("cluster_id"), Some("abc-123"));
        assert_eq!(id.field("name").unwrap(), "analytics");
        assert!(id.field("region").is_err());
    }

    #[test]
    fn rejects_wrong_shape() {
        let err = ImportId::parse("abc-123", ",", &["cluster_id", "name"]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Invalid);
        assert!(err.message.contains(r#"expected "<cluster_id>,<name>""#));

        assert!(ImportId::parse("a,b,c", ",", &["region", "bucket"]).is_err());
        assert!(ImportId::parse("nyc3,", ",", &["region", "bucket"]).is_err());
    }
}
