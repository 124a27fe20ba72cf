//! List data sources
//!
//! Each source declares a [`DataListConfig`] and fetches its records; the
//! shared engine in `doform_core::datalist` does the filtering and sorting.
//!
//! [`DataListConfig`]: doform_core::datalist::DataListConfig

use std::sync::Arc;

use doform_core::codec::from_wire_block;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Value};
use doform_core::schema::BlockSchema;

use crate::lifecycle::DataSource;

pub mod account;
pub mod compute;
pub mod domains;
pub mod spaces;

/// Returns every data source supported by this provider
pub fn all() -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(compute::Droplets),
        Arc::new(compute::DatabaseClusters),
        Arc::new(domains::Domains),
        Arc::new(domains::Records),
        Arc::new(domains::Certificates),
        Arc::new(account::Regions),
        Arc::new(account::Sizes),
        Arc::new(account::SshKeys),
        Arc::new(account::Tags),
        Arc::new(account::Projects),
        Arc::new(spaces::SpacesBuckets),
        Arc::new(spaces::SpacesBucketObjects),
    ]
}

/// Decode upstream objects through the record schema, then let `extend`
/// fill in fields that need reshaping (nested slugs, derived URNs).
pub(crate) fn flatten<F>(record: &BlockSchema, items: &[serde_json::Value], extend: F) -> Vec<Attributes>
where
    F: Fn(&serde_json::Value, &mut Attributes),
{
    items
        .iter()
        .map(|item| {
            let mut attributes = from_wire_block(record, item);
            extend(item, &mut attributes);
            attributes
        })
        .collect()
}

/// String query field the user must set
pub(crate) fn required_extra<'a>(extra: &'a Attributes, key: &str) -> ProviderResult<&'a str> {
    extra
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::invalid(format!("'{key}' is required")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_config_is_valid() {
        for source in all() {
            let config = source.config();
            config
                .validate()
                .unwrap_or_else(|e| panic!("{}: {e}", config.resource_type));
        }
    }

    #[test]
    fn type_names_are_unique() {
        let sources = all();
        let names: HashSet<_> = sources.iter().map(|s| s.config().resource_type).collect();
        assert_eq!(names.len(), sources.len());
    }
}
