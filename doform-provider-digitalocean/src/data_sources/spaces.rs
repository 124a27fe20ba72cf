//! Spaces listings: buckets across every Spaces region, objects of one bucket

use async_trait::async_trait;
use doform_core::datalist::DataListConfig;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Value};
use doform_core::schema::{AttributeSchema, AttributeType, BlockSchema};
use log::debug;

use super::required_extra;
use crate::lifecycle::{Context, DataSource};
use crate::resources::spaces_bucket::bucket_domain_name;
use crate::spaces::{BucketSummary, ObjectQuery, ObjectSummary, SPACES_REGIONS};

pub struct SpacesBuckets;

fn bucket_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("region", AttributeType::String))
        .attribute(AttributeSchema::new("bucket_domain_name", AttributeType::String))
        .attribute(AttributeSchema::new("urn", AttributeType::String))
        .attribute(AttributeSchema::new("creation_date", AttributeType::String))
}

fn bucket_attributes(bucket: BucketSummary) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(
        "bucket_domain_name".into(),
        Value::from(bucket_domain_name(&bucket.name, &bucket.region)),
    );
    attributes.insert("urn".into(), Value::from(format!("do:space:{}", bucket.name)));
    if let Some(date) = bucket.creation_date {
        attributes.insert("creation_date".into(), Value::from(date));
    }
    attributes.insert("name".into(), Value::from(bucket.name));
    attributes.insert("region".into(), Value::from(bucket.region));
    attributes
}

#[async_trait]
impl DataSource for SpacesBuckets {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_spaces_buckets", "buckets", bucket_record())
            .filter_keys(&["name", "region", "bucket_domain_name", "urn"])
            .sort_keys(&["name", "region", "bucket_domain_name", "creation_date"])
    }

    async fn records(&self, ctx: &Context, _extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let mut records = Vec::new();
        for region in SPACES_REGIONS {
            let buckets = ctx.spaces().list_buckets(region).await?;
            debug!("Found {} Spaces buckets in {region}", buckets.len());
            records.extend(buckets.into_iter().map(bucket_attributes));
        }
        Ok(records)
    }
}

/// Objects of the bucket named by the `bucket` and `region` query fields
pub struct SpacesBucketObjects;

fn object_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("key", AttributeType::String))
        .attribute(AttributeSchema::new("etag", AttributeType::String))
        .attribute(AttributeSchema::new("size", AttributeType::Int))
        .attribute(AttributeSchema::new("last_modified", AttributeType::String))
        .attribute(AttributeSchema::new("storage_class", AttributeType::String))
}

fn object_attributes(object: ObjectSummary) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("key".into(), Value::from(object.key));
    attributes.insert("size".into(), Value::Int(object.size));
    for (name, value) in [
        ("etag", object.etag),
        ("last_modified", object.last_modified),
        ("storage_class", object.storage_class),
    ] {
        if let Some(value) = value {
            attributes.insert(name.into(), Value::from(value));
        }
    }
    attributes
}

/// Listing parameters from the optional query fields
fn object_query(extra: &Attributes) -> ProviderResult<ObjectQuery> {
    let text = |key: &str| extra.get(key).and_then(Value::as_str).map(str::to_string);
    let max_keys = match extra.get("max_keys").and_then(Value::as_int) {
        Some(n) if n < 0 => {
            return Err(ProviderError::invalid("max_keys must not be negative"));
        }
        Some(n) => Some(i32::try_from(n).unwrap_or(i32::MAX)),
        None => None,
    };
    Ok(ObjectQuery {
        prefix: text("prefix"),
        delimiter: text("delimiter"),
        encoding_type: text("encoding_type"),
        max_keys,
    })
}

#[async_trait]
impl DataSource for SpacesBucketObjects {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_spaces_bucket_objects", "objects", object_record())
            .filter_keys(&["key", "etag", "size", "storage_class"])
            .sort_keys(&["key", "size", "last_modified", "storage_class"])
            .extra_query(AttributeSchema::new("bucket", AttributeType::String).required())
            .extra_query(
                AttributeSchema::new(
                    "region",
                    AttributeType::Enum(SPACES_REGIONS.iter().map(|r| r.to_string()).collect()),
                )
                .required(),
            )
            .extra_query(AttributeSchema::new("prefix", AttributeType::String))
            .extra_query(AttributeSchema::new("delimiter", AttributeType::String))
            .extra_query(AttributeSchema::new(
                "encoding_type",
                AttributeType::Enum(vec!["url".to_string()]),
            ))
            .extra_query(AttributeSchema::new("max_keys", AttributeType::Int))
    }

    async fn records(&self, ctx: &Context, extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let bucket = required_extra(extra, "bucket")?;
        let region = required_extra(extra, "region")?;
        let query = object_query(extra)?;
        let objects = ctx.spaces().list_objects(region, bucket, &query).await?;
        Ok(objects.into_iter().map(object_attributes).collect())
    }
}
