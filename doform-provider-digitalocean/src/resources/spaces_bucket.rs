//! Spaces buckets and bucket policies
//!
//! Both live behind the S3-compatible API, so every call goes through
//! [`SpacesSessions`](crate::spaces::SpacesSessions) for the bucket's region.

use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::import::ImportId;
use doform_core::normalize::{normalize_region, normalize_region_value};
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, Comparator, ResourceSchema, types};
use log::info;

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::spaces::SPACES_REGIONS;
use crate::wire::{required_str, split_handle};

const ACLS: &[&str] = &["private", "public-read"];

fn spaces_region() -> AttributeType {
    AttributeType::Enum(SPACES_REGIONS.iter().map(|r| r.to_string()).collect())
}

/// Region and bucket from a `<region>,<bucket>` import ID
fn parse_import(import_id: &str) -> ProviderResult<(String, String)> {
    let parsed = ImportId::parse(import_id, ",", &["region", "bucket"])?;
    Ok((
        normalize_region(parsed.field("region")?),
        parsed.field("bucket")?.to_string(),
    ))
}

pub fn bucket_domain_name(bucket: &str, region: &str) -> String {
    format!("{bucket}.{}.digitaloceanspaces.com", normalize_region(region))
}

/// digitalocean_spaces_bucket, handled as `<region>/<bucket>`
pub struct SpacesBucket;

impl SpacesBucket {
    fn handle(region: &str, bucket: &str) -> String {
        format!("{}/{bucket}", normalize_region(region))
    }
}

#[async_trait]
impl ResourceLifecycle for SpacesBucket {
    fn name(&self) -> &'static str {
        "digitalocean_spaces_bucket"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("A Spaces object storage bucket")
            .attribute(AttributeSchema::new("name", AttributeType::String).required().force_new())
            .attribute(
                AttributeSchema::new("region", spaces_region())
                    .required()
                    .force_new()
                    .with_state_fn(normalize_region_value),
            )
            .attribute(
                AttributeSchema::new(
                    "acl",
                    AttributeType::Enum(ACLS.iter().map(|a| a.to_string()).collect()),
                )
                .with_default("private"),
            )
            .attribute(AttributeSchema::new("bucket_domain_name", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("endpoint", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let name = required_str(resource, "name")?;
        let region = required_str(resource, "region")?;
        let acl = resource.get_string("acl").unwrap_or("private");
        ctx.spaces().create_bucket(region, name, acl).await?;
        self.read(ctx, &resource.id, &Self::handle(region, name)).await
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let parts = split_handle(identifier, 2, "<region>/<bucket>")?;
        let (region, bucket) = (parts[0], parts[1]);
        if !ctx.spaces().bucket_exists(region, bucket).await? {
            return Err(ProviderError::not_found(format!(
                "bucket {bucket} does not exist in {region}"
            )));
        }
        let acl = ctx.spaces().get_bucket_acl(region, bucket).await?;

        let mut attributes = Attributes::new();
        attributes.insert("name".into(), Value::from(bucket));
        attributes.insert("region".into(), Value::from(region));
        attributes.insert("acl".into(), Value::from(acl));
        attributes.insert("bucket_domain_name".into(), Value::from(bucket_domain_name(bucket, region)));
        attributes.insert(
            "endpoint".into(),
            Value::from(format!("{region}.digitaloceanspaces.com")),
        );
        attributes.insert("urn".into(), Value::from(format!("do:space:{bucket}")));
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn update(
        &self,
        ctx: &Context,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
        changes: &ChangeSet,
    ) -> ProviderResult<State> {
        let parts = split_handle(identifier, 2, "<region>/<bucket>")?;
        if changes.has("acl") {
            let acl = to.get_string("acl").unwrap_or("private");
            ctx.spaces().set_bucket_acl(parts[0], parts[1], acl).await?;
            info!("Set ACL of bucket {} to {acl}", parts[1]);
        }
        self.read(ctx, id, identifier).await
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let parts = split_handle(identifier, 2, "<region>/<bucket>")?;
        ctx.spaces().delete_bucket(parts[0], parts[1]).await
    }

    /// Import ID `<region>,<bucket>`
    async fn import(&self, ctx: &Context, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        let (region, bucket) = parse_import(import_id)?;
        self.read(ctx, id, &Self::handle(&region, &bucket)).await
    }
}

/// digitalocean_spaces_bucket_policy, handled as `<region>,<bucket>`
pub struct SpacesBucketPolicy;

#[async_trait]
impl ResourceLifecycle for SpacesBucketPolicy {
    fn name(&self) -> &'static str {
        "digitalocean_spaces_bucket_policy"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(
                AttributeSchema::new("region", spaces_region())
                    .required()
                    .force_new()
                    .with_state_fn(normalize_region_value),
            )
            .attribute(AttributeSchema::new("bucket", AttributeType::String).required().force_new())
            .attribute(
                AttributeSchema::new("policy", types::json())
                    .required()
                    .with_comparator(Comparator::JsonEquivalent),
            )
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let region = normalize_region(required_str(resource, "region")?);
        let bucket = required_str(resource, "bucket")?;
        ctx.spaces()
            .put_bucket_policy(&region, bucket, required_str(resource, "policy")?)
            .await?;
        self.read(ctx, &resource.id, &format!("{region},{bucket}")).await
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (region, bucket) = parse_import(identifier)?;
        let policy = ctx
            .spaces()
            .get_bucket_policy(&region, &bucket)
            .await?
            .ok_or_else(|| ProviderError::not_found(format!("bucket {bucket} has no policy")))?;

        let mut attributes = Attributes::new();
        attributes.insert("region".into(), Value::from(region.as_str()));
        attributes.insert("bucket".into(), Value::from(bucket.as_str()));
        attributes.insert("policy".into(), Value::from(policy));
        Ok(State::existing(id.clone(), attributes).with_identifier(format!("{region},{bucket}")))
    }

    async fn update(
        &self,
        ctx: &Context,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
        _changes: &ChangeSet,
    ) -> ProviderResult<State> {
        let (region, bucket) = parse_import(identifier)?;
        ctx.spaces()
            .put_bucket_policy(&region, &bucket, required_str(to, "policy")?)
            .await?;
        self.read(ctx, id, identifier).await
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let (region, bucket) = parse_import(identifier)?;
        ctx.spaces().delete_bucket_policy(&region, &bucket).await
    }
}
