//! Spaces (S3-compatible object storage)
//!
//! One `aws_sdk_s3::Client` is built lazily per region and reused; the
//! endpoint comes from the configured template with `{Region}` replaced.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::DateTimeFormat;
use aws_sdk_s3::types::{BucketCannedAcl, EncodingType, Permission};
use doform_core::error::{ErrorKind, classify_s3_code};
use doform_core::normalize::normalize_region;
use doform_core::provider::{ProviderError, ProviderResult};
use log::{debug, info};
use secrecy::{ExposeSecret, SecretString};

use crate::config::ProviderConfig;

/// Regions that offer Spaces
pub const SPACES_REGIONS: &[&str] = &["ams3", "blr1", "fra1", "nyc3", "sfo2", "sfo3", "sgp1", "syd1"];

/// Grantee URI of anonymous readers
const ALL_USERS_GROUP: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Largest page the S3 list API returns
pub const MAX_KEYS_PER_PAGE: i32 = 1000;

/// Substitute the lowercased region into an endpoint template
pub fn endpoint_for(template: &str, region: &str) -> String {
    template.replace("{Region}", &normalize_region(region))
}

/// Page size to request next, given the remaining `max_keys` budget
pub fn plan_page_size(remaining: Option<i32>) -> i32 {
    match remaining {
        Some(n) => n.clamp(0, MAX_KEYS_PER_PAGE),
        None => MAX_KEYS_PER_PAGE,
    }
}

/// Charge a page against the budget; keys and common prefixes both count.
///
/// Returns how many of the page's `keys` still fit.
pub fn charge_page(remaining: &mut Option<i32>, keys: usize, prefixes: usize) -> usize {
    let Some(budget) = remaining.as_mut() else {
        return keys;
    };
    let fit = keys.min(usize::try_from(*budget).unwrap_or(0));
    let spent = i32::try_from(keys + prefixes).unwrap_or(i32::MAX);
    *budget = (*budget).saturating_sub(spent).max(0);
    fit
}

/// Turn an S3 SDK error into a classified provider error.
///
/// The S3 error code decides the kind when it is known; the HTTP status is the
/// fallback (HEAD requests carry no body, hence no code).
pub fn s3_error<E>(operation: &str, err: SdkError<E>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);
    let detail = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}", aws_sdk_s3::error::DisplayErrorContext(&err)));

    let by_code = code.as_deref().map(classify_s3_code);
    let message = match &code {
        Some(code) => format!("{operation}: {code}: {detail}"),
        None => format!("{operation}: {detail}"),
    };
    match (by_code, status) {
        (Some(c), _) if c.kind != ErrorKind::Other => ProviderError::with_kind(c.kind, message),
        (_, Some(status)) => ProviderError::from_status(status, message),
        _ => ProviderError::with_kind(ErrorKind::Transport, message),
    }
}

/// Listing parameters for bucket objects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub encoding_type: Option<String>,
    /// Total number of keys to return across all pages
    pub max_keys: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub etag: Option<String>,
    pub size: i64,
    pub last_modified: Option<String>,
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSummary {
    pub name: String,
    pub region: String,
    pub creation_date: Option<String>,
}

/// Lazily constructed, region-keyed S3 clients
pub struct SpacesSessions {
    endpoint_template: String,
    access_id: Option<String>,
    secret_key: Option<SecretString>,
    force_path_style: bool,
    sessions: Mutex<HashMap<String, Client>>,
}

impl std::fmt::Debug for SpacesSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpacesSessions")
            .field("endpoint_template", &self.endpoint_template)
            .field("access_id", &self.access_id)
            .field("force_path_style", &self.force_path_style)
            .finish_non_exhaustive()
    }
}

impl SpacesSessions {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            endpoint_template: config.spaces_endpoint.clone(),
            access_id: config.spaces_access_id.clone(),
            secret_key: config.spaces_secret_key.clone(),
            force_path_style: config.spaces_force_path_style,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// S3 client for `region`, built on first use
    pub fn session(&self, region: &str) -> ProviderResult<Client> {
        let region = normalize_region(region);
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = sessions.get(&region) {
            return Ok(client.clone());
        }

        let (Some(access_id), Some(secret_key)) = (&self.access_id, &self.secret_key) else {
            return Err(ProviderError::with_kind(
                ErrorKind::Config,
                "Spaces credentials are missing: set spaces_access_id and spaces_secret_key \
                 (or SPACES_ACCESS_KEY_ID and SPACES_SECRET_ACCESS_KEY)",
            ));
        };

        let endpoint = endpoint_for(&self.endpoint_template, &region);
        debug!("Creating Spaces session for {region} at {endpoint}");
        let credentials = Credentials::new(
            access_id.clone(),
            secret_key.expose_secret().to_string(),
            None,
            None,
            "doform",
        );
        let conf = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(self.force_path_style)
            .build();
        let client = Client::from_conf(conf);
        sessions.insert(region, client.clone());
        Ok(client)
    }

    // ── Buckets ──────────────────────────────────────────────────────

    pub async fn create_bucket(&self, region: &str, bucket: &str, acl: &str) -> ProviderResult<()> {
        let client = self.session(region)?;
        client
            .create_bucket()
            .bucket(bucket)
            .acl(BucketCannedAcl::from(acl))
            .send()
            .await
            .map_err(|e| s3_error("creating bucket", e))?;
        info!("Created Spaces bucket {bucket} in {region}");
        Ok(())
    }

    /// Whether `bucket` exists in `region`; only a not-found answer means absent
    pub async fn bucket_exists(&self, region: &str, bucket: &str) -> ProviderResult<bool> {
        let client = self.session(region)?;
        match client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = s3_error("reading bucket", err);
                if err.is_not_found() { Ok(false) } else { Err(err) }
            }
        }
    }

    pub async fn set_bucket_acl(&self, region: &str, bucket: &str, acl: &str) -> ProviderResult<()> {
        let client = self.session(region)?;
        client
            .put_bucket_acl()
            .bucket(bucket)
            .acl(BucketCannedAcl::from(acl))
            .send()
            .await
            .map_err(|e| s3_error("updating bucket ACL", e))?;
        Ok(())
    }

    /// Delete an empty bucket; a non-empty one fails with `BucketNotEmpty`
    pub async fn delete_bucket(&self, region: &str, bucket: &str) -> ProviderResult<()> {
        let client = self.session(region)?;
        client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| s3_error("deleting bucket", e))?;
        info!("Deleted Spaces bucket {bucket} in {region}");
        Ok(())
    }

    /// Canned ACL the bucket's grants amount to
    pub async fn get_bucket_acl(&self, region: &str, bucket: &str) -> ProviderResult<String> {
        let client = self.session(region)?;
        let output = client
            .get_bucket_acl()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| s3_error("reading bucket ACL", e))?;
        let public = output.grants().iter().any(|grant| {
            grant.grantee().and_then(|g| g.uri()) == Some(ALL_USERS_GROUP)
                && grant.permission() == Some(&Permission::Read)
        });
        Ok(if public { "public-read" } else { "private" }.to_string())
    }

    pub async fn list_buckets(&self, region: &str) -> ProviderResult<Vec<BucketSummary>> {
        let client = self.session(region)?;
        let output = client
            .list_buckets()
            .send()
            .await
            .map_err(|e| s3_error("listing buckets", e))?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| {
                Some(BucketSummary {
                    name: b.name()?.to_string(),
                    region: normalize_region(region),
                    creation_date: b
                        .creation_date()
                        .and_then(|d| d.fmt(DateTimeFormat::DateTime).ok()),
                })
            })
            .collect())
    }

    // ── Policies ─────────────────────────────────────────────────────

    /// Bucket policy document, `None` when the bucket has none
    pub async fn get_bucket_policy(&self, region: &str, bucket: &str) -> ProviderResult<Option<String>> {
        let client = self.session(region)?;
        match client.get_bucket_policy().bucket(bucket).send().await {
            Ok(output) => Ok(output.policy().map(str::to_string)),
            Err(err) => {
                let no_policy = err.code() == Some("NoSuchBucketPolicy");
                let err = s3_error("reading bucket policy", err);
                if no_policy { Ok(None) } else { Err(err) }
            }
        }
    }

    pub async fn put_bucket_policy(&self, region: &str, bucket: &str, policy: &str) -> ProviderResult<()> {
        let client = self.session(region)?;
        client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(|e| s3_error("writing bucket policy", e))?;
        Ok(())
    }

    pub async fn delete_bucket_policy(&self, region: &str, bucket: &str) -> ProviderResult<()> {
        let client = self.session(region)?;
        client
            .delete_bucket_policy()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| s3_error("deleting bucket policy", e))?;
        Ok(())
    }

    // ── Objects ──────────────────────────────────────────────────────

    /// List objects page by page, honouring the total `max_keys` budget
    pub async fn list_objects(
        &self,
        region: &str,
        bucket: &str,
        query: &ObjectQuery,
    ) -> ProviderResult<Vec<ObjectSummary>> {
        let client = self.session(region)?;
        let mut objects = Vec::new();
        let mut remaining = query.max_keys;
        let mut continuation: Option<String> = None;

        loop {
            let page_size = plan_page_size(remaining);
            if page_size == 0 {
                break;
            }
            let mut request = client
                .list_objects_v2()
                .bucket(bucket)
                .max_keys(page_size)
                .set_prefix(query.prefix.clone())
                .set_delimiter(query.delimiter.clone())
                .set_continuation_token(continuation.take());
            if let Some(encoding) = &query.encoding_type {
                request = request.encoding_type(EncodingType::from(encoding.as_str()));
            }
            let output = request
                .send()
                .await
                .map_err(|e| s3_error("listing objects", e))?;

            let page: Vec<ObjectSummary> = output
                .contents()
                .iter()
                .filter_map(|o| {
                    Some(ObjectSummary {
                        key: o.key()?.to_string(),
                        etag: o.e_tag().map(|t| t.trim_matches('"').to_string()),
                        size: o.size().unwrap_or_default(),
                        last_modified: o
                            .last_modified()
                            .and_then(|d| d.fmt(DateTimeFormat::DateTime).ok()),
                        storage_class: o.storage_class().map(|c| c.as_str().to_string()),
                    })
                })
                .collect();
            let fit = charge_page(&mut remaining, page.len(), output.common_prefixes().len());
            objects.extend(page.into_iter().take(fit));

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(objects)
    }
}
