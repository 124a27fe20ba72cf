//! Certificate lookup by name or ID
//!
//! Let's Encrypt certificates get a new ID on every renewal while the name
//! stays, so references resolve by name first and fall back to the ID.

use doform_core::provider::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Certificate {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub certificate_type: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub not_after: Option<String>,
    #[serde(default)]
    pub sha1_fingerprint: Option<String>,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
struct CertificateEnvelope {
    certificate: Certificate,
}

impl ApiClient {
    pub async fn list_certificates(&self) -> ProviderResult<Vec<Certificate>> {
        self.list("v2/certificates", "certificates").await
    }

    pub async fn get_certificate(&self, id: &str) -> ProviderResult<Certificate> {
        let envelope: CertificateEnvelope = self.get(&format!("v2/certificates/{id}")).await?;
        Ok(envelope.certificate)
    }
}

/// Resolve a certificate reference that may be a name or an ID
pub async fn resolve_certificate(api: &ApiClient, reference: &str) -> ProviderResult<Certificate> {
    let mut matches: Vec<Certificate> = api
        .list_certificates()
        .await?
        .into_iter()
        .filter(|c| c.name == reference)
        .collect();

    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => match api.get_certificate(reference).await {
            Ok(cert) => Ok(cert),
            Err(e) if e.is_not_found() => Err(ProviderError::not_found(format!(
                "certificate '{reference}' not found by name or ID"
            ))),
            Err(e) => Err(e),
        },
        n => Err(ProviderError::invalid(format!(
            "{n} certificates are named '{reference}'; reference it by ID instead"
        ))),
    }
}

/// Name of the certificate with `id`, when it still exists
pub async fn certificate_name_for_id(api: &ApiClient, id: &str) -> ProviderResult<Option<String>> {
    match api.get_certificate(id).await {
        Ok(cert) => Ok(Some(cert.name)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
