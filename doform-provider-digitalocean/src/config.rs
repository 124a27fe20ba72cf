//! Provider configuration and client construction
//!
//! Configuration is read from the provider block's attributes, falling back to
//! the environment for anything left unset.

use std::sync::Arc;

use doform_core::resource::{Attributes, Value};
use secrecy::SecretString;

use crate::client::ApiClient;
use crate::spaces::SpacesSessions;

pub const DEFAULT_API_ENDPOINT: &str = "https://api.digitalocean.com";
pub const DEFAULT_SPACES_ENDPOINT: &str = "https://{Region}.digitaloceanspaces.com";
pub const DEFAULT_MAX_RETRIES: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("a DigitalOcean API token is required (set `token` or DIGITALOCEAN_TOKEN)")]
    MissingToken,

    #[error("invalid API endpoint '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Provider-level settings
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub token: SecretString,
    pub api_endpoint: String,
    /// Endpoint template; `{Region}` is replaced by the lowercased region slug
    pub spaces_endpoint: String,
    pub spaces_access_id: Option<String>,
    pub spaces_secret_key: Option<SecretString>,
    pub spaces_force_path_style: bool,
    /// Version of the host runtime, reported in the user agent
    pub host_version: String,
    /// Retries granted to rate-limited (429) requests
    pub max_retries: u32,
}

impl ProviderConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            spaces_endpoint: DEFAULT_SPACES_ENDPOINT.to_string(),
            spaces_access_id: None,
            spaces_secret_key: None,
            spaces_force_path_style: false,
            host_version: "dev".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = endpoint.into();
        self
    }

    pub fn with_spaces_endpoint(mut self, template: impl Into<String>) -> Self {
        self.spaces_endpoint = template.into();
        self
    }

    pub fn with_spaces_credentials(
        mut self,
        access_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.spaces_access_id = Some(access_id.into());
        self.spaces_secret_key = Some(SecretString::from(secret_key.into()));
        self
    }

    pub fn with_host_version(mut self, version: impl Into<String>) -> Self {
        self.host_version = version.into();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Build from provider attributes, consulting the process environment for unset values
    pub fn from_attributes(attributes: &Attributes) -> Result<Self, ConfigError> {
        Self::from_sources(attributes, |key| std::env::var(key).ok())
    }

    /// Build from provider attributes and an environment lookup
    pub fn from_sources(
        attributes: &Attributes,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |attr: &str, vars: &[&str]| -> Option<String> {
            match attributes.get(attr) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => vars.iter().find_map(|v| env(v).filter(|s| !s.is_empty())),
            }
        };

        let token = lookup("token", &["DIGITALOCEAN_TOKEN", "DIGITALOCEAN_ACCESS_TOKEN"])
            .ok_or(ConfigError::MissingToken)?;

        let mut config = Self::new(token);
        if let Some(endpoint) = lookup("api_endpoint", &["DIGITALOCEAN_API_URL"]) {
            config.api_endpoint = endpoint;
        }
        if let Some(template) = lookup("spaces_endpoint", &["SPACES_ENDPOINT_URL"]) {
            config.spaces_endpoint = template;
        }
        config.spaces_access_id = lookup("spaces_access_id", &["SPACES_ACCESS_KEY_ID"]);
        config.spaces_secret_key =
            lookup("spaces_secret_key", &["SPACES_SECRET_ACCESS_KEY"]).map(SecretString::from);
        if let Some(Value::Bool(b)) = attributes.get("spaces_force_path_style") {
            config.spaces_force_path_style = *b;
        }
        if let Some(n) = attributes.get("max_retries").and_then(Value::as_int) {
            config.max_retries = u32::try_from(n).unwrap_or(0);
        }

        url::Url::parse(&config.api_endpoint).map_err(|e| ConfigError::InvalidUrl {
            url: config.api_endpoint.clone(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// User agent sent with every API request
    pub fn user_agent(&self) -> String {
        format!(
            "doform/{} doform-provider-digitalocean/{}",
            self.host_version,
            env!("CARGO_PKG_VERSION")
        )
    }

    /// Assemble the REST client and the region-keyed Spaces sessions
    pub fn client(&self) -> Result<CombinedClient, ConfigError> {
        Ok(CombinedClient {
            api: ApiClient::new(self)?,
            spaces: SpacesSessions::new(self),
        })
    }
}

/// REST client and Spaces sessions shared by every resource of one provider
#[derive(Debug)]
pub struct CombinedClient {
    api: ApiClient,
    spaces: SpacesSessions,
}

impl CombinedClient {
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn spaces(&self) -> &SpacesSessions {
        &self.spaces
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn token_falls_back_to_environment() {
        let config = ProviderConfig::from_sources(
            &Attributes::new(),
            env(&[("DIGITALOCEAN_ACCESS_TOKEN", "from-env")]),
        )
        .unwrap();
        assert_eq!(config.token.expose_secret(), "from-env");
        assert_eq!(config.api_endpoint, DEFAULT_API_ENDPOINT);
        assert_eq!(config.spaces_endpoint, DEFAULT_SPACES_ENDPOINT);
        assert!(config.spaces_access_id.is_none());
    }

    #[test]
    fn attributes_win_over_environment() {
        let attrs = Attributes::from([
            ("token".to_string(), Value::from("from-config")),
            ("api_endpoint".to_string(), Value::from("http://localhost:8080")),
        ]);
        let config = ProviderConfig::from_sources(
            &attrs,
            env(&[
                ("DIGITALOCEAN_TOKEN", "from-env"),
                ("SPACES_ACCESS_KEY_ID", "AKIA"),
            ]),
        )
        .unwrap();
        assert_eq!(config.token.expose_secret(), "from-config");
        assert_eq!(config.api_endpoint, "http://localhost:8080");
        assert_eq!(config.spaces_access_id.as_deref(), Some("AKIA"));
    }

    #[test]
    fn missing_token_is_rejected() {
        let err = ProviderConfig::from_sources(&Attributes::new(), env(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingToken);
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let attrs = Attributes::from([
            ("token".to_string(), Value::from("t")),
            ("api_endpoint".to_string(), Value::from("not a url")),
        ]);
        assert!(matches!(
            ProviderConfig::from_sources(&attrs, env(&[])),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn user_agent_carries_host_version() {
        let config = ProviderConfig::new("t").with_host_version("1.4.0");
        assert!(config.user_agent().starts_with("doform/1.4.0 "));
    }
}
