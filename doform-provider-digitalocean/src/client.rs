// Async REST client for the DigitalOcean v2 API.
//
// Auth: `Authorization: Bearer <token>` default header
// Errors: `{ "id": "not_found", "message": "..." }` envelope

use std::time::Duration;

use doform_core::error::ErrorKind;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::waiter::sleep_or_cancel;
use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{ConfigError, ProviderConfig};

// ── Error response shape ─────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Back-off used for a 429 without a usable `Retry-After`
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the DigitalOcean REST API.
///
/// Safe for concurrent use; rate-limited requests are retried after the
/// upstream's `Retry-After` up to the configured budget. Cancelling the
/// client's token cuts a pending back-off short.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    max_retries: u32,
    cancel: CancellationToken,
}

impl ApiClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        let mut auth =
            HeaderValue::from_str(&format!("Bearer {}", config.token.expose_secret()))
                .map_err(|e| ConfigError::Client(format!("invalid token header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        let agent = HeaderValue::from_str(&config.user_agent())
            .map_err(|e| ConfigError::Client(format!("invalid user agent: {e}")))?;
        headers.insert(USER_AGENT, agent);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: Self::normalize_base_url(&config.api_endpoint)?,
            max_retries: config.max_retries,
            cancel: CancellationToken::new(),
        })
    }

    fn normalize_base_url(raw: &str) -> Result<Url, ConfigError> {
        let mut url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
            url: raw.to_string(),
            message: e.to_string(),
        })?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Token that aborts retry back-offs and every wait sharing it
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Join a relative path (e.g. `"v2/droplets"`) onto the base URL.
    fn url(&self, path: &str) -> ProviderResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ProviderError::invalid(format!("invalid request path '{path}': {e}")))
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self.execute(|| self.http.get(url.clone())).await?;
        self.handle_response(resp).await
    }

    pub async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ProviderResult<T> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");

        let resp = self
            .execute(|| self.http.get(url.clone()).query(params))
            .await?;
        self.handle_response(resp).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<T> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self
            .execute(|| self.http.post(url.clone()).json(body))
            .await?;
        self.handle_response(resp).await
    }

    pub async fn post_no_response<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<()> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self
            .execute(|| self.http.post(url.clone()).json(body))
            .await?;
        self.handle_empty(resp).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<T> {
        let url = self.url(path)?;
        debug!("PUT {url}");

        let resp = self
            .execute(|| self.http.put(url.clone()).json(body))
            .await?;
        self.handle_response(resp).await
    }

    pub async fn put_no_response<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<()> {
        let url = self.url(path)?;
        debug!("PUT {url}");

        let resp = self
            .execute(|| self.http.put(url.clone()).json(body))
            .await?;
        self.handle_empty(resp).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<T> {
        let url = self.url(path)?;
        debug!("PATCH {url}");

        let resp = self
            .execute(|| self.http.patch(url.clone()).json(body))
            .await?;
        self.handle_response(resp).await
    }

    pub async fn delete(&self, path: &str) -> ProviderResult<()> {
        let url = self.url(path)?;
        debug!("DELETE {url}");

        let resp = self.execute(|| self.http.delete(url.clone())).await?;
        self.handle_empty(resp).await
    }

    pub async fn delete_with_body<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<()> {
        let url = self.url(path)?;
        debug!("DELETE {url}");

        let resp = self
            .execute(|| self.http.delete(url.clone()).json(body))
            .await?;
        self.handle_empty(resp).await
    }

    // ── Sending ──────────────────────────────────────────────────────

    /// Send a request, retrying 429 responses after their `Retry-After`.
    ///
    /// `build` is called once per attempt since a sent request is consumed.
    async fn execute(&self, build: impl Fn() -> RequestBuilder) -> ProviderResult<Response> {
        let mut attempt = 0;
        loop {
            let resp = build().send().await.map_err(transport_error)?;
            if resp.status() != StatusCode::TOO_MANY_REQUESTS || attempt >= self.max_retries {
                return Ok(resp);
            }
            attempt += 1;
            let delay = retry_after(resp.headers()).unwrap_or(DEFAULT_RETRY_DELAY * attempt);
            warn!(
                "rate limited by the API; retrying in {:?} (attempt {}/{})",
                delay, attempt, self.max_retries
            );
            sleep_or_cancel(delay.min(MAX_RETRY_DELAY), &self.cancel).await?;
        }
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(&self, resp: Response) -> ProviderResult<T> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await.map_err(transport_error)?;
            // 204 responses decode as JSON null
            let body = if body.trim().is_empty() { "null".to_string() } else { body };
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                ProviderError::new(format!(
                    "failed to decode API response: {e} (body preview: {preview:?})"
                ))
                .with_cause(e)
            })
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn handle_empty(&self, resp: Response) -> ProviderResult<()> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn parse_error(&self, status: StatusCode, resp: Response) -> ProviderError {
        let raw = resp.text().await.unwrap_or_default();

        let message = match serde_json::from_str::<ErrorResponse>(&raw) {
            Ok(err) => match (err.message, err.id) {
                (Some(message), _) => message,
                (None, Some(id)) => id,
                (None, None) => status.to_string(),
            },
            Err(_) if raw.is_empty() => status.to_string(),
            Err(_) => raw,
        };
        debug!("API error {}: {}", status.as_u16(), message);
        ProviderError::from_status(status.as_u16(), message)
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::with_kind(ErrorKind::Transport, format!("request failed: {e}")).with_cause(e)
}

/// Seconds form of `Retry-After`; HTTP-date values fall back to the default back-off
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = ProviderConfig::new("t").with_api_endpoint("http://localhost:3000/api");
        let client = ApiClient::new(&config).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:3000/api/");
        assert_eq!(
            client.url("v2/droplets/1").unwrap().as_str(),
            "http://localhost:3000/api/v2/droplets/1"
        );
        assert_eq!(
            client.url("/v2/tags").unwrap().as_str(),
            "http://localhost:3000/api/v2/tags"
        );
    }

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(3)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }
}
