// Transport tests against a mock DigitalOcean API: paging, rate limiting,
// error bodies and not-found handling.

use doform_core::error::ErrorKind;
use doform_core::provider::Provider;
use doform_core::resource::{Resource, ResourceId, Value};
use doform_core::waiter::WaitConfig;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doform_provider_digitalocean::{DigitalOceanProvider, ProviderConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup_with(config: impl FnOnce(ProviderConfig) -> ProviderConfig) -> (MockServer, DigitalOceanProvider) {
    let server = MockServer::start().await;
    let config = config(ProviderConfig::new("test-token").with_api_endpoint(server.uri()));
    let provider = DigitalOceanProvider::new(&config)
        .unwrap()
        .with_wait_config(WaitConfig::immediate());
    (server, provider)
}

async fn setup() -> (MockServer, DigitalOceanProvider) {
    setup_with(|c| c).await
}

fn names(state: &doform_core::resource::State, key: &str) -> Vec<String> {
    state
        .get(key)
        .and_then(Value::elements)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| r.as_map()?.get("name")?.as_str().map(str::to_string))
        .collect()
}

// ── Pagination ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_follows_pages_until_last_is_empty() {
    let (server, provider) = setup().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/v2/tags"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tags": [{ "name": "alpha" }, { "name": "beta" }],
            "links": { "pages": {
                "next": format!("{base}/v2/tags?page=2&per_page=200"),
                "last": format!("{base}/v2/tags?page=2&per_page=200")
            }},
            "meta": { "total": 3 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/tags"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tags": [{ "name": "gamma" }],
            "links": { "pages": {
                "first": format!("{base}/v2/tags?page=1&per_page=200"),
                "prev": format!("{base}/v2/tags?page=1&per_page=200")
            }},
            "meta": { "total": 3 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = Resource::new("digitalocean_tags", "all");
    let state = provider.read_data_source(&query).await.unwrap();

    assert_eq!(names(&state, "tags"), vec!["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn test_list_without_links_is_a_single_page() {
    let (server, provider) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v2/account/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ssh_keys": [
                { "id": 512189, "name": "laptop", "fingerprint": "3b:16:bf:e4", "public_key": "ssh-rsa AAAA laptop" }
            ],
            "meta": { "total": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = provider
        .read_data_source(&Resource::new("digitalocean_ssh_keys", "all"))
        .await
        .unwrap();
    assert_eq!(names(&state, "ssh_keys"), vec!["laptop"]);
}

// ── Rate limiting ───────────────────────────────────────────────────

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let (server, provider) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v2/tags"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "0")
                .set_body_json(json!({ "id": "too_many_requests", "message": "API Rate limit exceeded." })),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tags": [{ "name": "production" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = provider
        .read_data_source(&Resource::new("digitalocean_tags", "all"))
        .await
        .unwrap();
    assert_eq!(names(&state, "tags"), vec!["production"]);
}

#[tokio::test]
async fn test_rate_limit_surfaces_once_retries_run_out() {
    let (server, provider) = setup_with(|c| c.with_max_retries(1)).await;

    Mock::given(method("GET"))
        .and(path("/v2/tags"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "0")
                .set_body_json(json!({ "id": "too_many_requests", "message": "API Rate limit exceeded." })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let err = provider
        .read_data_source(&Resource::new("digitalocean_tags", "all"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimited);
    assert_eq!(err.status, Some(429));
    assert_eq!(err.message, "API Rate limit exceeded.");
}

#[tokio::test]
async fn test_cancellation_cuts_rate_limit_back_off_short() {
    let (server, provider) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v2/reserved_ips/45.55.96.47"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "30")
                .set_body_json(json!({ "id": "too_many_requests", "message": "API Rate limit exceeded." })),
        )
        .expect(1)
        .mount(&server)
        .await;

    provider.cancellation().cancel();
    let id = ResourceId::new("digitalocean_reserved_ip", "web");
    let err = tokio::time::timeout(Duration::from_secs(5), provider.read(&id, Some("45.55.96.47")))
        .await
        .expect("back-off was not interrupted")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Canceled);
}

// ── Error bodies ────────────────────────────────────────────────────

#[tokio::test]
async fn test_error_body_message_and_context() {
    let (server, provider) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2/tags"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "id": "unprocessable_entity",
            "message": "tag name is too long"
        })))
        .mount(&server)
        .await;

    let resource = Resource::new("digitalocean_tag", "long").with_attribute("name", "x".repeat(300));
    let err = provider.create(&resource).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.status, Some(422));
    assert!(err.message.contains("tag name is too long"), "{}", err.message);
    assert_eq!(err.resource_id, Some(resource.id.clone()));
}

#[tokio::test]
async fn test_undecodable_body_with_multibyte_text_is_an_error() {
    let (server, provider) = setup().await;

    let body = format!("{}é trailing garbage", "x".repeat(199));
    Mock::given(method("GET"))
        .and(path("/v2/reserved_ips/45.55.96.47"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let id = ResourceId::new("digitalocean_reserved_ip", "web");
    let err = provider.read(&id, Some("45.55.96.47")).await.unwrap_err();
    assert!(err.message.contains("failed to decode"), "{}", err.message);
}

// ── Not found ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_read_of_deleted_droplet_clears_state() {
    let (server, provider) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v2/droplets/3164444"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "id": "not_found",
            "message": "The resource you were accessing could not be found."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = ResourceId::new("digitalocean_droplet", "web");
    let state = provider.read(&id, Some("3164444")).await.unwrap();
    assert!(!state.exists);
}

#[tokio::test]
async fn test_delete_of_missing_tag_succeeds() {
    let (server, provider) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/v2/tags/staging"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "id": "not_found",
            "message": "The resource you were accessing could not be found."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = ResourceId::new("digitalocean_tag", "staging");
    provider.delete(&id, "staging").await.unwrap();
}

#[tokio::test]
async fn test_server_error_is_not_mistaken_for_not_found() {
    let (server, provider) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v2/droplets/3164444"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "id": "service_unavailable",
            "message": "Service Unavailable"
        })))
        .mount(&server)
        .await;

    let id = ResourceId::new("digitalocean_droplet", "web");
    let err = provider.read(&id, Some("3164444")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServerError);
    assert_eq!(err.identifier.as_deref(), Some("3164444"));
}
