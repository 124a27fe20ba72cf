// End-to-end lifecycle tests against a mock DigitalOcean API.
//
// Each test drives the provider through `Provider` the way a host would and
// checks both the resulting state and the exact writes sent upstream.

use std::collections::HashMap;

use doform_core::provider::Provider;
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::waiter::WaitConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doform_provider_digitalocean::{DigitalOceanProvider, ProviderConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DigitalOceanProvider) {
    let server = MockServer::start().await;
    let provider = DigitalOceanProvider::new(
        &ProviderConfig::new("test-token").with_api_endpoint(server.uri()),
    )
    .unwrap()
    .with_wait_config(WaitConfig::immediate());
    (server, provider)
}

fn block(entries: &[(&str, Value)]) -> Value {
    Value::Map(entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<HashMap<_, _>>())
}

fn strings(values: &[&str]) -> Value {
    Value::List(values.iter().map(|v| Value::from(*v)).collect())
}

fn action(id: u64, status: &str, action_type: &str) -> serde_json::Value {
    json!({ "action": { "id": id, "status": status, "type": action_type, "resource_type": "reserved_ip" } })
}

// ── DNS records ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_record_with_trailing_dot_converges_without_writes() {
    let (server, provider) = setup().await;
    let upstream = json!({
        "domain_record": {
            "id": 3352896, "type": "CNAME", "name": "www",
            "data": "target.example.com", "ttl": 1800,
            "priority": null, "port": null, "weight": null, "flags": null, "tag": null
        }
    });

    Mock::given(method("POST"))
        .and(path("/v2/domains/example.com/records"))
        .and(body_partial_json(json!({ "type": "CNAME", "data": "target.example.com." })))
        .respond_with(ResponseTemplate::new(201).set_body_json(&upstream))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/domains/example.com/records/3352896"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&upstream))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v2/domains/example.com/records/3352896"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&upstream))
        .expect(0)
        .mount(&server)
        .await;

    let desired = Resource::new("digitalocean_record", "www")
        .with_attribute("domain", "example.com")
        .with_attribute("type", "CNAME")
        .with_attribute("name", "www")
        .with_attribute("data", "target.example.com");

    let created = provider.create(&desired).await.unwrap();
    assert_eq!(created.identifier.as_deref(), Some("example.com/3352896"));
    assert_eq!(created.get_string("data"), Some("target.example.com."));

    let refreshed = provider.read(&desired.id, Some("example.com/3352896")).await.unwrap();
    assert_eq!(refreshed.get_string("fqdn"), Some("www.example.com"));

    let updated = provider
        .update(&desired.id, "example.com/3352896", &refreshed, &desired)
        .await
        .unwrap();
    assert_eq!(updated, refreshed);
}

#[tokio::test]
async fn test_record_import_takes_comma_separated_id() {
    let (server, provider) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v2/domains/example.com/records/28448432"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "domain_record": {
                "id": 28448432, "type": "MX", "name": "@",
                "data": "mail.example.com", "priority": 10, "ttl": 1800
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = ResourceId::new("digitalocean_record", "mx");
    let state = provider.import(&id, "example.com,28448432").await.unwrap();
    assert_eq!(state.identifier.as_deref(), Some("example.com/28448432"));
    assert_eq!(state.get_string("fqdn"), Some("example.com"));
    assert_eq!(state.get_string("data"), Some("mail.example.com."));
    assert_eq!(state.get_int("priority"), Some(10));
}

// ── Load balancers ──────────────────────────────────────────────────

#[tokio::test]
async fn test_load_balancer_certificate_renewal_is_not_a_change() {
    let (server, provider) = setup().await;

    // The certificate was renewed: same name, new ID
    Mock::given(method("GET"))
        .and(path("/v2/load_balancers/4de7ac8b-495b-4884-9a69-1050c6793cd6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "load_balancer": {
                "id": "4de7ac8b-495b-4884-9a69-1050c6793cd6",
                "name": "web-lb",
                "ip": "104.131.186.241",
                "size": "lb-small",
                "size_unit": 1,
                "algorithm": "round_robin",
                "status": "active",
                "region": { "slug": "nyc3", "name": "New York 3" },
                "forwarding_rules": [{
                    "entry_protocol": "https",
                    "entry_port": 443,
                    "target_protocol": "http",
                    "target_port": 80,
                    "certificate_id": "b1d1a4b8-renewed",
                    "tls_passthrough": false
                }],
                "healthcheck": {
                    "protocol": "http", "port": 80, "path": "/",
                    "check_interval_seconds": 10, "response_timeout_seconds": 5,
                    "healthy_threshold": 5, "unhealthy_threshold": 3
                },
                "sticky_sessions": { "type": "none" },
                "droplet_ids": [3164444, 3164445],
                "redirect_http_to_https": false,
                "enable_proxy_protocol": false,
                "enable_backend_keepalive": false,
                "disable_lets_encrypt_dns_records": false,
                "http_idle_timeout_seconds": 60,
                "vpc_uuid": "c33931f2-a26a-4e61-b85c-4e95a2ec431b"
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/certificates/b1d1a4b8-renewed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "certificate": {
                "id": "b1d1a4b8-renewed",
                "name": "web-cert",
                "type": "lets_encrypt",
                "state": "verified",
                "dns_names": ["www.example.com"]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v2/load_balancers/4de7ac8b-495b-4884-9a69-1050c6793cd6"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let desired = Resource::new("digitalocean_loadbalancer", "web")
        .with_attribute("name", "web-lb")
        .with_attribute("region", "nyc3")
        .with_attribute(
            "forwarding_rule",
            Value::List(vec![block(&[
                ("entry_protocol", Value::from("https")),
                ("entry_port", Value::Int(443)),
                ("target_protocol", Value::from("http")),
                ("target_port", Value::Int(80)),
                ("certificate_name", Value::from("web-cert")),
            ])]),
        );

    let handle = "4de7ac8b-495b-4884-9a69-1050c6793cd6";
    let refreshed = provider.read(&desired.id, Some(handle)).await.unwrap();
    let rules = refreshed.get("forwarding_rule").and_then(Value::elements).unwrap();
    let rule = rules[0].as_map().unwrap();
    assert_eq!(rule.get("certificate_name"), Some(&Value::from("web-cert")));
    assert_eq!(rule.get("certificate_id"), Some(&Value::from("b1d1a4b8-renewed")));

    let updated = provider.update(&desired.id, handle, &refreshed, &desired).await.unwrap();
    assert_eq!(updated, refreshed);
}

// ── Reserved IPs ────────────────────────────────────────────────────

const IP: &str = "45.55.96.47";

fn reserved_ip(droplet_id: Option<i64>) -> serde_json::Value {
    let droplet = match droplet_id {
        Some(id) => json!({ "id": id, "name": "web" }),
        None => serde_json::Value::Null,
    };
    json!({
        "reserved_ip": {
            "ip": IP,
            "region": { "slug": "nyc3", "name": "New York 3" },
            "droplet": droplet,
            "locked": false,
            "project_id": "746c6152-2fa2-11ed-92d3-27aaa54e4988"
        }
    })
}

#[tokio::test]
async fn test_reserved_ip_reassignment_issues_one_action_per_step() {
    let (server, provider) = setup().await;
    let actions_path = format!("/v2/reserved_ips/{IP}/actions");
    let ip_path = format!("/v2/reserved_ips/{IP}");

    Mock::given(method("GET"))
        .and(path("/v2/actions/101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(action(101, "completed", "assign_ip")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/actions/102"))
        .respond_with(ResponseTemplate::new(200).set_body_json(action(102, "completed", "unassign_ip")))
        .mount(&server)
        .await;

    let desired = |droplet_id: i64| {
        Resource::new("digitalocean_reserved_ip", "web")
            .with_attribute("region", "nyc3")
            .with_attribute("droplet_id", droplet_id)
    };

    // Create, assigned to droplet 1001
    let created = {
        let _create = Mock::given(method("POST"))
            .and(path("/v2/reserved_ips"))
            .and(body_partial_json(json!({ "region": "nyc3" })))
            .respond_with(ResponseTemplate::new(202).set_body_json(reserved_ip(None)))
            .expect(1)
            .mount_as_scoped(&server)
            .await;
        let _assign = Mock::given(method("POST"))
            .and(path(actions_path.as_str()))
            .and(body_partial_json(json!({ "type": "assign", "droplet_id": 1001 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(action(101, "in-progress", "assign_ip")))
            .expect(1)
            .mount_as_scoped(&server)
            .await;
        let _read = Mock::given(method("GET"))
            .and(path(ip_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(reserved_ip(Some(1001))))
            .mount_as_scoped(&server)
            .await;

        provider.create(&desired(1001)).await.unwrap()
    };
    assert_eq!(created.identifier.as_deref(), Some(IP));
    assert_eq!(created.get_int("droplet_id"), Some(1001));
    assert_eq!(created.get_string("urn"), Some("do:reservedip:45.55.96.47"));

    // Move to droplet 1002: unassign then assign
    let moved = {
        let _unassign = Mock::given(method("POST"))
            .and(path(actions_path.as_str()))
            .and(body_partial_json(json!({ "type": "unassign" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(action(102, "in-progress", "unassign_ip")))
            .expect(1)
            .mount_as_scoped(&server)
            .await;
        let _assign = Mock::given(method("POST"))
            .and(path(actions_path.as_str()))
            .and(body_partial_json(json!({ "type": "assign", "droplet_id": 1002 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(action(101, "in-progress", "assign_ip")))
            .expect(1)
            .mount_as_scoped(&server)
            .await;
        let _read = Mock::given(method("GET"))
            .and(path(ip_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(reserved_ip(Some(1002))))
            .mount_as_scoped(&server)
            .await;

        provider.update(&created.id, IP, &created, &desired(1002)).await.unwrap()
    };
    assert_eq!(moved.get_int("droplet_id"), Some(1002));

    // Release it: a single unassign
    let released = {
        let _unassign = Mock::given(method("POST"))
            .and(path(actions_path.as_str()))
            .and(body_partial_json(json!({ "type": "unassign" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(action(102, "in-progress", "unassign_ip")))
            .expect(1)
            .mount_as_scoped(&server)
            .await;
        let _assign = Mock::given(method("POST"))
            .and(path(actions_path.as_str()))
            .and(body_partial_json(json!({ "type": "assign" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(action(101, "in-progress", "assign_ip")))
            .expect(0)
            .mount_as_scoped(&server)
            .await;
        let _read = Mock::given(method("GET"))
            .and(path(ip_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(reserved_ip(None)))
            .mount_as_scoped(&server)
            .await;

        provider.update(&moved.id, IP, &moved, &desired(0)).await.unwrap()
    };
    assert_eq!(released.get_int("droplet_id"), Some(0));

    // Converged: no writes at all
    let again = provider.update(&released.id, IP, &released, &desired(0)).await.unwrap();
    assert_eq!(again, released);
}

#[tokio::test]
async fn test_errored_action_fails_the_update() {
    let (server, provider) = setup().await;

    Mock::given(method("POST"))
        .and(path(format!("/v2/reserved_ips/{IP}/actions")))
        .and(body_partial_json(json!({ "type": "assign", "droplet_id": 1001 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(action(77, "in-progress", "assign_ip")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/actions/77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(action(77, "errored", "assign_ip")))
        .mount(&server)
        .await;

    let id = ResourceId::new("digitalocean_reserved_ip", "web");
    let from = State::existing(
        id.clone(),
        Attributes::from([
            ("region".to_string(), Value::from("nyc3")),
            ("droplet_id".to_string(), Value::Int(0)),
            ("ip_address".to_string(), Value::from(IP)),
        ]),
    )
    .with_identifier(IP);
    let to = Resource::new("digitalocean_reserved_ip", "web")
        .with_attribute("region", "nyc3")
        .with_attribute("droplet_id", 1001_i64);

    let err = provider.update(&id, IP, &from, &to).await.unwrap_err();
    assert!(err.message.contains("action 77 (assign_ip) errored"), "{}", err.message);
    assert_eq!(err.identifier.as_deref(), Some(IP));
}

#[tokio::test]
async fn test_reserved_ip_delete_stops_when_unassign_is_refused() {
    let (server, provider) = setup().await;
    let ip_path = format!("/v2/reserved_ips/{IP}");

    Mock::given(method("GET"))
        .and(path(ip_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(reserved_ip(Some(1001))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{ip_path}/actions")))
        .and(body_partial_json(json!({ "type": "unassign" })))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "id": "unprocessable_entity",
            "message": "Droplet already has a pending event."
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(ip_path.as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let id = ResourceId::new("digitalocean_reserved_ip", "web");
    let err = provider.delete(&id, IP).await.unwrap_err();
    assert_eq!(err.status, Some(422));
    assert!(err.message.contains("pending event"), "{}", err.message);
}

// ── Database clusters ───────────────────────────────────────────────

fn cluster(size: &str, region: &str) -> serde_json::Value {
    json!({
        "database": {
            "id": "9cc10173-e9ea-4176-9dbc-a4cee4c4ff30",
            "name": "backend",
            "engine": "pg",
            "version": "16",
            "num_nodes": 2,
            "size": size,
            "region": region,
            "status": "online",
            "connection": {
                "host": "backend-do-user-19081923-0.db.ondigitalocean.com",
                "port": 25060,
                "user": "doadmin",
                "database": "defaultdb"
            },
            "maintenance_window": { "day": "tuesday", "hour": "01:00:00", "pending": false },
            "tags": []
        }
    })
}

#[tokio::test]
async fn test_database_resize_runs_before_migration() {
    let (server, provider) = setup().await;
    let cluster_path = "/v2/databases/9cc10173-e9ea-4176-9dbc-a4cee4c4ff30";

    Mock::given(method("PUT"))
        .and(path(format!("{cluster_path}/resize")))
        .and(body_partial_json(json!({ "size": "db-s-4vcpu-8gb", "num_nodes": 2 })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{cluster_path}/migrate")))
        .and(body_partial_json(json!({ "region": "ams3" })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(cluster_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster("db-s-4vcpu-8gb", "ams3")))
        .mount(&server)
        .await;

    let id = ResourceId::new("digitalocean_database_cluster", "backend");
    let from = State::existing(
        id.clone(),
        Attributes::from([
            ("name".to_string(), Value::from("backend")),
            ("engine".to_string(), Value::from("pg")),
            ("version".to_string(), Value::from("16")),
            ("size".to_string(), Value::from("db-s-2vcpu-4gb")),
            ("region".to_string(), Value::from("nyc3")),
            ("node_count".to_string(), Value::Int(2)),
        ]),
    )
    .with_identifier("9cc10173-e9ea-4176-9dbc-a4cee4c4ff30");
    let to = Resource::new("digitalocean_database_cluster", "backend")
        .with_attribute("name", "backend")
        .with_attribute("engine", "pg")
        .with_attribute("size", "db-s-4vcpu-8gb")
        .with_attribute("region", "ams3")
        .with_attribute("node_count", 2_i64);

    let state = provider
        .update(&id, "9cc10173-e9ea-4176-9dbc-a4cee4c4ff30", &from, &to)
        .await
        .unwrap();
    assert_eq!(state.get_string("size"), Some("db-s-4vcpu-8gb"));
    assert_eq!(state.get_string("region"), Some("ams3"));

    let writes: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(
        writes,
        vec![format!("{cluster_path}/resize"), format!("{cluster_path}/migrate")]
    );
}

// ── Projects ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_project_member_removal_moves_it_to_default_project() {
    let (server, provider) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v2/projects/4e1bfbc3-dc3e-41f2-a18f-1b4d7ba71679"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project": {
                "id": "4e1bfbc3-dc3e-41f2-a18f-1b4d7ba71679",
                "owner_uuid": "99525febec065ca37b2ffe4f852fd2b2581895e7",
                "owner_id": 258992,
                "name": "web",
                "description": "",
                "purpose": "Web Application",
                "environment": "Production",
                "is_default": false
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/projects/default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project": {
                "id": "a7c24e5e-7d72-4d2c-9f1b-0a2fd5c4b8b1",
                "name": "Default",
                "purpose": "Other",
                "is_default": true
            }
        })))
        .mount(&server)
        .await;

    // Two members until the update runs, then one
    Mock::given(method("GET"))
        .and(path("/v2/projects/4e1bfbc3-dc3e-41f2-a18f-1b4d7ba71679/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [
                { "urn": "do:droplet:3164444", "status": "ok" },
                { "urn": "do:floatingip:45.55.96.47", "status": "ok" }
            ]
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/projects/4e1bfbc3-dc3e-41f2-a18f-1b4d7ba71679/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [{ "urn": "do:droplet:3164444", "status": "ok" }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/projects/a7c24e5e-7d72-4d2c-9f1b-0a2fd5c4b8b1/resources"))
        .and(body_partial_json(json!({ "resources": ["do:reservedip:45.55.96.47"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resources": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/projects/4e1bfbc3-dc3e-41f2-a18f-1b4d7ba71679/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resources": [] })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v2/projects/4e1bfbc3-dc3e-41f2-a18f-1b4d7ba71679"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let id = ResourceId::new("digitalocean_project", "web");
    let handle = "4e1bfbc3-dc3e-41f2-a18f-1b4d7ba71679";
    let from = provider.read(&id, Some(handle)).await.unwrap();

    let to = Resource::new("digitalocean_project", "web")
        .with_attribute("name", "web")
        .with_attribute("environment", "Production")
        .with_attribute("resources", strings(&["do:droplet:3164444"]));
    let state = provider.update(&id, handle, &from, &to).await.unwrap();

    assert_eq!(
        state.get("resources").map(Value::string_elements),
        Some(vec!["do:droplet:3164444".to_string()])
    );
}

#[tokio::test]
async fn test_project_resources_leave_unlisted_members_alone() {
    let (server, provider) = setup().await;
    let project = "4e1bfbc3-dc3e-41f2-a18f-1b4d7ba71679";
    let default = "a7c24e5e-7d72-4d2c-9f1b-0a2fd5c4b8b1";
    let volume = "do:volume:506f78a4-e098-11e5-ad9f-000f53306ae1";

    Mock::given(method("GET"))
        .and(path("/v2/projects/default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project": { "id": default, "name": "Default", "is_default": true }
        })))
        .mount(&server)
        .await;
    // The droplet belongs to the project before the volume is assigned
    Mock::given(method("GET"))
        .and(path(format!("/v2/projects/{project}/resources")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [{ "urn": "do:droplet:3164444", "status": "ok" }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/projects/{project}/resources")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [
                { "urn": "do:droplet:3164444", "status": "ok" },
                { "urn": volume, "status": "ok" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v2/projects/{project}/resources")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resources": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v2/projects/{default}/resources")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resources": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let resource = Resource::new("digitalocean_project_resources", "storage")
        .with_attribute("project", project)
        .with_attribute("resources", strings(&[volume]));
    let state = provider.create(&resource).await.unwrap();
    assert_eq!(
        state.get("resources").map(Value::string_elements),
        Some(vec![volume.to_string()])
    );
    let handle = state.identifier.clone().unwrap();
    assert_eq!(handle, format!("{project}/{volume}"));

    let refreshed = provider.read(&resource.id, Some(handle.as_str())).await.unwrap();
    assert_eq!(refreshed.get("resources"), state.get("resources"));

    provider.delete(&resource.id, &handle).await.unwrap();

    let assigned: Vec<(String, serde_json::Value)> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| (r.url.path().to_string(), serde_json::from_slice(&r.body).unwrap()))
        .collect();
    assert_eq!(
        assigned,
        vec![
            (format!("/v2/projects/{project}/resources"), json!({ "resources": [volume] })),
            (format!("/v2/projects/{default}/resources"), json!({ "resources": [volume] })),
        ]
    );
}

// ── Data sources ────────────────────────────────────────────────────

#[tokio::test]
async fn test_droplets_filtered_by_region_and_sorted_by_name() {
    let (server, provider) = setup().await;

    let droplet = |id: i64, name: &str, region: &str| {
        json!({
            "id": id,
            "name": name,
            "memory": 1024,
            "vcpus": 1,
            "disk": 25,
            "locked": false,
            "status": "active",
            "size_slug": "s-1vcpu-1gb",
            "region": { "slug": region },
            "image": { "slug": "ubuntu-24-04-x64" },
            "networks": { "v4": [{ "ip_address": format!("104.236.32.{id}"), "type": "public" }] },
            "tags": []
        })
    };
    Mock::given(method("GET"))
        .and(path("/v2/droplets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "droplets": [
                droplet(1, "a", "nyc1"),
                droplet(2, "b", "nyc1"),
                droplet(3, "c", "sfo3"),
                droplet(4, "e", "nyc1"),
                droplet(5, "d", "ams3"),
            ],
            "meta": { "total": 5 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = Resource::new("digitalocean_droplets", "nyc")
        .with_attribute(
            "filter",
            Value::List(vec![block(&[
                ("key", Value::from("region")),
                ("values", strings(&["nyc1"])),
            ])]),
        )
        .with_attribute(
            "sort",
            Value::List(vec![block(&[
                ("key", Value::from("name")),
                ("direction", Value::from("desc")),
            ])]),
        );

    let state = provider.read_data_source(&query).await.unwrap();
    let droplets = state.get("droplets").and_then(Value::elements).unwrap();
    let names: Vec<&str> = droplets
        .iter()
        .filter_map(|d| d.as_map()?.get("name")?.as_str())
        .collect();
    assert_eq!(names, vec!["e", "b", "a"]);

    let first = droplets[0].as_map().unwrap();
    assert_eq!(first.get("ipv4_address"), Some(&Value::from("104.236.32.4")));
    assert_eq!(first.get("urn"), Some(&Value::from("do:droplet:4")));
}

#[tokio::test]
async fn test_unknown_filter_key_is_rejected_before_listing() {
    let (server, provider) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v2/droplets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "droplets": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let query = Resource::new("digitalocean_droplets", "bad").with_attribute(
        "filter",
        Value::List(vec![block(&[
            ("key", Value::from("flavor")),
            ("values", strings(&["vanilla"])),
        ])]),
    );
    assert!(provider.read_data_source(&query).await.is_err());
}
