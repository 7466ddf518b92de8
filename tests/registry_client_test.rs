//! End-to-end coverage of `HttpRegistryClient` against a mocked HTTP server
//! (§4.7), exercising the real `reqwest` request/response path the unit
//! tests in `registry_client.rs` don't reach.

use vers_fleet::domain::ports::registry::{RegistryClient, RegistryEntry};
use vers_fleet::infrastructure::persistence::HttpRegistryClient;

#[tokio::test]
async fn list_parses_wrapped_response_from_a_real_http_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/registry/vms")
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"vms":[{"id":"vm-1","name":"infra","role":"lieutenant","registeredBy":"vers-lieutenant"}]}"#)
        .create_async()
        .await;

    let client = HttpRegistryClient::new(server.url(), "test-token");
    let vms = client.list().await;

    assert_eq!(vms.len(), 1);
    assert_eq!(vms[0].id, "vm-1");
    assert_eq!(vms[0].role.as_deref(), Some("lieutenant"));
}

#[tokio::test]
async fn list_is_best_effort_and_returns_empty_on_server_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server.mock("GET", "/registry/vms").with_status(500).create_async().await;

    let client = HttpRegistryClient::new(server.url(), "test-token");
    assert!(client.list().await.is_empty());
}

#[tokio::test]
async fn post_sends_bearer_auth_and_json_body() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/registry/vms")
        .match_header("authorization", "Bearer test-token")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({"id": "vm-1", "name": "infra"})))
        .with_status(201)
        .create_async()
        .await;

    let client = HttpRegistryClient::new(server.url(), "test-token");
    client
        .post(RegistryEntry {
            id: "vm-1".to_string(),
            name: "infra".to_string(),
            role: "lieutenant".to_string(),
            address: "vm-1".to_string(),
            registered_by: "vers-lieutenant".to_string(),
            metadata: None,
        })
        .await;

    _mock.assert_async().await;
}
