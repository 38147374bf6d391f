//! Relay client and location selection against a mock relay.

mod common;

use std::time::Duration;

use common::*;
use tccontrol::{LocationSelector, RelayClient, TwitchCastError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn relay(server: &MockServer) -> RelayClient {
    RelayClient::new(&test_config(server))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_locations_keeps_unknown_fields() {
    let server = MockServer::start().await;
    mount_locations(&server, &["/edge-1", "/edge-2"]).await;

    let client = relay(&server);
    let locations = tokio::task::spawn_blocking(move || client.fetch_locations())
        .await
        .unwrap();

    assert_eq!(locations.len(), 2);
    assert!(locations[0].url.ends_with("/edge-1"));
    assert_eq!(locations[1].extra["name"], "/edge-2");
    assert!(locations[0].status.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_locations_busts_caches() {
    let server = MockServer::start().await;
    mount_locations(&server, &["/edge-1"]).await;

    let client = relay(&server);
    tokio::task::spawn_blocking(move || {
        client.fetch_locations();
        client.fetch_locations();
    })
    .await
    .unwrap();

    let requests = server.received_requests().await.unwrap();
    let queries: Vec<String> = requests
        .iter()
        .map(|request| request.url.query().unwrap_or_default().to_string())
        .collect();
    assert_eq!(queries.len(), 2);
    for query in &queries {
        assert!(query.parse::<f64>().is_ok(), "query {:?}", query);
    }
    assert_ne!(queries[0], queries[1]);
    assert_eq!(
        requests[0].headers.get("User-Agent").unwrap().to_str().unwrap(),
        USER_AGENT
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_locations_failures_are_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pops.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = relay(&server);
    let locations = tokio::task::spawn_blocking(move || client.fetch_locations())
        .await
        .unwrap();
    assert!(locations.is_empty());

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pops.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = relay(&server);
    let locations = tokio::task::spawn_blocking(move || client.fetch_locations())
        .await
        .unwrap();
    assert!(locations.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_probe_location_records_stats() {
    let server = MockServer::start().await;
    mount_stats(&server, "/edge", Duration::from_millis(50)).await;

    let client = relay(&server);
    let location = tccontrol::model::RelayLocation::new(&format!("{}/edge", server.uri()));
    let probed = tokio::task::spawn_blocking(move || client.probe_location(location))
        .await
        .unwrap()
        .expect("stats should parse");

    let status = probed.status.unwrap();
    assert_eq!(status.raw["viewers"], 12);
    assert!(status.latency >= Duration::from_millis(50));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_probe_location_rejects_bad_stats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/edge/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_string("?(not json);"))
        .mount(&server)
        .await;

    let client = relay(&server);
    let location = tccontrol::model::RelayLocation::new(&format!("{}/edge", server.uri()));
    let probed = tokio::task::spawn_blocking(move || client.probe_location(location))
        .await
        .unwrap();
    assert!(probed.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_selector_picks_fastest_location() {
    let server = MockServer::start().await;
    mount_locations(&server, &["/slow", "/fast", "/dead"]).await;
    mount_stats(&server, "/slow", Duration::from_millis(400)).await;
    mount_stats(&server, "/fast", Duration::from_millis(0)).await;
    Mock::given(method("GET"))
        .and(path("/dead/stats"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = relay(&server);
    let best = tokio::task::spawn_blocking(move || {
        LocationSelector::new(&client).select_best_location()
    })
    .await
    .unwrap();

    assert_eq!(best, Some(format!("{}/fast", server.uri())));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_selector_without_answers_is_none() {
    let server = MockServer::start().await;
    mount_locations(&server, &["/dead"]).await;

    let client = relay(&server);
    let best = tokio::task::spawn_blocking(move || {
        LocationSelector::new(&client).select_best_location()
    })
    .await
    .unwrap();
    assert_eq!(best, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_token_query_is_percent_encoded() {
    let server = MockServer::start().await;
    mount_token(&server, "some channel&x=1").await;

    let client = relay(&server);
    let pair = tokio::task::spawn_blocking(move || {
        client.fetch_token_and_signature("some channel&x=1")
    })
    .await
    .unwrap();

    assert_eq!(pair, Some(("{\"a\":1}".to_string(), "deadbeef".to_string())));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_token_failures_are_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/token.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"","sig":"x"}"#))
        .mount(&server)
        .await;

    let client = relay(&server);
    let pair = tokio::task::spawn_blocking(move || client.fetch_token_and_signature("foo"))
        .await
        .unwrap();
    assert_eq!(pair, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resolve_content_uses_first_playlist_entry() {
    let server = MockServer::start().await;
    mount_token(&server, "somechannel").await;
    mount_playlist(&server, "/edge", "somechannel").await;

    let client = relay(&server);
    let location = format!("{}/edge", server.uri());
    let content = tokio::task::spawn_blocking(move || {
        client.resolve_content(&location, "somechannel")
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(content.content_id, PLAYLIST_URL);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resolve_content_reports_which_step_failed() {
    let server = MockServer::start().await;
    mount_token(&server, "somechannel").await;
    Mock::given(method("GET"))
        .and(path("/edge/get/playlist"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"?({"playlist":[]});"#))
        .mount(&server)
        .await;

    let client = relay(&server);
    let location = format!("{}/edge", server.uri());
    let result = tokio::task::spawn_blocking(move || {
        let empty_playlist = client.resolve_content(&location, "somechannel");
        let no_token = client.resolve_content(&location, "otherchannel");
        (empty_playlist, no_token)
    })
    .await
    .unwrap();

    assert!(matches!(
        result.0,
        Err(TwitchCastError::PlaylistResolutionFailed(ref c)) if c == "somechannel"
    ));
    assert!(matches!(
        result.1,
        Err(TwitchCastError::TokenResolutionFailed(ref c)) if c == "otherchannel"
    ));
}
