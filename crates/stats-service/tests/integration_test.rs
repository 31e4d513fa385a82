// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use mockito::{Matcher, Server};
use serde_json::json;
use stats_service::{
    identity::{CLUSTER_ID_VAR, HOST_VAR, SERVER_ID_VAR, VERSION_VAR},
    ChannelStreamFactory, EnterpriseHost, FieldValue, HttpRegistrationClient, Product,
    PublishedVars, RegistrationClient, RegistrationError, StatsConfig, StatsRegistry,
    StatsService, Tags, STATS_STREAM_NAME,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn product() -> Product {
    Product {
        cluster_id: "cluster-1".to_string(),
        product_id: "server-7".to_string(),
        host: "node-a".to_string(),
        name: "streamer".to_string(),
        version: "1.2.3".to_string(),
    }
}

fn host(url: String, primary: bool) -> EnterpriseHost {
    EnterpriseHost { url, primary }
}

#[tokio::test]
async fn http_registration_posts_product() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v2/products")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "cluster_id": "cluster-1",
            "product_id": "server-7",
            "host": "node-a",
            "name": "streamer",
            "version": "1.2.3",
        })))
        .with_status(201)
        .create_async()
        .await;

    let client = HttpRegistrationClient::new(&[host(server.url(), true)], Duration::from_secs(5))
        .expect("valid host");
    let resp = client.register(&product()).await.expect("registered");

    assert_eq!(resp.status.as_u16(), 201);
    assert_eq!(resp.url, format!("{}/api/v2/products", server.url()));
    mock.assert_async().await;
}

#[tokio::test]
async fn http_registration_falls_back_to_secondary_host() {
    let mut primary = Server::new_async().await;
    let mut secondary = Server::new_async().await;
    let primary_mock = primary
        .mock("POST", "/api/v2/products")
        .with_status(503)
        .create_async()
        .await;
    let secondary_mock = secondary
        .mock("POST", "/api/v2/products")
        .with_status(201)
        .create_async()
        .await;

    let client = HttpRegistrationClient::new(
        &[host(secondary.url(), false), host(primary.url(), true)],
        Duration::from_secs(5),
    )
    .expect("valid hosts");
    let resp = client.register(&product()).await.expect("registered");

    assert_eq!(resp.url, format!("{}/api/v2/products", secondary.url()));
    primary_mock.assert_async().await;
    secondary_mock.assert_async().await;
}

#[tokio::test]
async fn http_registration_reports_last_status() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v2/products")
        .with_status(500)
        .create_async()
        .await;

    let client = HttpRegistrationClient::new(&[host(server.url(), true)], Duration::from_secs(5))
        .expect("valid host");
    let err = client
        .register(&product())
        .await
        .expect_err("server error");

    match err {
        RegistrationError::Status { url, status } => {
            assert_eq!(status.as_u16(), 500);
            assert!(url.ends_with("/api/v2/products"));
        }
        other => panic!("unexpected error: {other}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn http_registration_unreachable_host() {
    let client = HttpRegistrationClient::new(
        &[host("http://127.0.0.1:1".to_string(), true)],
        Duration::from_secs(2),
    )
    .expect("valid host");
    let err = client
        .register(&product())
        .await
        .expect_err("nothing listens on port 1");
    assert!(matches!(err, RegistrationError::Request { .. }));
}

#[tokio::test]
async fn stats_service_reports_and_registers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v2/products")
        .match_body(Matcher::PartialJson(json!({
            "cluster_id": "cluster-1",
            "host": "node-a",
        })))
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let registry = StatsRegistry::new();
    registry
        .register(
            "ingress",
            Tags::from([("task".to_string(), "cpu_alert".to_string())]),
        )
        .set("points_received", 42_i64);

    let streams = Arc::new(ChannelStreamFactory::new([STATS_STREAM_NAME]));
    let mut points = streams
        .take_receiver(STATS_STREAM_NAME)
        .expect("receiver available");

    let vars = PublishedVars::new("streamer");
    let config = StatsConfig {
        stats_interval: Duration::from_millis(20),
        database: "_internal".to_string(),
        retention_policy: "monitor".to_string(),
        enterprise_hosts: vec![host(server.url(), true)],
        ..Default::default()
    };
    let service = StatsService::new(
        config,
        Arc::new(registry.clone()),
        streams.clone(),
        Arc::new(vars.clone()),
    )
    .expect("valid config");

    vars.set(CLUSTER_ID_VAR, "cluster-1");
    vars.set(SERVER_ID_VAR, "server-7");
    vars.set(HOST_VAR, "node-a");
    vars.set(VERSION_VAR, "1.2.3");

    service.open().await.expect("open");
    let point = timeout(Duration::from_secs(2), points.recv())
        .await
        .expect("a tick fired")
        .expect("stream still open");
    service.close().await.expect("close");

    assert_eq!(point.database, "_internal");
    assert_eq!(point.retention_policy, "monitor");
    assert_eq!(point.name, "ingress");
    assert_eq!(point.tags["task"], "cpu_alert");
    assert_eq!(point.fields["points_received"], FieldValue::Integer(42));
    // Close only returns once the registration task has finished.
    mock.assert_async().await;
    assert!(!service.is_open().await);
}

#[tokio::test]
async fn stats_service_survives_unreachable_manager() {
    let registry = StatsRegistry::new();
    registry.register("runtime", Tags::new()).set("uptime_secs", 1_u64);

    let streams = Arc::new(ChannelStreamFactory::new([STATS_STREAM_NAME]));
    let mut points = streams
        .take_receiver(STATS_STREAM_NAME)
        .expect("receiver available");

    let config = StatsConfig {
        stats_interval: Duration::from_millis(20),
        enterprise_hosts: vec![host("http://127.0.0.1:1".to_string(), true)],
        registration_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let service = StatsService::new(
        config,
        Arc::new(registry),
        streams.clone(),
        Arc::new(PublishedVars::default()),
    )
    .expect("valid config");

    service.open().await.expect("open despite unreachable manager");
    let point = timeout(Duration::from_secs(2), points.recv())
        .await
        .expect("a tick fired")
        .expect("stream still open");
    assert_eq!(point.name, "runtime");
    service.close().await.expect("close");
}
