//! Integration tests for HttpReachabilityProbe

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fitsync_core::ports::IReachabilityProbe;
use fitsync_remote::HttpReachabilityProbe;

async fn mount_health(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_probe_online_on_success() {
    let server = MockServer::start().await;
    mount_health(&server, ResponseTemplate::new(200)).await;

    let probe = HttpReachabilityProbe::new(
        format!("{}/health", server.uri()),
        Duration::from_secs(2),
    );
    assert!(probe.probe().await);
}

#[tokio::test]
async fn test_probe_offline_on_error_status() {
    let server = MockServer::start().await;
    mount_health(&server, ResponseTemplate::new(503)).await;

    let probe = HttpReachabilityProbe::new(
        format!("{}/health", server.uri()),
        Duration::from_secs(2),
    );
    assert!(!probe.probe().await);
}

#[tokio::test]
async fn test_probe_offline_on_timeout() {
    let server = MockServer::start().await;
    mount_health(
        &server,
        ResponseTemplate::new(200).set_delay(Duration::from_secs(3)),
    )
    .await;

    let probe = HttpReachabilityProbe::new(
        format!("{}/health", server.uri()),
        Duration::from_millis(200),
    );
    assert!(!probe.probe().await);
}

#[tokio::test]
async fn test_probe_offline_when_unreachable() {
    let probe = HttpReachabilityProbe::new("http://127.0.0.1:9/health", Duration::from_secs(1));
    assert!(!probe.probe().await);
}

#[tokio::test]
async fn test_probe_busts_caches() {
    let server = MockServer::start().await;
    mount_health(&server, ResponseTemplate::new(200)).await;

    let probe = HttpReachabilityProbe::new(
        format!("{}/health", server.uri()),
        Duration::from_secs(2),
    );
    assert!(probe.probe().await);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.query().unwrap_or_default().starts_with("_="));
}
