//! Shared test helpers for remote adapter integration tests

use wiremock::MockServer;

use fitsync_remote::{RestClient, RestRemoteStore};

/// API key used by every mocked request
pub const TEST_API_KEY: &str = "test-anon-key";

/// Bearer token used by every mocked request
pub const TEST_TOKEN: &str = "test-user-jwt";

/// Starts a mock server and returns a remote store pointing at it
pub async fn setup_remote_mock() -> (MockServer, RestRemoteStore) {
    let server = MockServer::start().await;
    let client = RestClient::new(server.uri())
        .with_api_key(TEST_API_KEY)
        .with_access_token(TEST_TOKEN);
    (server, RestRemoteStore::new(client))
}
