//! HTTP reachability probe
//!
//! Requests a small, always-available resource with a hard timeout. Any
//! 2xx answer means online; a timeout, transport error or error status
//! means offline. A cache-busting query parameter keeps intermediaries
//! from answering on the network's behalf.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tracing::debug;

use fitsync_core::config::ConnectivityConfig;
use fitsync_core::ports::IReachabilityProbe;

/// Reachability probe over plain HTTP GET
#[derive(Debug, Clone)]
pub struct HttpReachabilityProbe {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpReachabilityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            timeout,
        }
    }

    /// Creates a probe from the `connectivity` configuration section
    pub fn from_config(config: &ConnectivityConfig) -> Self {
        Self::new(&config.probe_url, config.probe_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl IReachabilityProbe for HttpReachabilityProbe {
    async fn probe(&self) -> bool {
        let result = self
            .client
            .get(&self.url)
            .query(&[("_", Utc::now().timestamp_millis().to_string())])
            .header("Cache-Control", "no-store")
            .timeout(self.timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(url = %self.url, status = %response.status(), "Reachability probe failed");
                false
            }
            Err(e) => {
                debug!(url = %self.url, timeout = e.is_timeout(), error = %e, "Reachability probe failed");
                false
            }
        }
    }
}
