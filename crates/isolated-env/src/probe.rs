//! HTTP readiness probe and fixture seeding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::Result;

/// Body returned by the fixture seed endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Talks to a running deployment to check liveness and load fixtures.
#[async_trait]
pub trait Probe: Send + Sync {
    /// One readiness check. `true` only on a 2xx response.
    async fn is_ready(&self, url: &str) -> bool;

    /// One seeding call. `Err` carries a human-readable reason.
    async fn seed(&self, url: &str) -> std::result::Result<SeedResponse, String>;
}

/// [`Probe`] over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    probe_timeout: Duration,
    seed_timeout: Duration,
}

impl HttpProbe {
    /// Create a probe. The seed call gets a longer timeout since fixture
    /// loading (embeddings, inserts) is slow compared to a liveness GET.
    pub fn new(probe_timeout: Duration, seed_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("convsim-isolated-env/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            probe_timeout,
            seed_timeout,
        })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn is_ready(&self, url: &str) -> bool {
        match self
            .client
            .get(url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(%url, error = %e, "readiness probe failed");
                false
            }
        }
    }

    async fn seed(&self, url: &str) -> std::result::Result<SeedResponse, String> {
        let response = self
            .client
            .post(url)
            .timeout(self.seed_timeout)
            .send()
            .await
            .map_err(|e| format!("seed request failed: {e}"))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;

        if !status.is_success() {
            let detail = serde_json::from_str::<SeedResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or(body);
            return Err(format!("seed endpoint returned {}: {}", status.as_u16(), detail));
        }

        let parsed: SeedResponse = serde_json::from_str(&body)
            .map_err(|e| format!("unparseable seed response: {e}"))?;
        if parsed.success {
            Ok(parsed)
        } else {
            Err(parsed
                .error
                .unwrap_or_else(|| "seed endpoint reported success=false".to_string()))
        }
    }
}
