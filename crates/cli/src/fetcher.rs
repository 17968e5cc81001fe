//! `reqwest`-backed `PageFetcher` for the discovery body.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tasks::{FetchedPage, PageFetcher, TaskError};

const USER_AGENT: &str = concat!("scout-workflows/", env!("CARGO_PKG_VERSION"));

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    /// Non-2xx responses are returned as pages; only transport failures are
    /// errors.
    async fn fetch(&self, url: &str) -> Result<FetchedPage, TaskError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TaskError::capability("browser", e.to_string()))?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| TaskError::capability("browser", format!("failed to read body: {e}")))?;

        Ok(FetchedPage { url, status, body })
    }
}
