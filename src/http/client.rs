//! Bootstrap HTTP client: `SessionHttp`.
//!
//! Fetches what a session needs before its push channel exists. Everything
//! after bootstrap goes through the correlated push channel. One attempt per
//! call; a failed fetch is returned to the caller as is.

use crate::domain::config::BootstrapConfig;
use crate::error::HttpError;
use crate::network::CONFIG_PATH;

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client for the session bootstrap endpoints.
#[derive(Clone)]
pub struct SessionHttp {
    base_url: String,
    client: Client,
}

impl SessionHttp {
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── Config ───────────────────────────────────────────────────────────

    /// `GET /api/v1/config`: server config plus instrument list.
    pub async fn get_config(&self) -> Result<BootstrapConfig, HttpError> {
        let url = self.url(CONFIG_PATH);
        self.get(&url).await
    }

    // ── Internal HTTP methods ────────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();

        if status.is_success() {
            let parsed = resp.json::<T>().await?;
            return Ok(parsed);
        }

        let status_code = status.as_u16();
        let body_text = resp.text().await.unwrap_or_default();
        tracing::warn!("GET {} failed with status {}", url, status_code);
        Err(status_error(status_code, body_text))
    }
}

fn status_error(status: u16, body: String) -> HttpError {
    match status {
        401 => HttpError::Unauthorized,
        404 => HttpError::NotFound(body),
        429 => HttpError::RateLimited,
        400..=499 => HttpError::BadRequest(body),
        _ => HttpError::ServerError { status, body },
    }
}
