use crate::config::ScraperConfig;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use super::FetchError;

/// Single-attempt HTTP client. Retrying a missed day is the scheduler's job.
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner })
    }

    /// Does the page exist right now?
    ///
    /// Only 404 and 410 mean "no edition for that day" and yield `Ok(false)`.
    /// Any other non-2xx answer (429, 403, 5xx, ...) and transport failures
    /// (including timeouts) are errors, kept apart from a confirmed absence.
    pub async fn probe(&self, url: &str) -> Result<bool, FetchError> {
        debug!("PROBE {}", url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::unavailable(url, e))?;

        let status = resp.status();
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                debug!("{} answered {}, treating as absent", url, status);
                Ok(false)
            }
            _ => Err(FetchError::UpstreamStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    /// Fetch a URL as text.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::unavailable(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| FetchError::unavailable(url, e))
    }
}
