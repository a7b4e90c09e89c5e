pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use url::Url;

use self::http_client::HttpClient;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Network-side failure, distinct from "page does not exist".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} is unavailable: {source}")]
    Unavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    UpstreamStatus { url: String, status: u16 },
}

impl FetchError {
    pub(crate) fn unavailable(url: &str, source: reqwest::Error) -> Self {
        Self::Unavailable {
            url: url.to_string(),
            source,
        }
    }
}

// ── Source trait ──────────────────────────────────────────────────────────────

/// Where daily listing pages come from.
#[async_trait]
pub trait NoticeSource: Send + Sync {
    /// Listing page URL for a given edition.
    fn page_url(&self, date: NaiveDate) -> String;

    /// `Ok(false)` when the edition does not exist.
    async fn probe(&self, url: &str) -> Result<bool, FetchError>;

    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

// ── Newspaper edition archive ─────────────────────────────────────────────────

/// Pages live at `{base_url}/{YYYYMMDD}/{page_name}`.
pub struct EdisScraper {
    client: HttpClient,
    base_url: String,
    page_name: String,
}

impl EdisScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Url::parse(&config.base_url)
            .with_context(|| format!("Invalid scraper.base_url {:?}", config.base_url))?;

        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_name: config.page_name.trim_matches('/').to_string(),
        })
    }
}

pub fn edition_url(base_url: &str, page_name: &str, date: NaiveDate) -> String {
    format!("{}/{}/{}", base_url, date.format("%Y%m%d"), page_name)
}

#[async_trait]
impl NoticeSource for EdisScraper {
    fn page_url(&self, date: NaiveDate) -> String {
        edition_url(&self.base_url, &self.page_name, date)
    }

    async fn probe(&self, url: &str) -> Result<bool, FetchError> {
        self.client.probe(url).await
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.client.get_text(url).await
    }
}
