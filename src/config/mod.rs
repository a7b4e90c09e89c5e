use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

/// Upstream newspaper settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// Everything before the `YYYYMMDD` segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_page_name")]
    pub page_name: String,

    /// Applies to both the availability probe and the page fetch.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Oldest date the pipeline accepts. May be raised, never lowered
    /// below [`first_edition`].
    #[serde(default = "default_min_date")]
    pub min_date: NaiveDate,

    /// Total insert attempts per notice when `hash_id` collides.
    #[serde(default = "default_max_id_attempts")]
    pub max_id_attempts: usize,
}

/// Public site settings (permalinks, sitemap)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Mount point of the notice routes, e.g. `/funeral-notices`.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://funebres.eldia.com/edis".to_string()
}
fn default_page_name() -> String {
    "funebres2.htm".to_string()
}
fn default_timeout_secs() -> u64 {
    8
}
fn default_user_agent() -> String {
    "funebres/0.1 (daily funeral notice archive)".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/funebres.duckdb")
}
fn default_true() -> bool {
    true
}
/// First edition published online.
pub fn first_edition() -> NaiveDate {
    NaiveDate::from_ymd_opt(2006, 5, 2).unwrap_or_default()
}

fn default_min_date() -> NaiveDate {
    first_edition()
}
fn default_max_id_attempts() -> usize {
    5
}
fn default_host() -> String {
    "https://funebres.enlaplata.com.ar".to_string()
}
fn default_base_path() -> String {
    "/funeral-notices".to_string()
}
fn default_per_page() -> usize {
    20
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_name: default_page_name(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_date: default_min_date(),
            max_id_attempts: default_max_id_attempts(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_path: default_base_path(),
            per_page: default_per_page(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("FUNEBRES").separator("__"))
            .build()?;

        let cfg: Self = cfg.try_deserialize().context("Invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.min_date < first_edition() {
            bail!(
                "pipeline.min_date {} is before the first edition ({})",
                self.pipeline.min_date,
                first_edition()
            );
        }
        if self.pipeline.max_id_attempts == 0 {
            bail!("pipeline.max_id_attempts must be at least 1");
        }
        Ok(())
    }
}
