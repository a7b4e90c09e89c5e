//! Pipeline orchestrator: ties edition page → parser → store together.
//!
//! ## Run modes
//!
//! `Mode::Scrape`: daily mode, run once a day from cron.
//!   Refuses dates that already have notices, then inserts every entry with
//!   insert-if-absent on `(full_name, content, published_on, source_link)`.
//!
//! `Mode::Recover`: gap filling, safe to re-run.
//!   No precondition on existing notices; an entry is skipped when a notice
//!   with the same `(published_on, content)` is already stored.
//!
//! Both modes share one code path. The mode only selects a [`DedupePolicy`].
//! A missing edition is a normal empty run. Network and parse failures end
//! the run with a warning instead of an error.

pub mod batch;
pub mod events;

use crate::config::PipelineConfig;
use crate::identifier::{HashIdGenerator, IdGenerator};
use crate::models::{NewNotice, ParsedEntry, Persisted};
use crate::scraper::parsers::NoticePage;
use crate::scraper::NoticeSource;
use crate::storage::{NoticeRepository, StorageError};
use chrono::NaiveDate;
use std::fmt;
use std::future;
use std::sync::Arc;
use thiserror::Error;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::debug;

use self::events::{EventSink, PipelineEvent, SkipReason, TracingSink};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failures that abort a run and reach the caller.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("date {date} is before the first supported edition ({min_date})")]
    Configuration { date: NaiveDate, min_date: NaiveDate },

    #[error("funeral notices already exist for {0}")]
    DuplicateRun(NaiveDate),

    #[error("could not assign a unique hash_id after {attempts} attempts")]
    PersistenceConflict { attempts: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ── Modes & dedupe policies ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    Scrape,
    Recover,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Scrape => "scrape",
            Mode::Recover => "recover",
        }
    }

    fn policy(self) -> &'static dyn DedupePolicy {
        match self {
            Mode::Scrape => &ScrapePolicy,
            Mode::Recover => &RecoveryPolicy,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode-specific rules: what must hold before fetching, and how an entry
/// is matched against what is already stored.
pub trait DedupePolicy: Send + Sync {
    fn precondition(&self, repo: &dyn NoticeRepository, date: NaiveDate) -> Result<(), IngestError>;

    /// `next_id` is called only once the entry is known to be new.
    fn persist(
        &self,
        repo: &dyn NoticeRepository,
        fields: &NewNotice,
        next_id: &dyn Fn() -> String,
    ) -> Result<Persisted, StorageError>;
}

pub struct ScrapePolicy;

impl DedupePolicy for ScrapePolicy {
    fn precondition(&self, repo: &dyn NoticeRepository, date: NaiveDate) -> Result<(), IngestError> {
        if repo.exists_for_date(date)? {
            return Err(IngestError::DuplicateRun(date));
        }
        Ok(())
    }

    fn persist(
        &self,
        repo: &dyn NoticeRepository,
        fields: &NewNotice,
        next_id: &dyn Fn() -> String,
    ) -> Result<Persisted, StorageError> {
        repo.find_or_create(fields, next_id)
    }
}

/// Dedupes on `(published_on, content)`; the name is not part of the key.
pub struct RecoveryPolicy;

impl DedupePolicy for RecoveryPolicy {
    fn precondition(&self, _: &dyn NoticeRepository, _: NaiveDate) -> Result<(), IngestError> {
        Ok(())
    }

    fn persist(
        &self,
        repo: &dyn NoticeRepository,
        fields: &NewNotice,
        next_id: &dyn Fn() -> String,
    ) -> Result<Persisted, StorageError> {
        if repo.exists_for_date_and_content(fields.published_on, &fields.content)? {
            return Ok(Persisted::Skipped);
        }
        repo.create(fields, &next_id()).map(Persisted::Created)
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// No edition published for the date.
    Empty,
    /// Stopped early; whatever was stored before the failure stays.
    Warning(String),
}

impl RunOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Empty => "empty",
            RunOutcome::Warning(_) => "warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub date: NaiveDate,
    pub mode: Mode,
    pub source_link: String,
    pub outcome: RunOutcome,
    pub parsed: usize,
    pub created: usize,
    pub skipped: usize,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline<R> {
    source: Box<dyn NoticeSource>,
    repo: R,
    ids: Box<dyn IdGenerator>,
    events: Arc<dyn EventSink>,
    min_date: NaiveDate,
    max_id_attempts: usize,
}

impl<R: NoticeRepository> Pipeline<R> {
    pub fn new(source: Box<dyn NoticeSource>, repo: R, config: &PipelineConfig) -> Self {
        let ids: HashIdGenerator = HashIdGenerator::default();
        Self {
            source,
            repo,
            ids: Box::new(ids),
            events: Arc::new(TracingSink),
            min_date: config.min_date,
            max_id_attempts: config.max_id_attempts.max(1),
        }
    }

    pub fn with_ids(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Checks that must pass before any network activity.
    pub fn validate(&self, date: NaiveDate, mode: Mode) -> Result<(), IngestError> {
        if date < self.min_date {
            return Err(IngestError::Configuration {
                date,
                min_date: self.min_date,
            });
        }
        mode.policy().precondition(&self.repo, date)
    }

    pub async fn run(&self, date: NaiveDate, mode: Mode) -> Result<RunReport, IngestError> {
        self.validate(date, mode)?;

        let url = self.source.page_url(date);
        let mut report = RunReport {
            date,
            mode,
            source_link: url.clone(),
            outcome: RunOutcome::Completed,
            parsed: 0,
            created: 0,
            skipped: 0,
        };
        self.events.emit(&PipelineEvent::Started {
            date,
            mode,
            url: url.clone(),
        });

        // ── 1. Is there an edition at all? ────────────────────────────────────
        match self.source.probe(&url).await {
            Ok(true) => {}
            Ok(false) => {
                self.events.emit(&PipelineEvent::Absent { url });
                report.outcome = RunOutcome::Empty;
                return Ok(self.finish(report));
            }
            Err(e) => return Ok(self.warn(report, format!("Error probing {}: {}", url, e))),
        }

        // ── 2. Fetch + parse ──────────────────────────────────────────────────
        let entries = match self.fetch_entries(&url).await {
            Ok(entries) => entries,
            Err(e) => return Ok(self.warn(report, format!("Error scraping {}: {:#}", url, e))),
        };
        report.parsed = entries.len();

        // ── 3. Persist in document order ──────────────────────────────────────
        let policy = mode.policy();
        for entry in entries {
            let fields = NewNotice::from_entry(entry, date, &url);

            match self.persist_with_retry(policy, &fields).await {
                Ok(Persisted::Created(notice)) => {
                    report.created += 1;
                    self.events.emit(&PipelineEvent::Created {
                        hash_id: notice.hash_id,
                        full_name: notice.full_name,
                    });
                }
                Ok(Persisted::Existing(_)) => {
                    report.skipped += 1;
                    self.events.emit(&PipelineEvent::Skipped {
                        full_name: fields.full_name,
                        reason: SkipReason::AlreadyStored,
                    });
                }
                Ok(Persisted::Skipped) => {
                    report.skipped += 1;
                    self.events.emit(&PipelineEvent::Skipped {
                        full_name: fields.full_name,
                        reason: SkipReason::SameContent,
                    });
                }
                Err(StorageError::HashCollision(_)) => {
                    return Err(IngestError::PersistenceConflict {
                        attempts: self.max_id_attempts,
                    });
                }
                Err(e) => {
                    let message = format!("Error storing {} from {}: {}", fields.full_name, url, e);
                    return Ok(self.warn(report, message));
                }
            }
        }

        Ok(self.finish(report))
    }

    async fn fetch_entries(&self, url: &str) -> anyhow::Result<Vec<ParsedEntry>> {
        let html = self.source.fetch(url).await?;
        let page = NoticePage::parse(&html)?;
        Ok(page.entries().collect())
    }

    /// Only collisions are retried, each attempt with a fresh `hash_id`.
    /// Entries that turn out to be stored already never draw an id.
    async fn persist_with_retry(
        &self,
        policy: &dyn DedupePolicy,
        fields: &NewNotice,
    ) -> Result<Persisted, StorageError> {
        let retries = FixedInterval::from_millis(0).take(self.max_id_attempts - 1);

        RetryIf::spawn(
            retries,
            || {
                let next_id =
                    || self.ids.generate(fields.published_on, &fields.full_name, &fields.content);
                future::ready(policy.persist(&self.repo, fields, &next_id))
            },
            |e: &StorageError| {
                if e.is_hash_collision() {
                    debug!("{}, regenerating", e);
                }
                e.is_hash_collision()
            },
        )
        .await
    }

    fn warn(&self, mut report: RunReport, message: String) -> RunReport {
        self.events.emit(&PipelineEvent::Warning {
            message: message.clone(),
        });
        report.outcome = RunOutcome::Warning(message);
        self.finish(report)
    }

    fn finish(&self, report: RunReport) -> RunReport {
        self.events.emit(&PipelineEvent::Finished {
            date: report.date,
            created: report.created,
            skipped: report.skipped,
        });
        report
    }
}
