//! Run-log bookkeeping around single ingests, and date-range backfills.
//!
//! A backfill never stops on a bad day: rejected dates (already scraped,
//! before the first edition), warnings and failures are logged and the
//! next date is attempted.

use crate::storage::{NoticeRepository, RunLog};
use anyhow::Result;
use chrono::NaiveDate;
use tracing::{info, warn};

use super::{IngestError, Mode, Pipeline, RunOutcome, RunReport};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillSummary {
    pub days: usize,
    pub created: usize,
    pub warnings: usize,
    /// Dates whose run returned an error, with the rendered error.
    pub failures: Vec<(NaiveDate, String)>,
}

fn failure_status(err: &IngestError) -> &'static str {
    match err {
        IngestError::Configuration { .. } | IngestError::DuplicateRun(_) => "rejected",
        _ => "failed",
    }
}

/// Run one date and record it in the run log.
pub async fn record_run<R: NoticeRepository>(
    pipeline: &Pipeline<R>,
    log: &dyn RunLog,
    date: NaiveDate,
    mode: Mode,
) -> Result<RunReport> {
    let run_id = log.begin(date, mode.as_str())?;

    match pipeline.run(date, mode).await {
        Ok(report) => {
            let error = match &report.outcome {
                RunOutcome::Warning(message) => Some(message.as_str()),
                _ => None,
            };
            log.finish(run_id, report.outcome.status(), report.created, error)?;
            Ok(report)
        }
        Err(e) => {
            log.finish(run_id, failure_status(&e), 0, Some(&e.to_string()))?;
            Err(e.into())
        }
    }
}

/// Ingest every date in `from..=to`, oldest first, one at a time.
pub async fn backfill<R: NoticeRepository>(
    pipeline: &Pipeline<R>,
    log: &dyn RunLog,
    from: NaiveDate,
    to: NaiveDate,
    mode: Mode,
) -> BackfillSummary {
    let mut summary = BackfillSummary::default();

    for date in from.iter_days().take_while(|d| *d <= to) {
        summary.days += 1;
        match record_run(pipeline, log, date, mode).await {
            Ok(report) => {
                summary.created += report.created;
                if matches!(report.outcome, RunOutcome::Warning(_)) {
                    summary.warnings += 1;
                }
            }
            Err(e) => {
                warn!("{}: {:#}", date, e);
                summary.failures.push((date, format!("{:#}", e)));
            }
        }
    }

    info!(
        "Backfill done: {} days, {} notices created, {} warnings, {} errors",
        summary.days,
        summary.created,
        summary.warnings,
        summary.failures.len()
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::identifier::testing::ScriptedIds;
    use crate::models::NewNotice;
    use crate::scraper::{edition_url, FetchError, NoticeSource};
    use crate::storage::Repository;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const BASE: &str = "https://funebres.eldia.com/edis";
    const PAGE: &str = "funebres2.htm";

    enum Day {
        Page(String),
        Down,
    }

    /// Answers per edition URL; dates without an entry have no edition.
    struct DatedSource {
        days: HashMap<String, Day>,
        probes: Arc<AtomicUsize>,
    }

    impl DatedSource {
        fn new(days: Vec<(NaiveDate, Day)>) -> Self {
            Self {
                days: days
                    .into_iter()
                    .map(|(date, day)| (edition_url(BASE, PAGE, date), day))
                    .collect(),
                probes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl NoticeSource for DatedSource {
        fn page_url(&self, date: NaiveDate) -> String {
            edition_url(BASE, PAGE, date)
        }

        async fn probe(&self, url: &str) -> Result<bool, FetchError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            match self.days.get(url) {
                Some(Day::Page(_)) => Ok(true),
                Some(Day::Down) => Err(FetchError::UpstreamStatus {
                    url: url.to_string(),
                    status: 503,
                }),
                None => Ok(false),
            }
        }

        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            match self.days.get(url) {
                Some(Day::Page(html)) => Ok(html.clone()),
                _ => Err(FetchError::UpstreamStatus {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    fn page(name: &str, body: &str) -> Day {
        Day::Page(format!(
            r#"<div class="grid_10 funebres"><ul><li class="c">{name}<br><span>{body}</span></li></ul></div>"#
        ))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    fn statuses(repo: &Repository) -> Vec<(String, i64)> {
        repo.run_status_counts().unwrap()
    }

    #[tokio::test]
    async fn test_bad_days_do_not_stop_the_backfill() {
        let repo = repo();
        repo.create(
            &NewNotice {
                full_name: "ALREADY THERE".into(),
                content: "stored by an earlier run".into(),
                published_on: date(2024, 1, 2),
                source_link: edition_url(BASE, PAGE, date(2024, 1, 2)),
            },
            "abc123",
        )
        .unwrap();

        let source = DatedSource::new(vec![
            (date(2024, 1, 1), page("JOHN DOE", "(Q.E.P.D.) Falleció el 31/12/2023.")),
            (date(2024, 1, 2), page("JANE SMITH", "(Q.E.P.D.) Falleció el 01/01/2024.")),
            (date(2024, 1, 3), Day::Down),
            (date(2024, 1, 4), page("MARÍA PÉREZ", "(Q.E.P.D.) Falleció el 03/01/2024.")),
        ]);
        let pipeline = Pipeline::new(Box::new(source), &repo, &PipelineConfig::default());

        let summary = backfill(&pipeline, &repo, date(2024, 1, 1), date(2024, 1, 5), Mode::Scrape).await;

        assert_eq!(summary.days, 5);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, date(2024, 1, 2));

        assert!(repo.exists_for_date(date(2024, 1, 4)).unwrap());
        assert!(!repo.exists_for_date_and_content(date(2024, 1, 2), "(Q.E.P.D.) Falleció el 01/01/2024.").unwrap());
        assert_eq!(
            statuses(&repo),
            vec![
                ("completed".to_string(), 2),
                ("empty".to_string(), 1),
                ("rejected".to_string(), 1),
                ("warning".to_string(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_dates_before_first_edition_are_rejected_without_network() {
        let repo = repo();
        let source = DatedSource::new(vec![]);
        let probes = source.probes.clone();
        let pipeline = Pipeline::new(Box::new(source), &repo, &PipelineConfig::default());

        let summary = backfill(&pipeline, &repo, date(2006, 4, 30), date(2006, 5, 3), Mode::Recover).await;

        assert_eq!(summary.days, 4);
        assert_eq!(
            summary.failures.iter().map(|(d, _)| *d).collect::<Vec<_>>(),
            vec![date(2006, 4, 30), date(2006, 5, 1)]
        );
        assert_eq!(probes.load(Ordering::SeqCst), 2);
        assert_eq!(
            statuses(&repo),
            vec![("empty".to_string(), 2), ("rejected".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_conflict_is_recorded_as_failed() {
        let repo = repo();
        repo.create(
            &NewNotice {
                full_name: "SOMEONE ELSE".into(),
                content: "older notice".into(),
                published_on: date(2023, 12, 31),
                source_link: edition_url(BASE, PAGE, date(2023, 12, 31)),
            },
            "aaaaaa",
        )
        .unwrap();
        let source = DatedSource::new(vec![(date(2024, 1, 1), page("JOHN DOE", "body"))]);
        let pipeline = Pipeline::new(Box::new(source), &repo, &PipelineConfig::default())
            .with_ids(Box::new(ScriptedIds::new(&["aaaaaa"])));

        let result = record_run(&pipeline, &repo, date(2024, 1, 1), Mode::Scrape).await;

        assert!(result.is_err());
        assert_eq!(statuses(&repo), vec![("failed".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_empty_range() {
        let repo = repo();
        let pipeline = Pipeline::new(Box::new(DatedSource::new(vec![])), &repo, &PipelineConfig::default());

        let summary = backfill(&pipeline, &repo, date(2024, 1, 2), date(2024, 1, 1), Mode::Recover).await;

        assert_eq!(summary, BackfillSummary::default());
        assert_eq!(repo.run_count().unwrap(), 0);
    }
}
