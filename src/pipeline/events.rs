//! Structured progress events emitted by an ingestion run.
//!
//! The pipeline never logs directly; it hands events to an [`EventSink`] and
//! the process decides where they go. [`TracingSink`] is the default.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::Mode;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started {
        date: NaiveDate,
        mode: Mode,
        url: String,
    },
    /// Upstream has no edition for the date.
    Absent { url: String },
    Created {
        hash_id: String,
        full_name: String,
    },
    Skipped {
        full_name: String,
        reason: SkipReason,
    },
    Warning { message: String },
    Finished {
        date: NaiveDate,
        created: usize,
        skipped: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Same date and body already stored.
    SameContent,
    /// Same composite key already stored.
    AlreadyStored,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Routes events onto `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Started { date, mode, url } => {
                info!("📅 {} {} from {}", mode, date, url)
            }
            PipelineEvent::Absent { url } => info!("🔍 Newspaper not found ({})", url),
            PipelineEvent::Created { hash_id, full_name } => {
                debug!("✅ {} {}", hash_id, full_name)
            }
            PipelineEvent::Skipped { full_name, reason } => {
                debug!("⏩ Skipping {} ({:?})", full_name, reason)
            }
            PipelineEvent::Warning { message } => warn!("⚠️ {}", message),
            PipelineEvent::Finished { date, created, skipped } => {
                info!("{}: {} created, {} skipped", date, created, skipped)
            }
        }
    }
}
