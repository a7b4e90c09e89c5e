//! CSV dump of stored notices.

use crate::models::Notice;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// One CSV line. Field order is the column order.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    hash_id: &'a str,
    published_on: String,
    full_name: &'a str,
    content: &'a str,
    source_link: &'a str,
    permalink: String,
    created_at: String,
    updated_at: String,
}

impl<'a> From<&'a Notice> for ExportRow<'a> {
    fn from(n: &'a Notice) -> Self {
        Self {
            hash_id: &n.hash_id,
            published_on: n.published_on.format("%Y-%m-%d").to_string(),
            full_name: &n.full_name,
            content: &n.content,
            source_link: &n.source_link,
            permalink: n.permalink(),
            created_at: n.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            updated_at: n.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Write `notices` with a header row. Returns the number of data rows.
pub fn write_csv<W: Write>(notices: &[Notice], writer: W) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    for notice in notices {
        csv.serialize(ExportRow::from(notice))?;
    }
    csv.flush()?;
    Ok(notices.len())
}

pub fn export_to_path(notices: &[Notice], path: &Path) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("Could not create {:?}", path))?;
    let rows = write_csv(notices, file)?;
    info!("Exported {} notices to {:?}", rows, path);
    Ok(rows)
}
