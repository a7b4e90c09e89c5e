pub mod query;

use crate::models::{NewNotice, Notice, Persisted};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::{params, params_from_iter, Connection, Row, ToSql};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use self::query::{ListQuery, Page, SearchQuery};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS funeral_notices_id_seq START 1;

CREATE TABLE IF NOT EXISTS funeral_notices (
    id            BIGINT    PRIMARY KEY DEFAULT nextval('funeral_notices_id_seq'),
    full_name     VARCHAR   NOT NULL,
    content       VARCHAR   NOT NULL,
    published_on  DATE      NOT NULL,
    source_link   VARCHAR   NOT NULL,
    hash_id       VARCHAR   NOT NULL UNIQUE,
    created_at    TIMESTAMP NOT NULL,
    updated_at    TIMESTAMP NOT NULL,
    -- scrape-mode insert-if-absent key
    UNIQUE (published_on, full_name, content, source_link)
);

CREATE SEQUENCE IF NOT EXISTS ingestion_runs_id_seq START 1;

CREATE TABLE IF NOT EXISTS ingestion_runs (
    id               BIGINT    PRIMARY KEY DEFAULT nextval('ingestion_runs_id_seq'),
    published_on     DATE      NOT NULL,
    mode             VARCHAR   NOT NULL,
    started_at       TIMESTAMP NOT NULL,
    finished_at      TIMESTAMP,
    status           VARCHAR   NOT NULL DEFAULT 'running',
    notices_created  INTEGER   DEFAULT 0,
    error_msg        VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_notices_published_on_hash ON funeral_notices (published_on, hash_id);
CREATE INDEX IF NOT EXISTS idx_runs_published_on         ON ingestion_runs (published_on);
"#;

const NOTICE_COLUMNS: &str =
    "id, full_name, content, published_on, source_link, hash_id, created_at, updated_at";

fn notice_from_row(r: &Row<'_>) -> duckdb::Result<Notice> {
    Ok(Notice {
        id: r.get(0)?,
        full_name: r.get(1)?,
        content: r.get(2)?,
        published_on: r.get(3)?,
        source_link: r.get(4)?,
        hash_id: r.get(5)?,
        created_at: r.get(6)?,
        updated_at: r.get(7)?,
    })
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("hash_id {0:?} is already taken")]
    HashCollision(String),

    #[error("notice field `{0}` must not be blank")]
    Invalid(&'static str),

    #[error("duplicate notice for key on {0}")]
    DuplicateKey(NaiveDate),

    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
}

impl StorageError {
    pub fn is_hash_collision(&self) -> bool {
        matches!(self, StorageError::HashCollision(_))
    }
}

// ── Repository boundary ───────────────────────────────────────────────────────

/// What the ingestion pipeline needs from the notice store.
pub trait NoticeRepository {
    fn exists_for_date(&self, date: NaiveDate) -> Result<bool, StorageError>;

    fn exists_for_date_and_content(
        &self,
        date: NaiveDate,
        content: &str,
    ) -> Result<bool, StorageError>;

    /// Insert-if-absent on `(full_name, content, published_on, source_link)`.
    /// `next_id` is called only when a row is about to be created.
    fn find_or_create(
        &self,
        fields: &NewNotice,
        next_id: &dyn Fn() -> String,
    ) -> Result<Persisted, StorageError>;

    /// Plain insert. `StorageError::HashCollision` if `hash_id` is taken.
    fn create(&self, fields: &NewNotice, hash_id: &str) -> Result<Notice, StorageError>;
}

impl<T: NoticeRepository + ?Sized> NoticeRepository for &T {
    fn exists_for_date(&self, date: NaiveDate) -> Result<bool, StorageError> {
        (**self).exists_for_date(date)
    }

    fn exists_for_date_and_content(
        &self,
        date: NaiveDate,
        content: &str,
    ) -> Result<bool, StorageError> {
        (**self).exists_for_date_and_content(date, content)
    }

    fn find_or_create(
        &self,
        fields: &NewNotice,
        next_id: &dyn Fn() -> String,
    ) -> Result<Persisted, StorageError> {
        (**self).find_or_create(fields, next_id)
    }

    fn create(&self, fields: &NewNotice, hash_id: &str) -> Result<Notice, StorageError> {
        (**self).create(fields, hash_id)
    }
}

/// One row per ingest attempt, in `ingestion_runs`.
pub trait RunLog {
    fn begin(&self, date: NaiveDate, mode: &str) -> Result<i64, StorageError>;

    fn finish(
        &self,
        run_id: i64,
        status: &str,
        created: usize,
        error: Option<&str>,
    ) -> Result<(), StorageError>;
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Notices: lookups ──────────────────────────────────────────────────────

    pub fn find_by_hash_id(&self, hash_id: &str) -> Result<Option<Notice>, StorageError> {
        let sql = format!("SELECT {NOTICE_COLUMNS} FROM funeral_notices WHERE hash_id = ?");
        optional(self.conn.query_row(&sql, params![hash_id], notice_from_row))
    }

    pub fn find_by_date_and_hash(
        &self,
        date: NaiveDate,
        hash_id: &str,
    ) -> Result<Option<Notice>, StorageError> {
        let sql = format!(
            "SELECT {NOTICE_COLUMNS} FROM funeral_notices WHERE published_on = ? AND hash_id = ?"
        );
        optional(self.conn.query_row(&sql, params![date, hash_id], notice_from_row))
    }

    fn find_by_key(&self, fields: &NewNotice) -> Result<Option<Notice>, StorageError> {
        let sql = format!(
            r#"SELECT {NOTICE_COLUMNS} FROM funeral_notices
               WHERE published_on = ? AND full_name = ? AND content = ? AND source_link = ?"#
        );
        optional(self.conn.query_row(
            &sql,
            params![fields.published_on, fields.full_name, fields.content, fields.source_link],
            notice_from_row,
        ))
    }

    fn hash_id_taken(&self, hash_id: &str) -> Result<bool, StorageError> {
        Ok(self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM funeral_notices WHERE hash_id = ?)",
            params![hash_id],
            |r| r.get(0),
        )?)
    }

    /// Map a failed insert onto the errors callers act on. The `hash_id`
    /// check runs again because another writer may have taken it since.
    fn classify_insert_error(&self, err: duckdb::Error, hash_id: &str, date: NaiveDate) -> StorageError {
        if !is_unique_violation(&err) {
            return StorageError::Database(err);
        }
        match self.hash_id_taken(hash_id) {
            Ok(true) => StorageError::HashCollision(hash_id.to_string()),
            Ok(false) => StorageError::DuplicateKey(date),
            Err(e) => e,
        }
    }

    // ── Notices: read contract ────────────────────────────────────────────────

    /// Paginated listing for the agent-tool / presentation readers.
    pub fn list(&self, q: &ListQuery) -> Result<Page<Notice>, StorageError> {
        let mut clauses = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        push_date_range(&mut clauses, &mut values, q.date_from, q.date_to);
        let where_sql = where_clause(&clauses);

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM funeral_notices {where_sql}"),
            params_from_iter(values.iter()),
            |r| r.get(0),
        )?;

        let sql = format!(
            r#"SELECT {NOTICE_COLUMNS} FROM funeral_notices {where_sql}
               ORDER BY {} {}, full_name ASC
               LIMIT ? OFFSET ?"#,
            q.order_by.column(),
            q.direction.keyword(),
        );
        values.push(Box::new(q.limit as i64));
        values.push(Box::new(q.offset() as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(values.iter()), notice_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;

        Ok(Page::new(items, q.page, q.limit, total.max(0) as u64))
    }

    /// Every whitespace-separated term must appear in the name or the body.
    pub fn search(&self, q: &SearchQuery) -> Result<Vec<Notice>, StorageError> {
        let mut clauses = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        for term in q.terms() {
            clauses.push("(contains(lower(full_name), ?) OR contains(lower(content), ?))".to_string());
            values.push(Box::new(term.clone()));
            values.push(Box::new(term));
        }
        push_date_range(&mut clauses, &mut values, q.date_from, q.date_to);

        let sql = format!(
            r#"SELECT {NOTICE_COLUMNS} FROM funeral_notices {}
               ORDER BY published_on DESC, full_name ASC
               LIMIT ?"#,
            where_clause(&clauses),
        );
        values.push(Box::new(q.limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), notice_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every notice, oldest edition first.
    pub fn all_notices(&self) -> Result<Vec<Notice>, StorageError> {
        let sql = format!(
            "SELECT {NOTICE_COLUMNS} FROM funeral_notices ORDER BY published_on ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], notice_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn notice_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM funeral_notices")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let mut s = self
            .conn
            .prepare("SELECT MIN(published_on), MAX(published_on) FROM funeral_notices")?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    // ── Ingestion run log ─────────────────────────────────────────────────────

    pub fn run_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM ingestion_runs")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    /// `(status, runs)` pairs, alphabetical by status.
    pub fn run_status_counts(&self) -> Result<Vec<(String, i64)>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM ingestion_runs GROUP BY status ORDER BY status",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl RunLog for Repository {
    fn begin(&self, date: NaiveDate, mode: &str) -> Result<i64, StorageError> {
        Ok(self.conn.query_row(
            r#"INSERT INTO ingestion_runs (published_on, mode, started_at, status)
               VALUES (?, ?, ?, 'running')
               RETURNING id"#,
            params![date, mode, Utc::now().naive_utc()],
            |r| r.get(0),
        )?)
    }

    fn finish(
        &self,
        run_id: i64,
        status: &str,
        created: usize,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            r#"UPDATE ingestion_runs SET
               finished_at = ?, status = ?, notices_created = ?, error_msg = ?
               WHERE id = ?"#,
            params![Utc::now().naive_utc(), status, created as i64, error, run_id],
        )?;
        Ok(())
    }
}

impl NoticeRepository for Repository {
    fn exists_for_date(&self, date: NaiveDate) -> Result<bool, StorageError> {
        Ok(self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM funeral_notices WHERE published_on = ?)",
            params![date],
            |r| r.get(0),
        )?)
    }

    fn exists_for_date_and_content(
        &self,
        date: NaiveDate,
        content: &str,
    ) -> Result<bool, StorageError> {
        Ok(self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM funeral_notices WHERE published_on = ? AND content = ?)",
            params![date, content],
            |r| r.get(0),
        )?)
    }

    fn find_or_create(
        &self,
        fields: &NewNotice,
        next_id: &dyn Fn() -> String,
    ) -> Result<Persisted, StorageError> {
        if let Some(existing) = self.find_by_key(fields)? {
            return Ok(Persisted::Existing(existing));
        }

        match self.create(fields, &next_id()) {
            Ok(notice) => Ok(Persisted::Created(notice)),
            // Lost a race with another writer on the same key.
            Err(StorageError::DuplicateKey(_)) => self
                .find_by_key(fields)?
                .map(Persisted::Existing)
                .ok_or(StorageError::DuplicateKey(fields.published_on)),
            Err(e) => Err(e),
        }
    }

    fn create(&self, fields: &NewNotice, hash_id: &str) -> Result<Notice, StorageError> {
        if let Some(field) = fields.missing_field() {
            return Err(StorageError::Invalid(field));
        }
        if self.hash_id_taken(hash_id)? {
            return Err(StorageError::HashCollision(hash_id.to_string()));
        }

        let now = Utc::now().naive_utc();
        let sql = format!(
            r#"INSERT INTO funeral_notices
                   (full_name, content, published_on, source_link, hash_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               RETURNING {NOTICE_COLUMNS}"#
        );

        let notice = self
            .conn
            .query_row(
                &sql,
                params![
                    fields.full_name,
                    fields.content,
                    fields.published_on,
                    fields.source_link,
                    hash_id,
                    now,
                    now,
                ],
                notice_from_row,
            )
            .map_err(|e| self.classify_insert_error(e, hash_id, fields.published_on))?;

        debug!("stored {} ({})", notice.hash_id, notice.full_name);
        Ok(notice)
    }
}

fn optional<T>(result: duckdb::Result<T>) -> Result<Option<T>, StorageError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// DuckDB reports every UNIQUE / PRIMARY KEY violation as a failure whose
/// message reads `Constraint Error: Duplicate key "..." violates unique
/// constraint`. The C API gives no distinct error code for it.
fn is_unique_violation(err: &duckdb::Error) -> bool {
    match err {
        duckdb::Error::DuckDBFailure(_, Some(message)) => {
            let message = message.to_lowercase();
            message.contains("constraint error") && message.contains("duplicate key")
        }
        _ => false,
    }
}

fn push_date_range(
    clauses: &mut Vec<String>,
    values: &mut Vec<Box<dyn ToSql>>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) {
    if let Some(from) = from {
        clauses.push("published_on >= ?".to_string());
        values.push(Box::new(from));
    }
    if let Some(to) = to {
        clauses.push("published_on <= ?".to_string());
        values.push(Box::new(to));
    }
}

fn where_clause(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}
