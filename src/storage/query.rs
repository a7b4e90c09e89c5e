//! Read-side query parameters for listing and searching notices.
//!
//! Everything coming from a caller (CLI flags, agent tool arguments) is
//! validated here; invalid sort fields or directions are errors, never a
//! silent fallback to the default.

use chrono::NaiveDate;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid order_by parameter {0:?}. Allowed values: published_on, full_name, created_at")]
    InvalidOrderBy(String),

    #[error("Invalid order_direction parameter {0:?}. Allowed values: asc, desc")]
    InvalidDirection(String),

    #[error("Invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("page must be at least 1")]
    InvalidPage,

    #[error("limit must be between 1 and {MAX_LIMIT}")]
    InvalidLimit,

    #[error("Query parameter is required")]
    MissingQuery,
}

// ── Sorting ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    PublishedOn,
    FullName,
    CreatedAt,
}

impl SortField {
    pub(crate) fn column(self) -> &'static str {
        match self {
            SortField::PublishedOn => "published_on",
            SortField::FullName => "full_name",
            SortField::CreatedAt => "created_at",
        }
    }
}

impl FromStr for SortField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "published_on" => Ok(SortField::PublishedOn),
            "full_name" => Ok(SortField::FullName),
            "created_at" => Ok(SortField::CreatedAt),
            other => Err(QueryError::InvalidOrderBy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(QueryError::InvalidDirection(s.to_string())),
        }
    }
}

pub fn parse_date(s: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| QueryError::InvalidDate(s.to_string()))
}

fn parse_opt_date(s: Option<&str>) -> Result<Option<NaiveDate>, QueryError> {
    s.filter(|s| !s.trim().is_empty()).map(parse_date).transpose()
}

// ── List ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub order_by: SortField,
    pub direction: SortDirection,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
            date_from: None,
            date_to: None,
            order_by: SortField::default(),
            direction: SortDirection::default(),
        }
    }
}

impl ListQuery {
    /// Build from raw caller input.
    pub fn from_params(
        page: u32,
        limit: u32,
        date_from: Option<&str>,
        date_to: Option<&str>,
        order_by: &str,
        direction: &str,
    ) -> Result<Self, QueryError> {
        if page == 0 {
            return Err(QueryError::InvalidPage);
        }
        if limit == 0 || limit > MAX_LIMIT {
            return Err(QueryError::InvalidLimit);
        }

        Ok(Self {
            page,
            limit,
            date_from: parse_opt_date(date_from)?,
            date_to: parse_opt_date(date_to)?,
            order_by: order_by.parse()?,
            direction: direction.parse()?,
        })
    }

    pub(crate) fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

/// One page of results plus the numbers a pager needs.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, limit: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(limit.max(1) as u64);
        Self {
            items,
            page,
            limit,
            total,
            total_pages,
            has_next: (page as u64) < total_pages,
            has_prev: page > 1,
        }
    }
}

// ── Search ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: u32,
}

impl SearchQuery {
    /// `limit` defaults to 50 and is capped at 500.
    pub fn new(
        text: &str,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Self, QueryError> {
        if text.trim().is_empty() {
            return Err(QueryError::MissingQuery);
        }
        Ok(Self {
            text: text.trim().to_string(),
            date_from,
            date_to,
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        })
    }

    pub fn from_params(
        text: &str,
        date_from: Option<&str>,
        date_to: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Self, QueryError> {
        Self::new(text, parse_opt_date(date_from)?, parse_opt_date(date_to)?, limit)
    }

    /// Lower-cased search terms.
    pub(crate) fn terms(&self) -> impl Iterator<Item = String> + '_ {
        self.text.split_whitespace().map(str::to_lowercase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_defaults() {
        let q = ListQuery::from_params(1, 50, None, None, "published_on", "desc").unwrap();
        assert_eq!(q, ListQuery::default());
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn test_list_rejects_unknown_sort() {
        assert_eq!(
            ListQuery::from_params(1, 50, None, None, "id; DROP TABLE", "desc"),
            Err(QueryError::InvalidOrderBy("id; DROP TABLE".into()))
        );
        assert_eq!(
            ListQuery::from_params(1, 50, None, None, "full_name", "sideways"),
            Err(QueryError::InvalidDirection("sideways".into()))
        );
    }

    #[test]
    fn test_list_direction_is_case_insensitive() {
        let q = ListQuery::from_params(3, 10, None, None, "created_at", "ASC").unwrap();
        assert_eq!(q.direction, SortDirection::Asc);
        assert_eq!(q.order_by, SortField::CreatedAt);
        assert_eq!(q.offset(), 20);
    }

    #[test]
    fn test_list_validates_page_limit_and_dates() {
        assert_eq!(
            ListQuery::from_params(0, 50, None, None, "full_name", "asc"),
            Err(QueryError::InvalidPage)
        );
        assert_eq!(
            ListQuery::from_params(1, 501, None, None, "full_name", "asc"),
            Err(QueryError::InvalidLimit)
        );
        assert_eq!(
            ListQuery::from_params(1, 50, Some("01/01/2024"), None, "full_name", "asc"),
            Err(QueryError::InvalidDate("01/01/2024".into()))
        );
        let q = ListQuery::from_params(1, 50, Some("2024-01-01"), Some(""), "full_name", "asc").unwrap();
        assert_eq!(q.date_from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(q.date_to, None);
    }

    #[test]
    fn test_page_math() {
        let p: Page<()> = Page::new(vec![], 1, 50, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next && !p.has_prev);

        let p: Page<()> = Page::new(vec![], 2, 20, 41);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next && p.has_prev);
    }

    #[test]
    fn test_search_query() {
        assert_eq!(SearchQuery::new("  ", None, None, None), Err(QueryError::MissingQuery));

        let q = SearchQuery::new(" Jane  DOE ", None, None, Some(10_000)).unwrap();
        assert_eq!(q.limit, MAX_LIMIT);
        assert_eq!(q.terms().collect::<Vec<_>>(), vec!["jane", "doe"]);
    }
}
