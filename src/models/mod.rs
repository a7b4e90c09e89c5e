use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::slugify;

// ── Notice ────────────────────────────────────────────────────────────────────

/// A stored funeral notice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub id: i64,
    pub full_name: String,
    pub content: String,
    pub published_on: NaiveDate,
    pub source_link: String,
    pub hash_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Notice {
    /// `{slug}-{hash_id}`, the last segment of the permalink.
    pub fn name_hash(&self) -> String {
        format!("{}-{}", slugify(&self.full_name), self.hash_id)
    }

    /// Canonical permalink path, e.g. `2024-01-01/john-doe-f6524f`.
    ///
    /// Derived on every call and never stored; changing the slug rules
    /// breaks every link already handed out.
    pub fn permalink(&self) -> String {
        format!("{}/{}", self.published_on.format("%Y-%m-%d"), self.name_hash())
    }
}

// ── Insertable fields ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotice {
    pub full_name: String,
    pub content: String,
    pub published_on: NaiveDate,
    pub source_link: String,
}

impl NewNotice {
    pub fn from_entry(entry: ParsedEntry, published_on: NaiveDate, source_link: &str) -> Self {
        Self {
            full_name: entry.full_name,
            content: entry.content,
            published_on,
            source_link: source_link.to_string(),
        }
    }

    /// Name of the first required field that is blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.full_name.trim().is_empty() {
            Some("full_name")
        } else if self.content.trim().is_empty() {
            Some("content")
        } else if self.source_link.trim().is_empty() {
            Some("source_link")
        } else {
            None
        }
    }
}

// ── Parser output ─────────────────────────────────────────────────────────────

/// One obituary entry lifted out of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub full_name: String,
    pub content: String,
}

/// What happened to a single entry when it reached the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted {
    Created(Notice),
    /// Same composite key was already stored.
    Existing(Notice),
    /// Dedupe policy decided the entry is already covered.
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(full_name: &str, hash_id: &str) -> Notice {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        Notice {
            id: 1,
            full_name: full_name.to_string(),
            content: "Test content".to_string(),
            published_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            source_link: "https://example.com".to_string(),
            hash_id: hash_id.to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_permalink_format() {
        let n = notice("Test Person", "abc123");
        assert_eq!(n.permalink(), "2024-01-01/test-person-abc123");
        assert_eq!(n.name_hash(), "test-person-abc123");
    }

    #[test]
    fn test_permalink_is_stable() {
        let n = notice("María José González-López", "f6524f");
        assert_eq!(n.permalink(), n.permalink());
        assert_eq!(n.permalink(), "2024-01-01/maria-jose-gonzalez-lopez-f6524f");
    }

    #[test]
    fn test_missing_field() {
        let mut fields = NewNotice {
            full_name: "JOHN DOE".into(),
            content: "  ".into(),
            published_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            source_link: "https://example.com".into(),
        };
        assert_eq!(fields.missing_field(), Some("content"));
        fields.content = "body".into();
        assert_eq!(fields.missing_field(), None);
        fields.full_name = String::new();
        assert_eq!(fields.missing_field(), Some("full_name"));
    }
}
