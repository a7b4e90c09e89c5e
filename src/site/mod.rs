//! Public-site helpers: permalink resolution and sitemap generation.

use crate::config::SiteConfig;
use crate::identifier::is_valid_hash_id;
use crate::models::Notice;
use crate::storage::{Repository, StorageError};
use anyhow::Result;
use chrono::NaiveDate;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

// ── Permalinks ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(Notice),
    /// Right notice, stale or mistyped slug.
    Redirect { location: String, status: u16 },
    NotFound,
}

/// Resolve `/{base_path}/{date}/{name_hash}`.
///
/// Only `(date, hash_id)` identifies a notice. The slug in front of the
/// hash is cosmetic: a wrong one redirects permanently to the canonical
/// permalink instead of failing.
pub fn resolve(
    repo: &Repository,
    base_path: &str,
    date: &str,
    name_hash: &str,
) -> Result<Resolution, StorageError> {
    let (date, name_hash) = (date.trim(), name_hash.trim());
    if date.is_empty() || name_hash.is_empty() {
        return Ok(Resolution::NotFound);
    }
    let Some((_, hash_id)) = name_hash.rsplit_once('-') else {
        return Ok(Resolution::NotFound);
    };
    let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
        return Ok(Resolution::NotFound);
    };

    let hash_id = hash_id.to_ascii_lowercase();
    if !is_valid_hash_id(&hash_id) {
        return Ok(Resolution::NotFound);
    }

    let Some(notice) = repo.find_by_date_and_hash(date, &hash_id)? else {
        return Ok(Resolution::NotFound);
    };

    if name_hash.eq_ignore_ascii_case(&notice.name_hash()) {
        Ok(Resolution::Found(notice))
    } else {
        Ok(Resolution::Redirect {
            location: notice_path(base_path, &notice),
            status: 301,
        })
    }
}

pub fn notice_path(base_path: &str, notice: &Notice) -> String {
    format!("{}/{}", base_path.trim_end_matches('/'), notice.permalink())
}

// ── Sitemap ───────────────────────────────────────────────────────────────────

struct SitemapUrl {
    loc: String,
    changefreq: &'static str,
    priority: &'static str,
    lastmod: Option<String>,
}

/// `sitemap.xml` for the public site: home, every index page, every notice.
pub fn build_sitemap(site: &SiteConfig, notices: &[Notice]) -> Result<String> {
    let host = site.host.trim_end_matches('/');
    let base_path = site.base_path.trim_end_matches('/');
    let index_pages = notices.len().div_ceil(site.per_page.max(1));

    let mut urls = vec![SitemapUrl {
        loc: format!("{}/", host),
        changefreq: "daily",
        priority: "1.0",
        lastmod: None,
    }];
    urls.extend((1..=index_pages).map(|page| SitemapUrl {
        loc: format!("{}{}?page={}", host, base_path, page),
        changefreq: "daily",
        priority: "0.8",
        lastmod: None,
    }));
    urls.extend(notices.iter().map(|notice| SitemapUrl {
        loc: format!("{}{}", host, notice_path(base_path, notice)),
        changefreq: "monthly",
        priority: "0.6",
        lastmod: Some(notice.updated_at.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()),
    }));

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut urlset = BytesStart::new("urlset");
    urlset.push_attribute(("xmlns", SITEMAP_NS));
    writer.write_event(Event::Start(urlset))?;

    for url in &urls {
        writer.write_event(Event::Start(BytesStart::new("url")))?;
        text_element(&mut writer, "loc", &url.loc)?;
        if let Some(lastmod) = &url.lastmod {
            text_element(&mut writer, "lastmod", lastmod)?;
        }
        text_element(&mut writer, "changefreq", url.changefreq)?;
        text_element(&mut writer, "priority", url.priority)?;
        writer.write_event(Event::End(BytesEnd::new("url")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("urlset")))?;
    Ok(String::from_utf8(writer.into_inner())?)
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewNotice;
    use crate::storage::NoticeRepository;

    const BASE_PATH: &str = "/funeral-notices";

    fn repo_with(name: &str) -> (Repository, Notice) {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        let notice = repo
            .create(
                &NewNotice {
                    full_name: name.to_string(),
                    content: "(Q.E.P.D.) Falleció el 30/06/2025.".to_string(),
                    published_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    source_link: "https://funebres.eldia.com/edis/20240101/funebres2.htm".to_string(),
                },
                "f6524f",
            )
            .unwrap();
        (repo, notice)
    }

    #[test]
    fn test_canonical_permalink_is_found() {
        let (repo, notice) = repo_with("María José González-López");

        let got = resolve(&repo, BASE_PATH, "2024-01-01", "maria-jose-gonzalez-lopez-f6524f").unwrap();
        assert_eq!(got, Resolution::Found(notice.clone()));

        let got = resolve(&repo, BASE_PATH, "2024-01-01", "Maria-Jose-Gonzalez-Lopez-F6524F").unwrap();
        assert_eq!(got, Resolution::Found(notice));
    }

    #[test]
    fn test_wrong_slug_redirects_permanently() {
        let (repo, _) = repo_with("JOHN DOE");

        for stale in ["wrong-name-f6524f", "x-f6524f", "-f6524f"] {
            let got = resolve(&repo, BASE_PATH, "2024-01-01", stale).unwrap();
            assert_eq!(
                got,
                Resolution::Redirect {
                    location: "/funeral-notices/2024-01-01/john-doe-f6524f".into(),
                    status: 301,
                },
                "for {stale}"
            );
        }
    }

    #[test]
    fn test_unresolvable_requests_are_not_found() {
        let (repo, _) = repo_with("JOHN DOE");

        let cases = [
            ("", "john-doe-f6524f"),
            ("2024-01-01", ""),
            ("2024-01-01", "invalidhash"),
            ("invalid-date", "john-doe-f6524f"),
            ("2024-13-45", "john-doe-f6524f"),
            ("2024-01-02", "john-doe-f6524f"),
            ("2024-01-01", "non-existent-person-abc789"),
            ("2024-01-01", "john-doe-xyz789"),
        ];
        for (date, name_hash) in cases {
            assert_eq!(
                resolve(&repo, BASE_PATH, date, name_hash).unwrap(),
                Resolution::NotFound,
                "for {date}/{name_hash}"
            );
        }
    }

    #[test]
    fn test_sitemap_lists_home_index_pages_and_notices() {
        let (repo, _) = repo_with("JOHN DOE");
        let notices = repo.all_notices().unwrap();
        let site = SiteConfig {
            host: "https://funebres.enlaplata.com.ar/".into(),
            ..SiteConfig::default()
        };

        let xml = build_sitemap(&site, &notices).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#));
        assert_eq!(xml.matches("<url>").count(), 3);
        assert!(xml.contains("<loc>https://funebres.enlaplata.com.ar/</loc>"));
        assert!(xml.contains("<loc>https://funebres.enlaplata.com.ar/funeral-notices?page=1</loc>"));
        assert!(xml.contains(
            "<loc>https://funebres.enlaplata.com.ar/funeral-notices/2024-01-01/john-doe-f6524f</loc>"
        ));
        assert!(xml.contains("<changefreq>monthly</changefreq>"));
        assert!(xml.contains("<priority>0.6</priority>"));
        assert_eq!(xml.matches("<lastmod>").count(), 1);
    }

    #[test]
    fn test_sitemap_index_page_count() {
        let (_, notice) = repo_with("JOHN DOE");
        let site = SiteConfig::default();

        let xml = build_sitemap(&site, &[]).unwrap();
        assert_eq!(xml.matches("<url>").count(), 1);

        let many = vec![notice; 41];
        let xml = build_sitemap(&site, &many).unwrap();
        assert!(xml.contains("?page=3</loc>"));
        assert!(!xml.contains("?page=4</loc>"));
    }
}
