use crate::models::ParsedEntry;
use anyhow::Result;
use scraper::{ElementRef, Html, Selector};

use super::cleaner::to_entry;

// ── Listing page ──────────────────────────────────────────────────────────────

/// Each notice is `<li class="c">NAME<br><span>BODY</span></li>` inside
/// `<div class="grid_10 funebres">`.
const ENTRY_SELECTOR: &str = "div.grid_10.funebres li.c";
const BODY_SELECTOR: &str = "span";

/// A parsed daily listing page.
pub struct NoticePage {
    doc: Html,
    entry_sel: Selector,
    body_sel: Selector,
}

impl NoticePage {
    pub fn parse(html: &str) -> Result<Self> {
        let entry_sel = Selector::parse(ENTRY_SELECTOR)
            .map_err(|e| anyhow::anyhow!("entry selector: {:?}", e))?;
        let body_sel = Selector::parse(BODY_SELECTOR)
            .map_err(|e| anyhow::anyhow!("body selector: {:?}", e))?;

        Ok(Self {
            doc: Html::parse_document(html),
            entry_sel,
            body_sel,
        })
    }

    /// Entries in document order. Incomplete items are skipped; calling
    /// again starts over from the top of the page.
    pub fn entries(&self) -> impl Iterator<Item = ParsedEntry> + '_ {
        self.doc
            .select(&self.entry_sel)
            .filter_map(|li| self.extract(li))
    }

    fn extract(&self, li: ElementRef<'_>) -> Option<ParsedEntry> {
        let body = li.select(&self.body_sel).next()?;
        let content: String = body.text().collect();

        // Name is every text node of the item that is not under the body span.
        let full_name: String = li
            .descendants()
            .filter(|node| !node.ancestors().any(|a| a.id() == body.id()))
            .filter_map(|node| node.value().as_text().map(|t| &**t))
            .collect();

        to_entry(&full_name, &content)
    }
}
