use crate::models::ParsedEntry;

/// Normalise a text run pulled out of the DOM.
/// "\n  JOHN&nbsp;DOE \n" → "JOHN DOE"
pub fn clean_text(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build an entry from raw name/body text; `None` when either side is blank.
pub fn to_entry(raw_name: &str, raw_content: &str) -> Option<ParsedEntry> {
    let full_name = clean_text(raw_name);
    let content = clean_text(raw_content);

    if full_name.is_empty() || content.is_empty() {
        return None;
    }

    Some(ParsedEntry { full_name, content })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  JOHN DOE \n"), "JOHN DOE");
        assert_eq!(clean_text("JOHN\u{a0}DOE"), "JOHN DOE");
        assert_eq!(clean_text("(Q.E.P.D.)\n\t  Falleció"), "(Q.E.P.D.) Falleció");
        assert_eq!(clean_text(" \u{a0} "), "");
    }

    #[test]
    fn test_to_entry_drops_blank_sides() {
        assert!(to_entry("JOHN DOE", "   ").is_none());
        assert!(to_entry("\n", "body").is_none());
        assert_eq!(
            to_entry(" JOHN DOE ", " body "),
            Some(ParsedEntry { full_name: "JOHN DOE".into(), content: "body".into() })
        );
    }
}
