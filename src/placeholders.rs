//! Placeholder classification – splits a flat list of [`ContentEntry`] values
//! into typed lookup tables keyed by the token as it appears in a template.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::{ContentEntry, ContentType, ParentBody};

/// Token pattern recognised in Word paragraph text: braces around ASCII
/// letters only.
pub const WORD_TOKEN_PATTERN: &str = r"\{[a-zA-Z]+\}";

/// Compiled [`WORD_TOKEN_PATTERN`].
pub fn word_token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(WORD_TOKEN_PATTERN).expect("token pattern is valid"))
}

/// How placeholder names are wrapped into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// `{Name}` – Word templates.
    Single,
    /// `{{Name}}` – HTML templates.
    Double,
}

impl Delimiter {
    pub fn wrap(self, name: &str) -> String {
        match self {
            Delimiter::Single => format!("{{{name}}}"),
            Delimiter::Double => format!("{{{{{name}}}}}"),
        }
    }
}

// ---------------------------------------------------------------------------
// PlaceholderMap
// ---------------------------------------------------------------------------

/// Token → replacement lookup that remembers insertion order and keeps the
/// first value inserted for a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the key is already present. Returns whether it was added.
    pub fn insert(&mut self, token: String, value: String) -> bool {
        if self.index.contains_key(&token) {
            return false;
        }
        self.index.insert(token.clone(), self.entries.len());
        self.entries.push((token, value));
        true
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.index
            .get(token)
            .map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// The three lookup tables derived from a request's placeholder entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedPlaceholders {
    /// Body text, keyed by the delimited token.
    pub body_text: PlaceholderMap,
    /// Table cell text, keyed by the delimited token.
    pub table_text: PlaceholderMap,
    /// Body images, keyed by the raw placeholder name (matched against a
    /// drawing's name property rather than inline text).
    pub body_image: PlaceholderMap,
}

/// Partition `entries` into typed lookup tables. Duplicate keys keep their
/// first value; entries with an empty name and image entries inside tables
/// are dropped.
pub fn classify(entries: &[ContentEntry], delimiter: Delimiter) -> ClassifiedPlaceholders {
    let mut maps = ClassifiedPlaceholders::default();

    for entry in entries {
        if entry.placeholder.is_empty() {
            log::warn!("Ignoring placeholder entry with an empty name");
            continue;
        }

        let added = match (entry.parent_body, entry.content_type) {
            (ParentBody::None, ContentType::Text) => maps
                .body_text
                .insert(delimiter.wrap(&entry.placeholder), entry.content.clone()),
            (ParentBody::Table, ContentType::Text) => maps
                .table_text
                .insert(delimiter.wrap(&entry.placeholder), entry.content.clone()),
            (ParentBody::None, ContentType::Image) => maps
                .body_image
                .insert(entry.placeholder.clone(), entry.content.clone()),
            (ParentBody::Table, ContentType::Image) => {
                log::debug!(
                    "Image placeholder '{}' inside a table is not supported; ignoring",
                    entry.placeholder
                );
                continue;
            }
        };

        if !added {
            log::debug!("Duplicate placeholder '{}' ignored", entry.placeholder);
        }
    }

    maps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_land_in_their_partition() {
        let entries = vec![
            ContentEntry::text("Name", "Ada"),
            ContentEntry::table_text("Qty", "5"),
            ContentEntry::image("Logo", "https://example.com/logo.png"),
        ];
        let maps = classify(&entries, Delimiter::Single);

        assert_eq!(maps.body_text.get("{Name}"), Some("Ada"));
        assert_eq!(maps.table_text.get("{Qty}"), Some("5"));
        assert_eq!(maps.body_image.get("Logo"), Some("https://example.com/logo.png"));
        assert_eq!(maps.body_text.len() + maps.table_text.len() + maps.body_image.len(), 3);
    }

    #[test]
    fn first_duplicate_wins() {
        let entries = vec![
            ContentEntry::text("Name", "first"),
            ContentEntry::text("Name", "second"),
        ];
        let maps = classify(&entries, Delimiter::Single);
        assert_eq!(maps.body_text.len(), 1);
        assert_eq!(maps.body_text.get("{Name}"), Some("first"));
    }

    #[test]
    fn same_name_in_different_partitions_is_kept() {
        let entries = vec![
            ContentEntry::text("Total", "body"),
            ContentEntry::table_text("Total", "cell"),
        ];
        let maps = classify(&entries, Delimiter::Single);
        assert_eq!(maps.body_text.get("{Total}"), Some("body"));
        assert_eq!(maps.table_text.get("{Total}"), Some("cell"));
    }

    #[test]
    fn double_delimiter_wraps_twice() {
        let maps = classify(&[ContentEntry::text("Title", "Report")], Delimiter::Double);
        assert_eq!(maps.body_text.get("{{Title}}"), Some("Report"));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let entries = vec![
            ContentEntry::text("B", "2"),
            ContentEntry::text("A", "1"),
        ];
        let maps = classify(&entries, Delimiter::Single);
        let keys: Vec<&str> = maps.body_text.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["{B}", "{A}"]);
    }

    #[test]
    fn token_pattern_accepts_letters_only() {
        let re = word_token_regex();
        assert!(re.is_match("Dear {Name},"));
        assert!(!re.is_match("{Name1}"));
        assert!(!re.is_match("{first_name}"));
        assert!(!re.is_match("{}"));
    }
}
