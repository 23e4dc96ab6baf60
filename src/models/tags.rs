//! Tag set attached to journal entries.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator used when tags cross the persistence boundary.
pub const TAG_SEPARATOR: char = ',';

/// Set of non-empty, trimmed tags.
///
/// Membership ignores order, but insertion order is kept for display.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag. Blank input and duplicates are ignored.
    pub fn insert(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.contains(tag) {
            return false;
        }
        self.0.push(tag.to_string());
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        let tag = tag.trim();
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tags that would not survive a round trip through [`Tags::to_csv`].
    pub fn unstorable(&self) -> Vec<&str> {
        self.iter().filter(|t| t.contains(TAG_SEPARATOR)).collect()
    }

    /// Join for storage.
    pub fn to_csv(&self) -> String {
        self.0.join(&TAG_SEPARATOR.to_string())
    }

    /// Split a stored column. Tokens are trimmed and empty ones dropped.
    pub fn from_csv(raw: &str) -> Self {
        raw.split(TAG_SEPARATOR).collect()
    }

    pub fn as_set(&self) -> BTreeSet<&str> {
        self.iter().collect()
    }
}

impl PartialEq for Tags {
    fn eq(&self, other: &Self) -> bool {
        self.as_set() == other.as_set()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = Tags::new();
        for tag in iter {
            tags.insert(tag.as_ref());
        }
        tags
    }
}

impl From<Vec<String>> for Tags {
    fn from(values: Vec<String>) -> Self {
        values.into_iter().collect()
    }
}

impl From<Tags> for Vec<String> {
    fn from(tags: Tags) -> Self {
        tags.0
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_round_trip_ignores_order_and_whitespace() {
        let tags: Tags = ["theta", "earnings"].into_iter().collect();
        let parsed = Tags::from_csv(" theta , earnings ");
        assert_eq!(parsed, tags);
        assert_eq!(Tags::from_csv(&tags.to_csv()), tags);

        let reversed: Tags = ["earnings", "theta"].into_iter().collect();
        assert_eq!(reversed, tags);
    }

    #[test]
    fn test_blank_tokens_are_dropped() {
        let tags = Tags::from_csv(",, ,#test,");
        assert_eq!(tags.len(), 1);
        assert!(tags.contains("#test"));
        assert!(Tags::from_csv("").is_empty());
    }

    #[test]
    fn test_duplicates_collapse_and_order_is_kept_for_display() {
        let tags: Tags = ["b", "a", " b "].into_iter().collect();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.to_string(), "b, a");
        assert_eq!(tags.to_csv(), "b,a");
    }

    #[test]
    fn test_unstorable_tags() {
        let mut tags = Tags::new();
        tags.insert("a,b");
        assert_eq!(tags.unstorable(), vec!["a,b"]);
    }

    #[test]
    fn test_serde_as_list() {
        let tags: Tags = serde_json::from_str(r#"[" theta", "", "earnings"]"#).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(serde_json::to_string(&tags).unwrap(), r#"["theta","earnings"]"#);
    }
}
