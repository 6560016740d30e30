//! Search Parameters
//!
//! Immutable filter applied uniformly by every range scan behind a window.
//! Visibility flags only ever widen the result set; query terms narrow it.

use crate::record::ContentRecord;
use crate::types::Hid;
use std::fmt;

/// A single parsed query term
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryTerm {
    /// Bare word: matches name or any tag
    Text(String),
    Name(String),
    Tag(String),
    State(String),
    Extension(String),
    HidGreater(Hid),
    HidLess(Hid),
}

impl QueryTerm {
    fn matches(&self, record: &ContentRecord) -> bool {
        match self {
            QueryTerm::Text(needle) => {
                contains(record.name.as_deref(), needle)
                    || record.tags.iter().any(|t| contains(Some(t), needle))
            }
            QueryTerm::Name(needle) => contains(record.name.as_deref(), needle),
            QueryTerm::Tag(needle) => record.tags.iter().any(|t| tag_matches(t, needle)),
            QueryTerm::State(state) => record.state.eq_ignore_ascii_case(state),
            QueryTerm::Extension(ext) => record
                .extension
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(ext)),
            QueryTerm::HidGreater(hid) => record.hid > *hid,
            QueryTerm::HidLess(hid) => record.hid < *hid,
        }
    }
}

impl fmt::Display for QueryTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryTerm::Text(v) => write!(f, "{}", v),
            QueryTerm::Name(v) => write!(f, "name:{}", v),
            QueryTerm::Tag(v) => write!(f, "tag:{}", v),
            QueryTerm::State(v) => write!(f, "state:{}", v),
            QueryTerm::Extension(v) => write!(f, "extension:{}", v),
            QueryTerm::HidGreater(v) => write!(f, "hid>{}", v),
            QueryTerm::HidLess(v) => write!(f, "hid<{}", v),
        }
    }
}

/// Needles are stored lowercased.
fn contains(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

/// `name:foo` tags also match the `#foo` shorthand.
fn tag_matches(tag: &str, needle: &str) -> bool {
    let tag = tag.to_lowercase();
    tag.contains(needle) || tag.strip_prefix("name:").is_some_and(|t| t.contains(needle))
}

/// SearchParams: visibility flags plus free-text query
///
/// Value object. Setters consume and return a new instance so a changed
/// filter can be detected with `==`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SearchParams {
    show_deleted: bool,
    show_hidden: bool,
    terms: Vec<QueryTerm>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse filter text such as `deleted:any tag:raw hid>10 bowtie`.
    pub fn parse(text: &str) -> Self {
        let mut params = Self::default();
        for token in text.split_whitespace() {
            let lowered = token.to_lowercase();
            if let Some(v) = lowered.strip_prefix("hid>") {
                if let Ok(hid) = v.parse() {
                    params.terms.push(QueryTerm::HidGreater(hid));
                    continue;
                }
            }
            if let Some(v) = lowered.strip_prefix("hid<") {
                if let Ok(hid) = v.parse() {
                    params.terms.push(QueryTerm::HidLess(hid));
                    continue;
                }
            }
            if let Some(tag) = lowered.strip_prefix('#') {
                if !tag.is_empty() {
                    params.terms.push(QueryTerm::Tag(tag.to_string()));
                    continue;
                }
            }
            let term = match lowered.split_once(':') {
                Some(("deleted", v)) => {
                    params.show_deleted = matches!(v, "true" | "any");
                    continue;
                }
                Some(("visible", v)) => {
                    params.show_hidden = matches!(v, "false" | "any");
                    continue;
                }
                Some(("name", v)) if !v.is_empty() => QueryTerm::Name(v.to_string()),
                Some(("tag", v)) if !v.is_empty() => QueryTerm::Tag(v.to_string()),
                Some(("state", v)) if !v.is_empty() => QueryTerm::State(v.to_string()),
                Some(("extension", v)) if !v.is_empty() => QueryTerm::Extension(v.to_string()),
                _ => QueryTerm::Text(lowered),
            };
            params.terms.push(term);
        }
        params
    }

    pub fn with_show_deleted(mut self, show: bool) -> Self {
        self.show_deleted = show;
        self
    }

    pub fn with_show_hidden(mut self, show: bool) -> Self {
        self.show_hidden = show;
        self
    }

    /// Replace the query part, keeping the visibility flags.
    pub fn with_query(self, query: &str) -> Self {
        let parsed = Self::parse(query);
        Self {
            terms: parsed.terms,
            ..self
        }
    }

    pub fn show_deleted(&self) -> bool {
        self.show_deleted
    }

    pub fn show_hidden(&self) -> bool {
        self.show_hidden
    }

    pub fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }

    /// True iff `record` is visible under these settings.
    pub fn predicate(&self, record: &ContentRecord) -> bool {
        if record.is_deleted && !self.show_deleted {
            return false;
        }
        if record.is_hidden() && !self.show_hidden {
            return false;
        }
        self.terms.iter().all(|term| term.matches(record))
    }

    /// Canonical filter text; `parse(to_filter_text())` yields an equal value.
    pub fn to_filter_text(&self) -> String {
        let mut parts = Vec::with_capacity(self.terms.len() + 2);
        if self.show_deleted {
            parts.push("deleted:any".to_string());
        }
        if self.show_hidden {
            parts.push("visible:any".to_string());
        }
        parts.extend(self.terms.iter().map(ToString::to_string));
        parts.join(" ")
    }
}
