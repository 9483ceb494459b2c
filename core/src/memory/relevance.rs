//! Keyword-overlap relevance filter.
//!
//! A record matches when its key (as a phrase) appears among the query tokens,
//! or when its value shares at least one non-stopword token with the query.
//! Matches are returned in insertion order; nothing is ranked.

use crate::traits::MemoryRecord;
use std::collections::HashSet;

pub const STOPWORDS: &[&str] = &[
    "what", "is", "the", "who", "to", "a", "an", "my", "of", "and", "i",
];

/// Lower-cases, drops punctuation and splits on whitespace. `_` and `-` act as
/// separators so that keys like `favorite_color` tokenize as two words.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            cleaned.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '_' || c == '-' {
            cleaned.push(' ');
        }
    }

    cleaned.split_whitespace().map(str::to_string).collect()
}

pub struct Query {
    tokens: HashSet<String>,
    keywords: HashSet<String>,
}

impl Query {
    pub fn new(query: &str) -> Self {
        let tokens: HashSet<String> = tokenize(query).into_iter().collect();
        let keywords = tokens
            .iter()
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .cloned()
            .collect();
        Self { tokens, keywords }
    }

    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if record.is_log_entry() {
            return false;
        }

        let key_tokens = tokenize(&record.key);
        if !key_tokens.is_empty() && key_tokens.iter().all(|t| self.tokens.contains(t)) {
            return true;
        }

        tokenize(&record.value)
            .iter()
            .any(|t| self.keywords.contains(t))
    }
}

pub fn filter(query: &str, records: Vec<MemoryRecord>) -> Vec<MemoryRecord> {
    let query = Query::new(query);
    records.into_iter().filter(|r| query.matches(r)).collect()
}
