use serde::{Deserialize, Serialize};

/// Documents are keyed by the URL they were fetched from.
pub type DocId = String;

/// A term hit inside one document, as returned by a per-term index lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub document_id: DocId,
    pub term_frequency: u32,
    /// Length of the whole document in tokens.
    pub document_length: u32,
}

/// A cached page body. Reads treat the entry as absent once `fetched_at + ttl_secs` has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPage {
    pub url: String,
    pub body: String,
    pub ttl_secs: u64,
    pub fetched_at: i64,
}

impl CachedPage {
    pub fn new(url: &str, body: &str, ttl_secs: u64) -> Self {
        Self { url: url.to_string(), body: body.to_string(), ttl_secs: ttl_secs.max(1), fetched_at: now_unix() }
    }

    pub fn expires_at(&self) -> i64 {
        self.fetched_at.saturating_add(self.ttl_secs as i64)
    }

    pub fn is_fresh_at(&self, now: i64) -> bool {
        now < self.expires_at()
    }
}

/// Freshness metadata kept next to every cached body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub charset: String,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub id: DocId,
    pub url: String,
    pub content: String,
    pub score: f64,
}

pub fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
