//! Storage contracts shared by the crawler, the validator and the query path.
//!
//! The physical engines sit behind these traits; callers never see an
//! engine-specific error type, only [`StoreError`].

use crate::recommend::ModelRecord;
use crate::{PageMetadata, Posting, RankedResult};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt entry for {key}: {message}")]
    Corrupt { key: String, message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Key/value cache of page bodies plus per-URL freshness metadata.
pub trait PageStore: Send + Sync {
    /// Body of a fresh cached page, `None` when absent or expired.
    fn get(&self, url: &str) -> StoreResult<Option<String>>;

    fn set(&self, url: &str, body: &str, ttl_secs: u64) -> StoreResult<()>;

    fn get_metadata(&self, url: &str) -> StoreResult<Option<PageMetadata>>;

    fn set_metadata(&self, metadata: &PageMetadata) -> StoreResult<()>;

    fn delete(&self, url: &str) -> StoreResult<()>;

    fn delete_metadata(&self, url: &str) -> StoreResult<()>;

    fn exists(&self, url: &str) -> StoreResult<bool> {
        Ok(self.get(url)?.is_some())
    }

    /// URLs of every page that currently has metadata.
    fn scan_metadata_keys(&self) -> StoreResult<Vec<String>>;

    /// Drops body and metadata together.
    fn invalidate(&self, url: &str) -> StoreResult<()> {
        self.delete(url)?;
        self.delete_metadata(url)
    }
}

/// Full-text store keyed by document id (the page URL).
pub trait DocumentIndex: Send + Sync {
    /// Replaces the document wholesale, postings included.
    fn upsert(&self, id: &str, content: &str) -> StoreResult<()>;

    fn delete(&self, id: &str) -> StoreResult<()>;

    /// Postings for a single (already tokenized) term.
    fn query(&self, term: &str) -> StoreResult<Vec<Posting>>;

    fn get(&self, id: &str) -> StoreResult<Option<String>>;

    fn document_ids(&self) -> StoreResult<Vec<String>>;
}

/// Ranked results keyed by canonical query key.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<RankedResult>>>;

    fn set(&self, key: &str, results: &[RankedResult], ttl_secs: u64) -> StoreResult<()>;
}

/// Persisted per-profile recommendation models.
pub trait ModelStore: Send + Sync {
    fn get(&self, profile_id: i64) -> StoreResult<Option<ModelRecord>>;

    fn set(&self, record: &ModelRecord) -> StoreResult<()>;
}
