//! sled-backed storage. One database directory holds every tree:
//! `pages`, `metadata`, `documents`, `postings`, `results` and `models`.

use crate::recommend::{ModelRecord, MODEL_VERSION};
use crate::store::{DocumentIndex, ModelStore, PageStore, ResultCache, StoreError, StoreResult};
use crate::tokenizer::term_counts;
use crate::{now_unix, CachedPage, PageMetadata, Posting, RankedResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Transactional, Tree};
use std::path::{Path, PathBuf};

const TERM_SEPARATOR: u8 = 0;

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn database(&self) -> PathBuf { self.root.join("store.sled") }
}

#[derive(Serialize, Deserialize)]
struct StoredDocument {
    content: String,
    length: u32,
    terms: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct StoredResults {
    expires_at: i64,
    results: Vec<RankedResult>,
}

pub struct SledStore {
    db: sled::Db,
    pages: Tree,
    metadata: Tree,
    documents: Tree,
    postings: Tree,
    results: Tree,
    models: Tree,
}

impl SledStore {
    pub fn open(paths: &IndexPaths) -> StoreResult<Self> {
        std::fs::create_dir_all(&paths.root).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let db = sled::open(paths.database())?;
        Ok(Self {
            pages: db.open_tree("pages")?,
            metadata: db.open_tree("metadata")?,
            documents: db.open_tree("documents")?,
            postings: db.open_tree("postings")?,
            results: db.open_tree("results")?,
            models: db.open_tree("models")?,
            db,
        })
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Corrupt { key: key.to_string(), message: e.to_string() })
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corrupt { key: key.to_string(), message: e.to_string() })
}

fn posting_key(term: &str, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(term.len() + id.len() + 1);
    key.extend_from_slice(term.as_bytes());
    key.push(TERM_SEPARATOR);
    key.extend_from_slice(id.as_bytes());
    key
}

fn flatten(e: TransactionError<StoreError>) -> StoreError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    }
}

impl SledStore {
    /// The fresh cached page for `url`; an expired or missing body takes its metadata with it.
    fn fresh_page(&self, url: &str) -> StoreResult<Option<CachedPage>> {
        if let Some(bytes) = self.pages.get(url)? {
            let page: CachedPage = decode(url, &bytes)?;
            if page.is_fresh_at(now_unix()) {
                return Ok(Some(page));
            }
        }
        if self.pages.contains_key(url)? || self.metadata.contains_key(url)? {
            self.invalidate(url)?;
        }
        Ok(None)
    }
}

impl PageStore for SledStore {
    fn get(&self, url: &str) -> StoreResult<Option<String>> {
        Ok(self.fresh_page(url)?.map(|page| page.body))
    }

    fn set(&self, url: &str, body: &str, ttl_secs: u64) -> StoreResult<()> {
        let bytes = encode(url, &CachedPage::new(url, body, ttl_secs))?;
        self.pages.insert(url, bytes)?;
        Ok(())
    }

    fn get_metadata(&self, url: &str) -> StoreResult<Option<PageMetadata>> {
        if self.fresh_page(url)?.is_none() {
            return Ok(None);
        }
        self.metadata.get(url)?.map(|bytes| decode(url, &bytes)).transpose()
    }

    fn set_metadata(&self, metadata: &PageMetadata) -> StoreResult<()> {
        let bytes = encode(&metadata.url, metadata)?;
        self.metadata.insert(metadata.url.as_str(), bytes)?;
        Ok(())
    }

    fn delete(&self, url: &str) -> StoreResult<()> {
        self.pages.remove(url)?;
        Ok(())
    }

    fn delete_metadata(&self, url: &str) -> StoreResult<()> {
        self.metadata.remove(url)?;
        Ok(())
    }

    fn scan_metadata_keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for key in self.metadata.iter().keys() {
            let url = String::from_utf8_lossy(&key?).into_owned();
            if self.fresh_page(&url)?.is_some() {
                keys.push(url);
            }
        }
        Ok(keys)
    }

    fn invalidate(&self, url: &str) -> StoreResult<()> {
        (&self.pages, &self.metadata)
            .transaction(|(pages, metadata)| {
                pages.remove(url)?;
                metadata.remove(url)?;
                Ok::<_, ConflictableTransactionError<StoreError>>(())
            })
            .map_err(flatten)
    }
}

impl DocumentIndex for SledStore {
    fn upsert(&self, id: &str, content: &str) -> StoreResult<()> {
        let (counts, length) = term_counts(content);
        let mut postings: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(counts.len());
        for (term, tf) in &counts {
            postings.push((posting_key(term, id), encode(id, &(*tf, length))?));
        }
        let doc = StoredDocument { content: content.to_string(), length, terms: counts.into_keys().collect() };
        let doc_bytes = encode(id, &doc)?;

        (&self.documents, &self.postings)
            .transaction(|(documents, tx_postings)| {
                if let Some(old) = documents.get(id)? {
                    let old: StoredDocument = decode(id, &old).map_err(ConflictableTransactionError::Abort)?;
                    for term in &old.terms {
                        tx_postings.remove(posting_key(term, id))?;
                    }
                }
                for (key, value) in &postings {
                    tx_postings.insert(key.as_slice(), value.as_slice())?;
                }
                documents.insert(id, doc_bytes.as_slice())?;
                Ok::<_, ConflictableTransactionError<StoreError>>(())
            })
            .map_err(flatten)
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        (&self.documents, &self.postings)
            .transaction(|(documents, tx_postings)| {
                if let Some(old) = documents.remove(id)? {
                    let old: StoredDocument = decode(id, &old).map_err(ConflictableTransactionError::Abort)?;
                    for term in &old.terms {
                        tx_postings.remove(posting_key(term, id))?;
                    }
                }
                Ok::<_, ConflictableTransactionError<StoreError>>(())
            })
            .map_err(flatten)
    }

    fn query(&self, term: &str) -> StoreResult<Vec<Posting>> {
        let mut prefix = term.as_bytes().to_vec();
        prefix.push(TERM_SEPARATOR);
        let mut out = Vec::new();
        for entry in self.postings.scan_prefix(&prefix) {
            let (key, value) = entry?;
            let document_id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            let (term_frequency, document_length): (u32, u32) = decode(&document_id, &value)?;
            out.push(Posting { document_id, term_frequency, document_length });
        }
        Ok(out)
    }

    fn get(&self, id: &str) -> StoreResult<Option<String>> {
        match self.documents.get(id)? {
            Some(bytes) => Ok(Some(decode::<StoredDocument>(id, &bytes)?.content)),
            None => Ok(None),
        }
    }

    fn document_ids(&self) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for key in self.documents.iter().keys() {
            ids.push(String::from_utf8_lossy(&key?).into_owned());
        }
        Ok(ids)
    }
}

impl ResultCache for SledStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<RankedResult>>> {
        let Some(bytes) = self.results.get(key)? else { return Ok(None) };
        let stored: StoredResults = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt { key: key.to_string(), message: e.to_string() })?;
        if now_unix() < stored.expires_at {
            Ok(Some(stored.results))
        } else {
            self.results.remove(key)?;
            Ok(None)
        }
    }

    fn set(&self, key: &str, results: &[RankedResult], ttl_secs: u64) -> StoreResult<()> {
        let stored = StoredResults {
            expires_at: now_unix().saturating_add(ttl_secs.max(1) as i64),
            results: results.to_vec(),
        };
        let bytes = serde_json::to_vec(&stored)
            .map_err(|e| StoreError::Corrupt { key: key.to_string(), message: e.to_string() })?;
        self.results.insert(key, bytes)?;
        Ok(())
    }
}

impl ModelStore for SledStore {
    fn get(&self, profile_id: i64) -> StoreResult<Option<ModelRecord>> {
        let key = profile_id.to_be_bytes();
        let Some(bytes) = self.models.get(key)? else { return Ok(None) };
        let record: ModelRecord = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt { key: profile_id.to_string(), message: e.to_string() })?;
        if record.version != MODEL_VERSION {
            tracing::warn!(profile_id, version = record.version, "ignoring model with unknown version");
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn set(&self, record: &ModelRecord) -> StoreResult<()> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| StoreError::Corrupt { key: record.profile_id.to_string(), message: e.to_string() })?;
        self.models.insert(record.profile_id.to_be_bytes(), bytes)?;
        Ok(())
    }
}
