//! In-process storage backed by hash maps behind `parking_lot` locks.

use crate::recommend::ModelRecord;
use crate::store::{DocumentIndex, ModelStore, PageStore, ResultCache, StoreResult};
use crate::tokenizer::term_counts;
use crate::{now_unix, CachedPage, PageMetadata, Posting, RankedResult};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Pages {
    bodies: HashMap<String, CachedPage>,
    metadata: HashMap<String, PageMetadata>,
}

impl Pages {
    fn fresh(&self, url: &str, now: i64) -> Option<&CachedPage> {
        self.bodies.get(url).filter(|p| p.is_fresh_at(now))
    }

    /// Drops expired bodies together with their metadata, and metadata left without a body.
    fn purge_expired(&mut self, now: i64) {
        self.bodies.retain(|_, p| p.is_fresh_at(now));
        let bodies = &self.bodies;
        self.metadata.retain(|url, _| bodies.contains_key(url));
    }
}

struct IndexedDocument {
    content: String,
    length: u32,
    terms: HashMap<String, u32>,
}

#[derive(Default)]
struct Documents {
    docs: HashMap<String, IndexedDocument>,
    postings: HashMap<String, HashMap<String, u32>>,
}

/// Implements every storage contract; handy for tests and single-process setups.
#[derive(Default)]
pub struct MemoryStore {
    pages: RwLock<Pages>,
    documents: RwLock<Documents>,
    results: RwLock<HashMap<String, (i64, Vec<RankedResult>)>>,
    models: RwLock<HashMap<i64, ModelRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageStore for MemoryStore {
    fn get(&self, url: &str) -> StoreResult<Option<String>> {
        let now = now_unix();
        if let Some(page) = self.pages.read().fresh(url, now) {
            return Ok(Some(page.body.clone()));
        }
        let mut pages = self.pages.write();
        if pages.fresh(url, now).is_none() {
            pages.bodies.remove(url);
            pages.metadata.remove(url);
        }
        Ok(None)
    }

    fn set(&self, url: &str, body: &str, ttl_secs: u64) -> StoreResult<()> {
        self.pages.write().bodies.insert(url.to_string(), CachedPage::new(url, body, ttl_secs));
        Ok(())
    }

    fn get_metadata(&self, url: &str) -> StoreResult<Option<PageMetadata>> {
        let pages = self.pages.read();
        Ok(pages.fresh(url, now_unix()).and_then(|_| pages.metadata.get(url).cloned()))
    }

    fn set_metadata(&self, metadata: &PageMetadata) -> StoreResult<()> {
        self.pages.write().metadata.insert(metadata.url.clone(), metadata.clone());
        Ok(())
    }

    fn delete(&self, url: &str) -> StoreResult<()> {
        self.pages.write().bodies.remove(url);
        Ok(())
    }

    fn delete_metadata(&self, url: &str) -> StoreResult<()> {
        self.pages.write().metadata.remove(url);
        Ok(())
    }

    fn scan_metadata_keys(&self) -> StoreResult<Vec<String>> {
        let mut pages = self.pages.write();
        pages.purge_expired(now_unix());
        Ok(pages.metadata.keys().cloned().collect())
    }

    fn invalidate(&self, url: &str) -> StoreResult<()> {
        let mut pages = self.pages.write();
        pages.bodies.remove(url);
        pages.metadata.remove(url);
        Ok(())
    }
}

impl Documents {
    fn remove(&mut self, id: &str) {
        if let Some(old) = self.docs.remove(id) {
            for term in old.terms.keys() {
                if let Some(plist) = self.postings.get_mut(term) {
                    plist.remove(id);
                    if plist.is_empty() {
                        self.postings.remove(term);
                    }
                }
            }
        }
    }
}

impl DocumentIndex for MemoryStore {
    fn upsert(&self, id: &str, content: &str) -> StoreResult<()> {
        let (terms, length) = term_counts(content);
        let mut documents = self.documents.write();
        documents.remove(id);
        for (term, tf) in &terms {
            documents.postings.entry(term.clone()).or_default().insert(id.to_string(), *tf);
        }
        documents.docs.insert(id.to_string(), IndexedDocument { content: content.to_string(), length, terms });
        Ok(())
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        self.documents.write().remove(id);
        Ok(())
    }

    fn query(&self, term: &str) -> StoreResult<Vec<Posting>> {
        let documents = self.documents.read();
        let Some(plist) = documents.postings.get(term) else { return Ok(Vec::new()) };
        let mut postings: Vec<Posting> = plist
            .iter()
            .filter_map(|(doc_id, tf)| {
                documents.docs.get(doc_id).map(|doc| Posting {
                    document_id: doc_id.clone(),
                    term_frequency: *tf,
                    document_length: doc.length,
                })
            })
            .collect();
        postings.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(postings)
    }

    fn get(&self, id: &str) -> StoreResult<Option<String>> {
        Ok(self.documents.read().docs.get(id).map(|d| d.content.clone()))
    }

    fn document_ids(&self) -> StoreResult<Vec<String>> {
        let mut ids: Vec<String> = self.documents.read().docs.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl ResultCache for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<RankedResult>>> {
        let now = now_unix();
        Ok(self.results.read().get(key).filter(|(expires, _)| now < *expires).map(|(_, r)| r.clone()))
    }

    fn set(&self, key: &str, results: &[RankedResult], ttl_secs: u64) -> StoreResult<()> {
        let expires = now_unix().saturating_add(ttl_secs.max(1) as i64);
        self.results.write().insert(key.to_string(), (expires, results.to_vec()));
        Ok(())
    }
}

impl ModelStore for MemoryStore {
    fn get(&self, profile_id: i64) -> StoreResult<Option<ModelRecord>> {
        Ok(self.models.read().get(&profile_id).cloned())
    }

    fn set(&self, record: &ModelRecord) -> StoreResult<()> {
        self.models.write().insert(record.profile_id, record.clone());
        Ok(())
    }
}
