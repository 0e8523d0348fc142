//! The query path: tokenize, consult the result cache, resolve the caller's
//! profile, rank candidates with BM25, merge recommendations, cache.
//!
//! Only the Document Index is allowed to fail a search. Profile Store,
//! recommender and result cache problems are logged and the search goes on
//! without them.

use crate::error::{QueryError, VisitError};
use search_core::config::RankingConfig;
use search_core::profile::{profile_key, ProfileInfo, ProfileStore};
use search_core::ranking::{sort_by_score, CorpusStats};
use search_core::recommend::Recommender;
use search_core::tokenizer::{canonical_key, keywords};
use search_core::urls::normalize_url;
use search_core::{DocumentIndex, RankedResult, ResultCache, StoreResult};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query_id: Option<i64>,
    pub pages: Vec<RankedResult>,
}

/// Who is searching, once the Profile Store has been consulted.
#[derive(Debug, Clone, Copy)]
struct Session {
    profile_id: i64,
    search_query_id: Option<i64>,
}

pub struct SearchService {
    index: Arc<dyn DocumentIndex>,
    results: Arc<dyn ResultCache>,
    profiles: Option<Arc<dyn ProfileStore>>,
    recommender: Option<Arc<dyn Recommender>>,
    config: RankingConfig,
}

impl SearchService {
    pub fn new(index: Arc<dyn DocumentIndex>, results: Arc<dyn ResultCache>, config: RankingConfig) -> Self {
        Self { index, results, profiles: None, recommender: None, config }
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn with_recommender(mut self, recommender: Arc<dyn Recommender>) -> Self {
        self.recommender = Some(recommender);
        self
    }

    pub async fn search(&self, text: &str, caller: Option<IpAddr>) -> Result<SearchResponse, QueryError> {
        let keywords = keywords(text);
        if keywords.is_empty() {
            return Err(QueryError::ClientInput("Query text has no searchable keywords".into()));
        }
        let key = canonical_key(&keywords);

        match self.results.get(&key) {
            Ok(Some(pages)) => {
                tracing::debug!(%key, hits = pages.len(), "result cache hit");
                return Ok(SearchResponse { search_query_id: None, pages });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%key, error = %e, "result cache lookup failed"),
        }

        let session = match caller {
            Some(ip) => self.open_session(text, ip).await,
            None => None,
        };

        let stats = CorpusStats::collect(self.index.as_ref(), &keywords)?;
        let mut pages = Vec::with_capacity(stats.num_candidates());
        for (id, score) in stats.rank(&keywords, self.config.k1) {
            if let Some(page) = self.page(&id, score)? {
                pages.push(page);
            }
        }

        if let Some(session) = session {
            self.merge_recommendations(session.profile_id, text, &mut pages).await;
        }
        sort_by_score(&mut pages, |p| p.score, |p| p.id.as_str());

        if let Err(e) = self.results.set(&key, &pages, self.config.result_ttl_secs) {
            tracing::warn!(%key, error = %e, "could not cache ranked results");
        }
        tracing::info!(%key, candidates = stats.num_candidates(), returned = pages.len(), "search served");
        Ok(SearchResponse { search_query_id: session.and_then(|s| s.search_query_id), pages })
    }

    /// Stored content of one document, for the doc endpoint.
    pub fn document(&self, id: &str) -> StoreResult<Option<String>> {
        self.index.get(id)
    }

    /// Record that the result `url` was opened for a previously returned query.
    pub async fn record_visit(&self, search_query_id: i64, url: &str) -> Result<(), VisitError> {
        let profiles = self.profiles.as_ref().ok_or(VisitError::NotConfigured)?;
        let url = normalize_url(url)?;
        profiles.append_visited_url(search_query_id, &url).await?;
        tracing::info!(search_query_id, %url, "visit recorded");
        Ok(())
    }

    fn page(&self, id: &str, score: f64) -> StoreResult<Option<RankedResult>> {
        let content = self.index.get(id)?;
        if content.is_none() {
            tracing::debug!(id, "candidate disappeared from the index while ranking");
        }
        Ok(content.map(|content| RankedResult { id: id.to_string(), url: id.to_string(), content, score }))
    }

    /// Find or create the caller's profile and record the query against it.
    async fn open_session(&self, text: &str, ip: IpAddr) -> Option<Session> {
        let profiles = self.profiles.as_ref()?;
        let key = profile_key(ip);
        let profile_id = match profiles.fetch_profile(&key).await {
            Ok(Some(profile)) => profile.id,
            Ok(None) => match profiles.create_profile(&key, &ProfileInfo::new()).await {
                Ok(id) => {
                    tracing::info!(profile = %key, id, "created profile");
                    id
                }
                Err(e) => {
                    tracing::warn!(profile = %key, error = %e, "could not create profile");
                    return None;
                }
            },
            Err(e) => {
                tracing::warn!(profile = %key, error = %e, "profile lookup failed");
                return None;
            }
        };

        let search_query_id = match profiles.create_search_query(profile_id, text, &[]).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(profile_id, error = %e, "could not record search query");
                None
            }
        };
        Some(Session { profile_id, search_query_id })
    }

    async fn merge_recommendations(&self, profile_id: i64, text: &str, pages: &mut Vec<RankedResult>) {
        let Some(recommender) = &self.recommender else { return };
        let urls = match recommender.recommend(profile_id, text, self.config.recommendation_top_n).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!(profile_id, error = %e, "recommendations unavailable");
                return;
            }
        };
        for url in urls {
            if pages.iter().any(|p| p.id == url) {
                continue;
            }
            match self.page(&url, self.config.recommendation_score) {
                Ok(Some(page)) => pages.push(page),
                Ok(None) => {}
                Err(e) => tracing::warn!(%url, error = %e, "skipping recommended page"),
            }
        }
    }
}
