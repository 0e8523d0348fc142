//! Per-profile recommendation model: a TF-IDF vectorizer fitted over the
//! profile's past queries, the flattened (query, visited URL) training rows,
//! their fitted vectors and their pairwise cosine similarity.

use crate::store::{ModelStore, StoreError};
use crate::tokenizer::keywords;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;

/// Bumped whenever the persisted layout changes; older records read as absent.
pub const MODEL_VERSION: u32 = 2;

pub type SparseVector = BTreeMap<usize, f64>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorizerParams {
    pub vocabulary: BTreeMap<String, usize>,
    /// Smoothed idf, `ln((1 + n) / (1 + df)) + 1`, indexed by vocabulary slot.
    pub idf: Vec<f64>,
}

impl VectorizerParams {
    pub fn fit<S: AsRef<str>>(docs: &[S]) -> Self {
        let mut vocabulary: BTreeMap<String, usize> = BTreeMap::new();
        let mut df: Vec<u32> = Vec::new();
        for doc in docs {
            let unique: HashSet<String> = keywords(doc.as_ref()).into_iter().collect();
            for term in unique {
                let next = vocabulary.len();
                let slot = *vocabulary.entry(term).or_insert(next);
                if slot == df.len() {
                    df.push(0);
                }
                df[slot] += 1;
            }
        }
        let n = docs.len() as f64;
        let idf = df.iter().map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0).collect();
        Self { vocabulary, idf }
    }

    /// L2-normalized TF-IDF vector; terms outside the vocabulary are ignored.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut tf: HashMap<usize, f64> = HashMap::new();
        for term in keywords(text) {
            if let Some(&slot) = self.vocabulary.get(&term) {
                *tf.entry(slot).or_insert(0.0) += 1.0;
            }
        }
        let mut vector: SparseVector = tf.into_iter().map(|(slot, f)| (slot, f * self.idf[slot])).collect();
        let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for w in vector.values_mut() {
                *w /= norm;
            }
        }
        vector
    }
}

/// Dot product of two L2-normalized vectors.
pub fn cosine(a: &SparseVector, b: &SparseVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.iter().filter_map(|(slot, w)| large.get(slot).map(|v| w * v)).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub query: String,
    pub visited_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub version: u32,
    pub profile_id: i64,
    pub trained_at: String,
    pub vectorizer: VectorizerParams,
    pub training: Vec<TrainingRow>,
    pub similarity: Vec<Vec<f64>>,
    /// One vector per training row, so lookups only transform the incoming query.
    #[serde(default)]
    pub vectors: Vec<SparseVector>,
}

impl ModelRecord {
    /// Fit a model from `(query, visited urls)` pairs. `None` when no query has a visited URL.
    pub fn fit<'a, I>(profile_id: i64, queries: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let training: Vec<TrainingRow> = queries
            .into_iter()
            .flat_map(|(query, urls)| {
                urls.iter().map(move |url| TrainingRow { query: query.to_string(), visited_url: url.clone() })
            })
            .collect();
        if training.is_empty() {
            return None;
        }

        let bodies: Vec<&str> = training.iter().map(|row| row.query.as_str()).collect();
        let vectorizer = VectorizerParams::fit(&bodies);
        let vectors: Vec<SparseVector> = bodies.iter().map(|b| vectorizer.transform(b)).collect();
        let similarity = vectors.iter().map(|a| vectors.iter().map(|b| cosine(a, b)).collect()).collect();

        Some(Self {
            version: MODEL_VERSION,
            profile_id,
            trained_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            vectorizer,
            training,
            similarity,
            vectors,
        })
    }

    /// URLs visited after the `top_n` training queries most similar to `query`,
    /// deduplicated in similarity order. Rows with no term overlap are skipped.
    pub fn recommend(&self, query: &str, top_n: usize) -> Vec<String> {
        let target = self.vectorizer.transform(query);
        let mut scored: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, row)| (i, cosine(&target, row)))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));

        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for (i, _) in scored.into_iter().take(top_n) {
            let Some(row) = self.training.get(i) else { continue };
            if seen.insert(row.visited_url.clone()) {
                urls.push(row.visited_url.clone());
            }
        }
        urls.truncate(top_n);
        urls
    }
}

#[derive(Debug, Error)]
pub enum RecommendationError {
    #[error("model store: {0}")]
    Store(#[from] StoreError),

    #[error("recommendation backend: {0}")]
    Backend(String),
}

/// Query-time lookup against whatever produced the per-profile models.
#[async_trait]
pub trait Recommender: Send + Sync {
    /// Must return an empty list, not an error, when the profile has no model yet.
    async fn recommend(&self, profile_id: i64, query: &str, top_n: usize) -> Result<Vec<String>, RecommendationError>;
}

/// Serves recommendations from models persisted by the trainer.
pub struct StoredModelRecommender {
    models: Arc<dyn ModelStore>,
}

impl StoredModelRecommender {
    pub fn new(models: Arc<dyn ModelStore>) -> Self {
        Self { models }
    }
}

#[async_trait]
impl Recommender for StoredModelRecommender {
    async fn recommend(&self, profile_id: i64, query: &str, top_n: usize) -> Result<Vec<String>, RecommendationError> {
        Ok(self.models.get(profile_id)?.map(|m| m.recommend(query, top_n)).unwrap_or_default())
    }
}
