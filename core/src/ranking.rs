//! Okapi BM25 over per-query candidate statistics.
//!
//! Statistics are aggregated from the postings of each query keyword and are
//! never persisted: the candidate set (documents with at least one hit) is
//! the collection that `N`, `df` and `avgdl` are measured against.

use crate::store::{DocumentIndex, StoreResult};
use crate::{DocId, Posting};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordStats {
    pub idf: f64,
    pub doc_freq: u32,
    pub freqs: HashMap<DocId, u32>,
}

#[derive(Debug, Clone, Default)]
pub struct CorpusStats {
    pub keywords: HashMap<String, KeywordStats>,
    /// Token length of every candidate document.
    pub doc_lengths: BTreeMap<DocId, u32>,
    pub avgdl: f64,
}

/// `ln((N - df + 0.5) / (df + 0.5))`, or 0 when there is nothing to weigh.
pub fn idf(num_docs: usize, doc_freq: u32) -> f64 {
    if num_docs == 0 || doc_freq == 0 {
        return 0.0;
    }
    let n = num_docs as f64;
    let df = doc_freq as f64;
    ((n - df + 0.5) / (df + 0.5)).ln()
}

/// Contribution of one keyword to a document's score.
pub fn term_score(idf: f64, freq: u32, doc_len: u32, avgdl: f64, k1: f64) -> f64 {
    if freq == 0 || avgdl <= 0.0 {
        return 0.0;
    }
    let f = freq as f64;
    idf * f * (k1 + 1.0) / (f + k1 * (0.25 + 0.75 * doc_len as f64 / avgdl))
}

impl CorpusStats {
    /// Merge per-keyword postings into candidate statistics.
    pub fn from_postings<'a, I>(postings: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Vec<Posting>)>,
    {
        let mut stats = CorpusStats::default();
        for (keyword, plist) in postings {
            let entry = stats.keywords.entry(keyword.to_string()).or_default();
            for p in plist {
                *entry.freqs.entry(p.document_id.clone()).or_insert(0) += p.term_frequency;
                stats.doc_lengths.insert(p.document_id, p.document_length);
            }
            entry.doc_freq = entry.freqs.len() as u32;
        }

        let n = stats.doc_lengths.len();
        if n > 0 {
            let total: u64 = stats.doc_lengths.values().map(|&l| l as u64).sum();
            stats.avgdl = total as f64 / n as f64;
        }
        for kw in stats.keywords.values_mut() {
            kw.idf = idf(n, kw.doc_freq);
        }
        stats
    }

    /// Look up every distinct keyword in the index and aggregate.
    pub fn collect(index: &dyn DocumentIndex, keywords: &[String]) -> StoreResult<Self> {
        let mut distinct: Vec<&str> = keywords.iter().map(String::as_str).collect();
        distinct.sort_unstable();
        distinct.dedup();
        let mut postings = Vec::with_capacity(distinct.len());
        for kw in distinct {
            postings.push((kw, index.query(kw)?));
        }
        Ok(Self::from_postings(postings))
    }

    pub fn num_candidates(&self) -> usize {
        self.doc_lengths.len()
    }

    /// BM25 score of one candidate. Repeated keywords count once per occurrence.
    pub fn score(&self, doc_id: &str, keywords: &[String], k1: f64) -> f64 {
        let doc_len = self.doc_lengths.get(doc_id).copied().unwrap_or(0);
        keywords
            .iter()
            .filter_map(|kw| self.keywords.get(kw))
            .map(|kw| {
                let f = kw.freqs.get(doc_id).copied().unwrap_or(0);
                term_score(kw.idf, f, doc_len, self.avgdl, k1)
            })
            .sum()
    }

    /// Every candidate with its score, best first (ties broken by id).
    pub fn rank(&self, keywords: &[String], k1: f64) -> Vec<(DocId, f64)> {
        let mut scored: Vec<(DocId, f64)> =
            self.doc_lengths.keys().map(|id| (id.clone(), self.score(id, keywords, k1))).collect();
        sort_by_score(&mut scored, |(_, s)| *s, |(id, _)| id.as_str());
        scored
    }
}

/// Descending by score, ascending by key on ties; NaN sorts as equal.
pub fn sort_by_score<T, S, K>(items: &mut [T], score: S, key: K)
where
    S: Fn(&T) -> f64,
    K: Fn(&T) -> &str,
{
    items.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| key(a).cmp(key(b)))
    });
}
