use search_core::memory::MemoryStore;
use search_core::ranking::{idf, term_score, CorpusStats};
use search_core::tokenizer::keywords;
use search_core::DocumentIndex;

const K1: f64 = 1.6;

fn bm25(idf: f64, f: f64, dl: f64, avgdl: f64) -> f64 {
    idf * f * (K1 + 1.0) / (f + K1 * (0.25 + 0.75 * dl / avgdl))
}

/// Two documents: "apple" in both (3 and 1 times), "banana" only in the first (twice).
fn fruit_index() -> MemoryStore {
    let store = MemoryStore::new();
    store.upsert("http://fruit.test/a/", "apple apple apple banana banana pear").unwrap();
    store.upsert("http://fruit.test/b/", "apple kiwi kiwi kiwi").unwrap();
    store
}

#[test]
fn apple_banana_scenario_matches_formula() {
    let store = fruit_index();
    let query = keywords("apple banana");
    let stats = CorpusStats::collect(&store, &query).unwrap();

    assert_eq!(stats.num_candidates(), 2);
    assert_eq!(stats.keywords["apple"].doc_freq, 2);
    assert_eq!(stats.keywords["banana"].doc_freq, 1);
    assert!((stats.keywords["apple"].idf - (0.5f64 / 2.5).ln()).abs() < 1e-12);
    assert!((stats.keywords["banana"].idf - (1.5f64 / 1.5).ln()).abs() < 1e-12);
    assert!((stats.avgdl - 5.0).abs() < 1e-12);

    let idf_apple = (0.5f64 / 2.5).ln();
    let idf_banana = 0.0;
    let expected_a = bm25(idf_apple, 3.0, 6.0, 5.0) + bm25(idf_banana, 2.0, 6.0, 5.0);
    let expected_b = bm25(idf_apple, 1.0, 4.0, 5.0);
    assert!((stats.score("http://fruit.test/a/", &query, K1) - expected_a).abs() < 1e-12);
    assert!((stats.score("http://fruit.test/b/", &query, K1) - expected_b).abs() < 1e-12);

    let ranked = stats.rank(&query, K1);
    let order: Vec<&str> = ranked.iter().map(|(id, _)| id.as_str()).collect();
    let mut by_formula = vec![("http://fruit.test/a/", expected_a), ("http://fruit.test/b/", expected_b)];
    by_formula.sort_by(|x, y| y.1.partial_cmp(&x.1).unwrap());
    assert_eq!(order, by_formula.iter().map(|(id, _)| *id).collect::<Vec<_>>());
}

#[test]
fn no_candidates_means_zero_avgdl_and_idf() {
    let store = fruit_index();
    let query = keywords("durian");
    let stats = CorpusStats::collect(&store, &query).unwrap();
    assert_eq!(stats.num_candidates(), 0);
    assert_eq!(stats.avgdl, 0.0);
    assert_eq!(stats.keywords["durian"].idf, 0.0);
    assert!(stats.rank(&query, K1).is_empty());
}

#[test]
fn idf_is_zero_only_without_evidence() {
    assert_eq!(idf(0, 0), 0.0);
    assert_eq!(idf(5, 0), 0.0);
    assert!(idf(5, 1) > 0.0);
    assert!((idf(2, 2) - (0.5f64 / 2.5).ln()).abs() < 1e-12);
}

#[test]
fn longer_documents_score_lower() {
    let idf = idf(10, 1);
    let mut previous = f64::INFINITY;
    for len in [5u32, 10, 20, 40, 80] {
        let s = term_score(idf, 3, len, 20.0, K1);
        assert!(s < previous, "score for length {len} should drop");
        previous = s;
    }
}

#[test]
fn repeated_keywords_weigh_more() {
    let store = MemoryStore::new();
    for (i, body) in ["rust rust", "go", "java", "zig"].iter().enumerate() {
        store.upsert(&format!("http://lang.test/{i}/"), &format!("{body} lang")).unwrap();
    }
    let once = keywords("rust lang");
    let twice = keywords("rust rust lang");
    let s1 = CorpusStats::collect(&store, &once).unwrap();
    let s2 = CorpusStats::collect(&store, &twice).unwrap();
    assert!(s2.score("http://lang.test/0/", &twice, K1) > s1.score("http://lang.test/0/", &once, K1));
}
