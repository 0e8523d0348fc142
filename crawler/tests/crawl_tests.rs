//! End-to-end crawl and validation runs against a wiremock site.

use crawler::{CacheValidator, CrawlState, Crawler, Fetcher};
use search_core::config::{CrawlConfig, ValidatorConfig};
use search_core::memory::MemoryStore;
use search_core::{DocumentIndex, PageMetadata, PageStore, StoreError, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> CrawlConfig {
    CrawlConfig {
        max_workers: 4,
        max_retries: 2,
        retry_backoff: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn html(status: u16, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_string(body.to_string()).insert_header("content-type", "text/html; charset=utf-8")
}

async fn serve(server: &MockServer, verb: &str, at: &str, response: ResponseTemplate) {
    Mock::given(method(verb)).and(path(at)).respond_with(response).mount(server).await;
}

fn crawler_for(store: &Arc<MemoryStore>) -> Crawler {
    let config = test_config();
    let fetcher = Fetcher::new(&config).unwrap();
    Crawler::new(fetcher, store.clone(), store.clone(), config)
}

fn validator_for(store: &Arc<MemoryStore>) -> CacheValidator {
    let config = test_config();
    let fetcher = Fetcher::new(&config).unwrap();
    CacheValidator::new(fetcher, store.clone(), store.clone(), config, ValidatorConfig::default())
}

#[derive(Clone, Copy, PartialEq)]
enum Refuse {
    Set,
    Invalidate,
}

/// Page store that rejects one operation for one URL and delegates everything else.
struct Refusing {
    inner: Arc<MemoryStore>,
    url: String,
    op: Refuse,
}

impl Refusing {
    fn check(&self, url: &str, op: Refuse) -> StoreResult<()> {
        if url == self.url && op == self.op {
            return Err(StoreError::Unavailable("cache down".into()));
        }
        Ok(())
    }
}

impl PageStore for Refusing {
    fn get(&self, url: &str) -> StoreResult<Option<String>> {
        PageStore::get(self.inner.as_ref(), url)
    }
    fn set(&self, url: &str, body: &str, ttl_secs: u64) -> StoreResult<()> {
        self.check(url, Refuse::Set)?;
        PageStore::set(self.inner.as_ref(), url, body, ttl_secs)
    }
    fn get_metadata(&self, url: &str) -> StoreResult<Option<PageMetadata>> {
        self.inner.get_metadata(url)
    }
    fn set_metadata(&self, metadata: &PageMetadata) -> StoreResult<()> {
        self.inner.set_metadata(metadata)
    }
    fn delete(&self, url: &str) -> StoreResult<()> {
        PageStore::delete(self.inner.as_ref(), url)
    }
    fn delete_metadata(&self, url: &str) -> StoreResult<()> {
        self.inner.delete_metadata(url)
    }
    fn scan_metadata_keys(&self) -> StoreResult<Vec<String>> {
        self.inner.scan_metadata_keys()
    }
    fn invalidate(&self, url: &str) -> StoreResult<()> {
        self.check(url, Refuse::Invalidate)?;
        self.inner.invalidate(url)
    }
}

fn indexed(store: &MemoryStore, url: &str) -> Option<String> {
    DocumentIndex::get(store, url).unwrap()
}

fn cached(store: &MemoryStore, url: &str) -> Option<String> {
    PageStore::get(store, url).unwrap()
}

#[tokio::test]
async fn crawl_follows_links_into_both_stores() {
    let server = MockServer::start().await;
    serve(&server, "GET", "/", html(200, r#"<html><body>home <a href="/b">B</a> <a href="c/">C</a> <a href="/">self</a></body></html>"#)).await;
    serve(&server, "GET", "/b/", html(200, "<html><body>leaf b</body></html>")).await;
    serve(&server, "GET", "/c/", html(200, "<html><body>leaf c</body></html>")).await;

    let store = Arc::new(MemoryStore::new());
    let mut crawler = crawler_for(&store);
    assert_eq!(crawler.state(), CrawlState::Idle);
    let report = crawler.run(&server.uri()).await.unwrap();

    let base = format!("{}/", server.uri());
    let expected = vec![base.clone(), format!("{base}b/"), format!("{base}c/")];
    assert_eq!(store.document_ids().unwrap(), expected);
    for url in &expected {
        assert!(cached(&store, url).is_some(), "{url} not cached");
        assert!(store.get_metadata(url).unwrap().is_some(), "{url} has no metadata");
    }
    let mut cached_keys = store.scan_metadata_keys().unwrap();
    cached_keys.sort();
    assert_eq!(cached_keys, expected);

    assert_eq!(report.fetched, 3);
    assert_eq!(report.frontier_remaining, 0);
    assert_eq!(crawler.state(), CrawlState::Done);
    assert_eq!(indexed(&store, &format!("{base}b/")).as_deref(), Some("leaf b"));
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve(&server, "GET", "/", html(200, "<html><body>back up</body></html>")).await;

    let store = Arc::new(MemoryStore::new());
    let report = crawler_for(&store).run(&server.uri()).await.unwrap();

    assert_eq!(report.retries, 1);
    assert_eq!(report.fetched, 1);
    assert_eq!(report.dropped, 0);
    assert_eq!(indexed(&store, &format!("{}/", server.uri())).as_deref(), Some("back up"));
}

#[tokio::test]
async fn retries_stop_at_the_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/")).respond_with(ResponseTemplate::new(500)).expect(3).mount(&server).await;

    let store = Arc::new(MemoryStore::new());
    let report = crawler_for(&store).run(&server.uri()).await.unwrap();

    assert_eq!(report.retries, 2);
    assert_eq!(report.dropped, 1);
    assert!(store.document_ids().unwrap().is_empty());
}

#[tokio::test]
async fn client_errors_are_dropped_without_retry() {
    let server = MockServer::start().await;
    serve(&server, "GET", "/", html(200, r#"<a href="/gone">gone</a>"#)).await;
    Mock::given(method("GET")).and(path("/gone/")).respond_with(ResponseTemplate::new(404)).expect(1).mount(&server).await;

    let store = Arc::new(MemoryStore::new());
    let report = crawler_for(&store).run(&server.uri()).await.unwrap();

    assert_eq!(report.fetched, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(report.retries, 0);
    let gone = format!("{}/gone/", server.uri());
    assert!(indexed(&store, &gone).is_none());
    assert!(cached(&store, &gone).is_none());
}

#[tokio::test]
async fn cached_pages_are_not_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/")).respond_with(html(200, "unused")).expect(0).mount(&server).await;
    serve(&server, "GET", "/b/", html(200, "<html><body>leaf b</body></html>")).await;

    let store = Arc::new(MemoryStore::new());
    let seed = format!("{}/", server.uri());
    PageStore::set(&*store, &seed, r#"<html><body><a href="/b/">B</a></body></html>"#, 3_600).unwrap();

    let report = crawler_for(&store).run(&server.uri()).await.unwrap();

    assert_eq!(report.cache_hits, 1);
    assert_eq!(report.fetched, 1);
    assert_eq!(store.document_ids().unwrap(), vec![format!("{seed}b/")]);
}

#[tokio::test]
async fn changed_etag_invalidates_and_recrawls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(200, "<html><body>old words</body></html>").insert_header("etag", "\"v1\""))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve(&server, "GET", "/", html(200, "<html><body>fresh words</body></html>").insert_header("etag", "\"v2\"")).await;
    serve(&server, "HEAD", "/", ResponseTemplate::new(200).insert_header("etag", "\"v2\"")).await;

    let store = Arc::new(MemoryStore::new());
    crawler_for(&store).run(&server.uri()).await.unwrap();
    let seed = format!("{}/", server.uri());
    assert_eq!(store.get_metadata(&seed).unwrap().unwrap().etag.as_deref(), Some("\"v1\""));

    let report = validator_for(&store).run().await.unwrap();

    assert_eq!(report.checked, 1);
    assert_eq!(report.invalidated, vec![seed.clone()]);
    assert_eq!(report.recrawl.as_ref().map(|r| r.fetched), Some(1));
    assert_eq!(indexed(&store, &seed).as_deref(), Some("fresh words"));
    assert_eq!(store.get_metadata(&seed).unwrap().unwrap().etag.as_deref(), Some("\"v2\""));
}

#[tokio::test]
async fn invalidated_page_that_disappears_leaves_both_stores() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(200, "<html><body>soon gone</body></html>").insert_header("etag", "\"v1\""))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve(&server, "GET", "/", ResponseTemplate::new(404)).await;
    serve(&server, "HEAD", "/", ResponseTemplate::new(200).insert_header("etag", "\"v2\"")).await;

    let store = Arc::new(MemoryStore::new());
    crawler_for(&store).run(&server.uri()).await.unwrap();
    let report = validator_for(&store).run().await.unwrap();

    let seed = format!("{}/", server.uri());
    assert_eq!(report.invalidated, vec![seed.clone()]);
    assert_eq!(report.recrawl.map(|r| r.dropped), Some(1));
    assert!(indexed(&store, &seed).is_none());
    assert!(cached(&store, &seed).is_none());
    assert!(store.get_metadata(&seed).unwrap().is_none());
}

#[tokio::test]
async fn matching_etag_keeps_the_page() {
    let server = MockServer::start().await;
    serve(&server, "GET", "/", html(200, "<html><body>steady</body></html>").insert_header("etag", "\"v1\"")).await;
    serve(&server, "HEAD", "/", ResponseTemplate::new(200).insert_header("etag", "\"v1\"")).await;

    let store = Arc::new(MemoryStore::new());
    crawler_for(&store).run(&server.uri()).await.unwrap();
    let report = validator_for(&store).run().await.unwrap();

    assert_eq!(report.valid, 1);
    assert!(report.invalidated.is_empty());
    assert!(report.recrawl.is_none());
    assert!(indexed(&store, &format!("{}/", server.uri())).is_some());
}

#[tokio::test]
async fn failed_head_is_inconclusive() {
    let server = MockServer::start().await;
    serve(&server, "GET", "/", html(200, "<html><body>steady</body></html>").insert_header("etag", "\"v1\"")).await;
    serve(&server, "HEAD", "/", ResponseTemplate::new(500)).await;

    let store = Arc::new(MemoryStore::new());
    crawler_for(&store).run(&server.uri()).await.unwrap();
    let report = validator_for(&store).run().await.unwrap();

    assert_eq!(report.inconclusive, 1);
    assert!(report.invalidated.is_empty());
    let seed = format!("{}/", server.uri());
    assert!(cached(&store, &seed).is_some());
    assert!(indexed(&store, &seed).is_some());
}

#[tokio::test]
async fn failed_caching_rolls_back_the_index_entry() {
    let server = MockServer::start().await;
    serve(&server, "GET", "/", html(200, r#"<html><body>home <a href="/b">B</a></body></html>"#)).await;
    serve(&server, "GET", "/b/", html(200, "<html><body>leaf b</body></html>")).await;

    let store = Arc::new(MemoryStore::new());
    let base = format!("{}/", server.uri());
    let pages = Arc::new(Refusing { inner: store.clone(), url: format!("{base}b/"), op: Refuse::Set });
    let config = test_config();
    let mut crawler = Crawler::new(Fetcher::new(&config).unwrap(), pages, store.clone(), config);
    let report = crawler.run(&server.uri()).await.unwrap();

    assert_eq!(report.fetched, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(store.document_ids().unwrap(), vec![base.clone()]);
    assert!(indexed(&store, &format!("{base}b/")).is_none());
    assert_eq!(store.scan_metadata_keys().unwrap(), vec![base]);
}

#[tokio::test]
async fn refused_invalidation_keeps_page_whole_and_sweep_continues() {
    let server = MockServer::start().await;
    for (at, old, new) in [("/", r#"<a href="/b">old a</a>"#, "new a"), ("/b/", "old b", "new b")] {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(html(200, &format!("<html><body>{old}</body></html>")).insert_header("etag", "\"v1\""))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        serve(&server, "GET", at, html(200, &format!("<html><body>{new}</body></html>")).insert_header("etag", "\"v2\"")).await;
        serve(&server, "HEAD", at, ResponseTemplate::new(200).insert_header("etag", "\"v2\"")).await;
    }

    let store = Arc::new(MemoryStore::new());
    crawler_for(&store).run(&server.uri()).await.unwrap();
    let (a, b) = (format!("{}/", server.uri()), format!("{}/b/", server.uri()));

    let pages = Arc::new(Refusing { inner: store.clone(), url: a.clone(), op: Refuse::Invalidate });
    let config = test_config();
    let validator =
        CacheValidator::new(Fetcher::new(&config).unwrap(), pages, store.clone(), config, ValidatorConfig::default());
    let report = validator.run().await.unwrap();

    assert_eq!(report.checked, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.invalidated, vec![b.clone()]);
    assert_eq!(report.recrawl.as_ref().map(|r| r.fetched), Some(1));

    assert_eq!(indexed(&store, &a).as_deref(), Some("old a"));
    assert!(cached(&store, &a).is_some());
    assert_eq!(store.get_metadata(&a).unwrap().unwrap().etag.as_deref(), Some("\"v1\""));
    assert_eq!(indexed(&store, &b).as_deref(), Some("new b"));
    assert_eq!(store.get_metadata(&b).unwrap().unwrap().etag.as_deref(), Some("\"v2\""));
}
