//! HTTP side of the crawler: GET with body decoding and TTL extraction, and
//! HEAD for freshness checks.

use flate2::read::GzDecoder;
use reqwest::{header, Client, StatusCode};
use search_core::config::CrawlConfig;
use search_core::PageMetadata;
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeouts, connection failures and server-side errors; worth retrying.
    #[error("transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },

    /// Client errors, malformed URLs and undecodable bodies; never retried.
    #[error("permanent failure fetching {url}: {reason}")]
    Permanent { url: String, reason: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub content: String,
    pub charset: String,
    pub ttl_secs: u64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl FetchedPage {
    pub fn metadata(&self) -> PageMetadata {
        PageMetadata {
            url: self.url.clone(),
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
            charset: self.charset.clone(),
            ttl_secs: self.ttl_secs,
        }
    }
}

/// Validators returned by a HEAD request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadInfo {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    default_ttl_secs: u64,
}

impl Fetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, default_ttl_secs: config.default_ttl_secs })
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let resp = self.client.get(url).send().await.map_err(|e| classify(url, e))?;
        check_status(url, resp.status())?;

        let headers = resp.headers();
        let charset = charset_of(header_str(headers, header::CONTENT_TYPE));
        let ttl_secs = parse_ttl(header_str(headers, header::CACHE_CONTROL), self.default_ttl_secs);
        let etag = header_str(headers, header::ETAG).map(str::to_string);
        let last_modified = header_str(headers, header::LAST_MODIFIED).map(str::to_string);

        let bytes = resp.bytes().await.map_err(|e| classify(url, e))?;
        let content = decode_body(&bytes, &charset).ok_or_else(|| FetchError::Permanent {
            url: url.to_string(),
            reason: format!("body is neither {charset} nor gzip-compressed utf-8"),
        })?;

        Ok(FetchedPage { url: url.to_string(), content, charset, ttl_secs, etag, last_modified })
    }

    pub async fn head(&self, url: &str) -> Result<HeadInfo, FetchError> {
        let resp = self.client.head(url).send().await.map_err(|e| classify(url, e))?;
        check_status(url, resp.status())?;
        let headers = resp.headers();
        Ok(HeadInfo {
            etag: header_str(headers, header::ETAG).map(str::to_string),
            last_modified: header_str(headers, header::LAST_MODIFIED).map(str::to_string),
        })
    }
}

fn header_str(headers: &header::HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn classify(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_builder() {
        FetchError::Permanent { url: url.to_string(), reason: e.to_string() }
    } else {
        FetchError::Transient { url: url.to_string(), reason: e.to_string() }
    }
}

fn check_status(url: &str, status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }
    let reason = format!("HTTP {}", status.as_u16());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
        Err(FetchError::Transient { url: url.to_string(), reason })
    } else {
        Err(FetchError::Permanent { url: url.to_string(), reason })
    }
}

/// Charset declared in a `Content-Type` value, `utf-8` when absent.
pub fn charset_of(content_type: Option<&str>) -> String {
    content_type
        .and_then(|ct| {
            ct.split(';')
                .filter_map(|part| part.trim().split_once('='))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("charset"))
                .map(|(_, v)| v.trim().trim_matches('"').to_ascii_lowercase())
        })
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "utf-8".to_string())
}

/// TTL from `Cache-Control` (`s-maxage` wins over `max-age`); `default` when
/// absent, unparseable or not positive.
pub fn parse_ttl(cache_control: Option<&str>, default: u64) -> u64 {
    let Some(value) = cache_control else { return default };
    let mut max_age = None;
    let mut shared = None;
    for directive in value.split(',') {
        if let Some((name, secs)) = directive.trim().split_once('=') {
            let secs = secs.trim().trim_matches('"').parse::<u64>().ok();
            match name.trim().to_ascii_lowercase().as_str() {
                "max-age" => max_age = secs,
                "s-maxage" => shared = secs,
                _ => {}
            }
        }
    }
    shared.or(max_age).filter(|&s| s > 0).unwrap_or(default)
}

/// Decode with the declared charset; failing that, treat the body as gzip and
/// decode the inflated bytes as UTF-8.
pub fn decode_body(bytes: &[u8], charset: &str) -> Option<String> {
    decode_charset(bytes, charset).or_else(|| {
        let mut inflated = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut inflated).ok()?;
        String::from_utf8(inflated).ok()
    })
}

fn decode_charset(bytes: &[u8], charset: &str) -> Option<String> {
    match charset {
        "iso-8859-1" | "latin1" | "latin-1" => Some(bytes.iter().map(|&b| b as char).collect()),
        "utf-8" | "utf8" | "us-ascii" | "ascii" => std::str::from_utf8(bytes).ok().map(str::to_string),
        other => {
            tracing::debug!(charset = other, "unsupported charset, trying utf-8");
            std::str::from_utf8(bytes).ok().map(str::to_string)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn ttl_from_cache_control() {
        assert_eq!(parse_ttl(Some("public, max-age=600"), 86_400), 600);
        assert_eq!(parse_ttl(Some("max-age=600, s-maxage=60"), 86_400), 60);
        assert_eq!(parse_ttl(Some("no-cache"), 86_400), 86_400);
        assert_eq!(parse_ttl(Some("max-age=abc"), 86_400), 86_400);
        assert_eq!(parse_ttl(Some("max-age=0"), 86_400), 86_400);
        assert_eq!(parse_ttl(None, 42), 42);
    }

    #[test]
    fn charset_from_content_type() {
        assert_eq!(charset_of(Some("text/html; charset=ISO-8859-1")), "iso-8859-1");
        assert_eq!(charset_of(Some("text/html; charset=\"utf-8\"")), "utf-8");
        assert_eq!(charset_of(Some("text/html")), "utf-8");
        assert_eq!(charset_of(None), "utf-8");
    }

    #[test]
    fn latin1_bodies_decode() {
        assert_eq!(decode_body(&[0x63, 0x61, 0x66, 0xe9], "iso-8859-1").as_deref(), Some("café"));
    }

    #[test]
    fn gzip_fallback_when_charset_decode_fails() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all("<p>compressed</p>".as_bytes()).unwrap();
        let gz = enc.finish().unwrap();
        assert_eq!(decode_body(&gz, "utf-8").as_deref(), Some("<p>compressed</p>"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_body(&[0xff, 0xfe, 0x00, 0x9f], "utf-8").is_none());
    }

    #[test]
    fn status_classification() {
        assert!(check_status("u", StatusCode::SERVICE_UNAVAILABLE).unwrap_err().is_transient());
        assert!(check_status("u", StatusCode::TOO_MANY_REQUESTS).unwrap_err().is_transient());
        assert!(!check_status("u", StatusCode::NOT_FOUND).unwrap_err().is_transient());
        assert!(check_status("u", StatusCode::OK).is_ok());
    }
}
