//! URL normalization. Every URL is normalized before it is compared, stored or
//! enqueued: absolute http(s), no fragment, and a trailing slash unless the
//! URL carries a query string.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq)]
pub enum UrlError {
    #[error("failed to parse URL {url}: {message}")]
    Parse { url: String, message: String },

    #[error("unsupported scheme in {0}")]
    UnsupportedScheme(String),
}

fn finish(mut url: Url) -> Result<String, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::UnsupportedScheme(url.to_string()));
    }
    url.set_fragment(None);
    let mut s = url.to_string();
    if url.query().is_none() && !s.ends_with('/') {
        s.push('/');
    }
    Ok(s)
}

/// Normalize an absolute URL; bare hosts such as `example.com` get `http://`.
pub fn normalize_url(raw: &str) -> Result<String, UrlError> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") { raw.to_string() } else { format!("http://{raw}") };
    let url = Url::parse(&candidate).map_err(|e| UrlError::Parse { url: raw.to_string(), message: e.to_string() })?;
    finish(url)
}

/// Resolve an href found on `base` and normalize it.
pub fn resolve_link(base: &Url, href: &str) -> Result<String, UrlError> {
    let joined = base
        .join(href.trim())
        .map_err(|e| UrlError::Parse { url: href.to_string(), message: e.to_string() })?;
    finish(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_scheme_and_trailing_slash() {
        assert_eq!(normalize_url("isitchristmas.com").unwrap(), "http://isitchristmas.com/");
        assert_eq!(normalize_url("https://a.test/docs").unwrap(), "https://a.test/docs/");
        assert_eq!(normalize_url("https://a.test/docs/").unwrap(), "https://a.test/docs/");
    }

    #[test]
    fn keeps_query_urls_without_slash() {
        assert_eq!(normalize_url("https://a.test/find?q=1#top").unwrap(), "https://a.test/find?q=1");
    }

    #[test]
    fn resolves_relative_to_page_path() {
        let base = Url::parse("https://a.test/guide/intro/").unwrap();
        assert_eq!(resolve_link(&base, "setup").unwrap(), "https://a.test/guide/intro/setup/");
        assert_eq!(resolve_link(&base, "/about").unwrap(), "https://a.test/about/");
        assert_eq!(resolve_link(&base, "../faq#x").unwrap(), "https://a.test/guide/faq/");
        assert_eq!(resolve_link(&base, "//b.test/x").unwrap(), "https://b.test/x/");
    }

    #[test]
    fn rejects_non_http_links() {
        let base = Url::parse("https://a.test/").unwrap();
        assert!(matches!(resolve_link(&base, "mailto:me@a.test"), Err(UrlError::UnsupportedScheme(_))));
        assert!(normalize_url("ftp://a.test/file").is_err());
    }
}
