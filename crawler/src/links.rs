use lazy_static::lazy_static;
use scraper::{Html, Selector};
use search_core::urls::resolve_link;
use std::collections::HashSet;
use url::Url;

lazy_static! {
    static ref ANCHOR: Selector = Selector::parse("a[href]").expect("valid selector");
    static ref TITLE: Selector = Selector::parse("title").expect("valid selector");
    static ref BODY: Selector = Selector::parse("body").expect("valid selector");
}

/// Raw `href` values of every anchor, in document order.
pub fn extract_links(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    doc.select(&ANCHOR).filter_map(|a| a.value().attr("href")).map(str::to_string).collect()
}

/// Resolve hrefs against the page they were found on. Unusable links
/// (other schemes, unparseable) are skipped; duplicates collapse.
pub fn normalize_links(base: &str, hrefs: &[String]) -> Vec<String> {
    let Ok(base) = Url::parse(base) else {
        tracing::warn!(base, "cannot resolve links against an invalid base URL");
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for href in hrefs {
        match resolve_link(&base, href) {
            Ok(url) => {
                if seen.insert(url.clone()) {
                    out.push(url);
                }
            }
            Err(e) => tracing::debug!(%href, error = %e, "skipping link"),
        }
    }
    out
}

/// Title and visible body text, whitespace-collapsed; this is what gets indexed.
pub fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let title = doc.select(&TITLE).next().map(|n| n.text().collect::<String>()).unwrap_or_default();
    let body = doc.select(&BODY).next().map(|n| n.text().collect::<Vec<_>>().join(" ")).unwrap_or_default();
    format!("{title} {body}").split_whitespace().collect::<Vec<_>>().join(" ")
}
