// src/crawl/extract.rs
// =============================================================================
// Reading a settled page: its title and its same-origin links.
//
// How it works:
// 1. One script call returns the rendered title, the current location, the
//    document base URI and the rendered HTML
// 2. The HTML is parsed with `scraper` and every <a href> is resolved
//    against the base URI (what the browser's a.href would give us)
// 3. Only links with the same origin as the current location are kept
//
// No normalization and no dedup here; the frontier handles duplicates.
// =============================================================================

use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

use super::visit::VisitError;
use crate::driver::RenderContext;

pub const SNAPSHOT_SCRIPT: &str = r#"(() => ({
    title: document.title,
    location: window.location.href,
    baseUri: document.baseURI,
    html: document.documentElement.outerHTML
}))()"#;

// Raw data read from the page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub title: String,
    pub location: String,
    pub base_uri: String,
    pub html: String,
}

// What the crawler keeps from a page
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub title: String,
    pub links: Vec<String>,
}

/// Reads the title and same-origin links from a settled context.
pub async fn extract<C: RenderContext>(context: &C) -> Result<Extracted, VisitError> {
    let value = context.evaluate(SNAPSHOT_SCRIPT).await?;
    let snapshot: PageSnapshot =
        serde_json::from_value(value).map_err(|e| VisitError::Extraction(e.to_string()))?;
    Ok(from_snapshot(&snapshot))
}

pub fn from_snapshot(snapshot: &PageSnapshot) -> Extracted {
    Extracted {
        title: snapshot.title.trim().to_string(),
        links: extract_same_origin_links(&snapshot.html, &snapshot.base_uri, &snapshot.location),
    }
}

// Extracts links from HTML that share the origin of `location`
//
// Parameters:
//   html: the rendered HTML
//   base_uri: what relative hrefs are resolved against (honours <base href>)
//   location: the page's current URL, which defines the origin
pub fn extract_same_origin_links(html: &str, base_uri: &str, location: &str) -> Vec<String> {
    let mut links = Vec::new();

    let (base, origin) = match (Url::parse(base_uri), Url::parse(location)) {
        (Ok(base), Ok(location)) => (base, location.origin()),
        _ => return links,
    };
    // Opaque origins (about:blank, data:) never match anything
    if !origin.is_tuple() {
        return links;
    }

    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return links,
    };

    let document = Html::parse_document(html);
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Ok(resolved) = base.join(href.trim()) {
            if resolved.origin() == origin {
                links.push(resolved.to_string());
            }
        }
    }

    links
}
