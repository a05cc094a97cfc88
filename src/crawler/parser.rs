//! HTML parser for extracting links and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from <a> tags and canonical links)
//! - Page title
//! - The robots meta directive

use crate::url::Address;
use scraper::{Html, Selector};
use std::collections::HashSet;

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Normalized links in document order, without duplicates
    pub links: Vec<Address>,

    /// `<meta name="robots" content="nofollow">` was present
    pub nofollow: bool,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<link rel="stylesheet" ...>`, `<script src>`, `<img src>`
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:`, `data:` links
/// - Fragment-only links
/// - Anything that does not resolve to an http(s) address
///
/// Relative links resolve against `<base href>` when present, else against
/// `page_address`. A robots meta `nofollow` drops every link.
///
/// **Note:** per-link `rel="nofollow"` links ARE followed
///
/// # Example
///
/// ```
/// use omnivore_crawler::crawler::parse_html;
/// use omnivore_crawler::url::Address;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base = Address::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, page_address: &Address) -> ParsedPage {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let nofollow = has_nofollow_meta(&document);

    let links = if nofollow {
        Vec::new()
    } else {
        let base = extract_base(&document, page_address);
        extract_links(&document, base.as_ref().unwrap_or(page_address))
    };

    ParsedPage {
        title,
        links,
        nofollow,
    }
}

/// Whether a body should be treated as HTML
///
/// Trusts the Content-Type when present; otherwise sniffs the start of the
/// body for an HTML document marker.
pub fn is_html(content_type: Option<&str>, body: &[u8]) -> bool {
    match content_type {
        Some(content_type) => {
            let mime = content_type
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase();
            mime == "text/html" || mime == "application/xhtml+xml"
        }
        None => {
            let head = &body[..body.len().min(512)];
            let head = String::from_utf8_lossy(head).to_ascii_lowercase();
            let head = head.trim_start();
            head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<html")
        }
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn has_nofollow_meta(document: &Html) -> bool {
    let Ok(selector) = Selector::parse("meta[name][content]") else {
        return false;
    };

    document.select(&selector).any(|element| {
        let name = element.value().attr("name").unwrap_or("");
        let content = element.value().attr("content").unwrap_or("");
        name.eq_ignore_ascii_case("robots")
            && content
                .split(',')
                .any(|directive| matches!(directive.trim().to_ascii_lowercase().as_str(), "nofollow" | "none"))
    })
}

/// The document's `<base href>`, resolved against the page address
fn extract_base(document: &Html, page_address: &Address) -> Option<Address> {
    let selector = Selector::parse("base[href]").ok()?;
    let href = document.select(&selector).next()?.value().attr("href")?;
    page_address.join(href.trim()).ok()
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base: &Address) -> Vec<Address> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |href: &str| {
        if let Some(address) = resolve_link(href, base) {
            if seen.insert(address.clone()) {
                links.push(address);
            }
        }
    };

    // Extract links from <a> tags
    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    // Extract canonical link
    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    links
}

/// Resolves a link href to a normalized address
///
/// Returns None if the link should be excluded.
fn resolve_link(href: &str, base: &Address) -> Option<Address> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    // Resolution also rejects any other non-http(s) scheme
    base.join(href).ok()
}
