//! Fetch-extract pipeline
//!
//! Runs one fetch and turns its outcome into the pieces a worker needs: the
//! classified outcome, the page content, and the links to offer the frontier.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::fetch;
use crate::crawler::frontier::Frontier;
use crate::crawler::parser::{is_html, parse_html};
use crate::output::PageContent;
use crate::politeness::PolitenessGate;
use crate::state::FetchOutcome;
use crate::url::Address;
use reqwest::Client;

/// Everything produced by processing one address
#[derive(Debug)]
pub struct Processed {
    pub outcome: FetchOutcome,
    pub final_address: Address,
    pub redirects_followed: u32,
    /// Links to offer the frontier, in document order
    pub links: Vec<Address>,
    pub content: Option<PageContent>,
}

impl Processed {
    pub fn is_malformed(&self) -> bool {
        self.content.as_ref().is_some_and(|c| c.malformed)
    }
}

/// Fetches `address` and extracts content and links from the response
///
/// Links are resolved against the final address after redirects. A body that
/// is not valid UTF-8 is decoded lossily, flagged as malformed and yields no
/// links. A redirect that was not followed inline contributes its target as
/// the only link.
pub async fn process(
    client: &Client,
    gate: &PolitenessGate,
    frontier: &Frontier,
    address: &Address,
    crawler: &CrawlerConfig,
) -> Processed {
    let fetched = fetch(
        client,
        gate,
        frontier,
        address,
        crawler.follow_redirects,
        crawler.max_redirects,
    )
    .await;

    let (links, content) = match &fetched.outcome {
        FetchOutcome::Success {
            body, content_type, ..
        } => extract(body, content_type.as_deref(), &fetched.final_address),
        FetchOutcome::Redirect { target_address } => (vec![target_address.clone()], None),
        _ => (Vec::new(), None),
    };

    Processed {
        outcome: fetched.outcome,
        final_address: fetched.final_address,
        redirects_followed: fetched.redirects_followed,
        links,
        content,
    }
}

fn extract(
    body: &[u8],
    content_type: Option<&str>,
    page_address: &Address,
) -> (Vec<Address>, Option<PageContent>) {
    let (text, malformed) = match std::str::from_utf8(body) {
        Ok(text) => (text.to_string(), false),
        Err(_) => (String::from_utf8_lossy(body).into_owned(), true),
    };

    if malformed {
        tracing::debug!("{}: body is not valid UTF-8", page_address);
    }

    let (title, links) = if !malformed && is_html(content_type, body) {
        let parsed = parse_html(&text, page_address);
        (parsed.title, parsed.links)
    } else {
        (None, Vec::new())
    };

    let content = PageContent {
        title,
        body: text,
        malformed,
    };

    (links, Some(content))
}
