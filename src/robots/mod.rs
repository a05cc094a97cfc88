//! Robots.txt handling module
//!
//! Fetches and parses robots.txt files. Caching lives with the rest of the
//! per-origin state in [`crate::politeness`].

mod parser;

pub use parser::ParsedRobots;

use crate::politeness::PolitenessGate;
use crate::url::Origin;
use reqwest::header::LOCATION;
use reqwest::{Client, Response};
use url::Url;

/// Fetches and parses robots.txt for an origin
///
/// The page client does not follow redirects, so redirects are followed here,
/// up to `max_redirects` hops, each paced through the gate like any other
/// request to its origin. Never fails: a missing file, a non-success status, a
/// network error, a broken redirect chain or an unreadable body all yield
/// [`ParsedRobots::allow_all`].
pub async fn fetch_robots(
    client: &Client,
    gate: &PolitenessGate,
    origin: &Origin,
    max_redirects: u32,
) -> ParsedRobots {
    let Some(robots_url) = origin.robots_url() else {
        return ParsedRobots::allow_all();
    };

    let Some(response) = follow_redirects(client, gate, origin, robots_url, max_redirects).await
    else {
        return ParsedRobots::allow_all();
    };

    let status = response.status();
    if !status.is_success() {
        tracing::debug!(
            "robots.txt for {} returned HTTP {}, allowing all",
            origin,
            status.as_u16()
        );
        return ParsedRobots::allow_all();
    }

    match response.text().await {
        Ok(body) => {
            tracing::debug!("Fetched robots.txt for {} ({} bytes)", origin, body.len());
            ParsedRobots::from_content(&body)
        }
        Err(e) => {
            tracing::warn!("Failed to read robots.txt body for {}: {}", origin, e);
            ParsedRobots::allow_all()
        }
    }
}

/// Requests `url`, following redirects; returns the first non-redirect response
async fn follow_redirects(
    client: &Client,
    gate: &PolitenessGate,
    origin: &Origin,
    mut url: Url,
    max_redirects: u32,
) -> Option<Response> {
    let mut hops = 0u32;

    loop {
        let response = match client.get(url.as_str()).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("robots.txt for {} unreachable ({}), allowing all", origin, e);
                return None;
            }
        };

        if !response.status().is_redirection() {
            return Some(response);
        }

        let target = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| url.join(location).ok())
            .filter(|target| matches!(target.scheme(), "http" | "https"));
        let Some(target) = target else {
            tracing::debug!("robots.txt for {} redirects nowhere usable, allowing all", origin);
            return None;
        };

        if hops >= max_redirects || target == url {
            tracing::debug!("robots.txt for {} redirects too often, allowing all", origin);
            return None;
        }
        hops += 1;

        tracing::debug!("robots.txt for {} redirects to {}", origin, target);
        if let Some(target_origin) = Origin::from_url(&target) {
            gate.pace(&target_origin).await;
        }
        url = target;
    }
}
