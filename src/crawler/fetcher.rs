//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with a per-request timeout
//! - Manual redirect handling: same-origin hops are paced through the
//!   politeness gate, any other hop is handed back to the frontier
//! - Classification of responses and errors into a [`FetchOutcome`]

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::frontier::Frontier;
use crate::politeness::PolitenessGate;
use crate::state::FetchOutcome;
use crate::url::Address;
use crate::UrlError;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION, RETRY_AFTER};
use reqwest::{redirect::Policy, Client};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// A fetch outcome together with the address that produced it
#[derive(Debug)]
pub struct Fetched {
    pub outcome: FetchOutcome,
    /// Last address requested; differs from the original after redirects
    pub final_address: Address,
    /// Redirect hops followed inline
    pub redirects_followed: u32,
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are disabled at the client level: the fetcher follows them
/// itself so loops are detected and every hop is paced.
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `crawler` - Crawler settings providing the request timeout
///
/// # Example
///
/// ```no_run
/// use omnivore_crawler::config::{CrawlerConfig, UserAgentConfig};
/// use omnivore_crawler::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default(), &CrawlerConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    let timeout = crawler.request_timeout();

    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches an address, following redirects manually
///
/// # Redirect Handling
///
/// | Condition | Outcome |
/// |-----------|---------|
/// | 3xx, following disabled | `Redirect{target}` |
/// | 3xx to an address already seen in this chain | `NetworkError("redirect loop")` |
/// | more than `max_redirects` hops | `NetworkError("too many redirects")` |
/// | 3xx to a non-http(s) scheme | `NetworkError` |
/// | 3xx to another origin or a path robots.txt forbids | `Redirect{target}` |
/// | 3xx to an address already visited in this session | `Redirect{target}` |
/// | any other 3xx | target claimed in the frontier, hop paced and followed |
///
/// A `Redirect` outcome leaves the target to the frontier, where it passes
/// the gate and deduplication like any discovered link. Every other response
/// is classified by status: 2xx Success, 4xx ClientError, 5xx ServerError.
pub async fn fetch(
    client: &Client,
    gate: &PolitenessGate,
    frontier: &Frontier,
    address: &Address,
    follow_redirects: bool,
    max_redirects: u32,
) -> Fetched {
    let mut current = address.clone();
    let mut seen: HashSet<Address> = HashSet::from([current.clone()]);
    let mut hops = 0u32;

    loop {
        let started = Instant::now();
        let response = match client.get(current.as_str()).send().await {
            Ok(response) => response,
            Err(e) => {
                return Fetched {
                    outcome: classify_error(&e),
                    final_address: current,
                    redirects_followed: hops,
                }
            }
        };

        let status = response.status();

        if status.is_redirection() {
            let target = match redirect_target(&current, response.headers()) {
                Ok(target) => target,
                Err(reason) => {
                    return Fetched {
                        outcome: FetchOutcome::NetworkError { reason },
                        final_address: current,
                        redirects_followed: hops,
                    }
                }
            };

            if !follow_redirects {
                return Fetched {
                    outcome: FetchOutcome::Redirect {
                        target_address: target,
                    },
                    final_address: current,
                    redirects_followed: hops,
                };
            }

            if !seen.insert(target.clone()) {
                tracing::debug!("Redirect loop at {} -> {}", current, target);
                return Fetched {
                    outcome: FetchOutcome::NetworkError {
                        reason: "redirect loop".to_string(),
                    },
                    final_address: current,
                    redirects_followed: hops,
                };
            }

            if hops >= max_redirects {
                tracing::debug!("Too many redirects starting from {}", address);
                return Fetched {
                    outcome: FetchOutcome::NetworkError {
                        reason: "too many redirects".to_string(),
                    },
                    final_address: current,
                    redirects_followed: hops,
                };
            }

            if !gate.permits_inline_hop(address.origin(), &target) {
                tracing::debug!("Handing redirect {} -> {} to the frontier", current, target);
                return Fetched {
                    outcome: FetchOutcome::Redirect {
                        target_address: target,
                    },
                    final_address: current,
                    redirects_followed: hops,
                };
            }

            if !frontier.claim(&target) {
                tracing::debug!("Redirect {} -> {} lands on a visited address", current, target);
                return Fetched {
                    outcome: FetchOutcome::Redirect {
                        target_address: target,
                    },
                    final_address: current,
                    redirects_followed: hops,
                };
            }

            tracing::debug!("Following redirect {} -> {}", current, target);
            gate.pace(target.origin()).await;
            hops += 1;
            current = target;
            continue;
        }

        let retry_after = parse_retry_after(response.headers());
        let status_code = status.as_u16();

        let outcome = if status.is_success() {
            let headers = collect_headers(response.headers());
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            match response.bytes().await {
                Ok(body) => FetchOutcome::Success {
                    status_code,
                    headers,
                    body: body.to_vec(),
                    content_type,
                    elapsed: started.elapsed(),
                },
                Err(e) => classify_error(&e),
            }
        } else if status.is_client_error() {
            FetchOutcome::ClientError {
                status_code,
                retry_after,
            }
        } else if status.is_server_error() {
            FetchOutcome::ServerError {
                status_code,
                retry_after,
            }
        } else {
            FetchOutcome::NetworkError {
                reason: format!("unexpected HTTP status {}", status_code),
            }
        };

        return Fetched {
            outcome,
            final_address: current,
            redirects_followed: hops,
        };
    }
}

/// Resolves the Location header of a redirect against the current address
fn redirect_target(current: &Address, headers: &HeaderMap) -> Result<Address, String> {
    let location = headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "redirect without Location header".to_string())?;

    current.join(location).map_err(|e| match e {
        UrlError::InvalidScheme(scheme) => format!("redirect to unsupported scheme '{}'", scheme),
        other => format!("invalid redirect target '{}': {}", location, other),
    })
}

/// Classifies a reqwest error into a fetch outcome
fn classify_error(e: &reqwest::Error) -> FetchOutcome {
    if e.is_timeout() {
        FetchOutcome::Timeout
    } else if e.is_connect() {
        FetchOutcome::NetworkError {
            reason: format!("connection failed: {}", e),
        }
    } else {
        FetchOutcome::NetworkError {
            reason: e.to_string(),
        }
    }
}

/// Parses a Retry-After header given either as seconds or as an HTTP date
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
