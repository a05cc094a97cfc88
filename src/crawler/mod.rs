//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The origin-partitioned frontier
//! - HTTP fetching with manual, paced redirect handling
//! - HTML parsing and link extraction
//! - The worker pool and the session controller

mod fetcher;
mod frontier;
mod parser;
mod pipeline;
mod scheduler;
mod session;

pub use fetcher::{build_http_client, fetch, Fetched};
pub use frontier::{Admission, Dispatch, Frontier, FrontierEntry};
pub use parser::{is_html, parse_html, ParsedPage};
pub use pipeline::{process, Processed};
pub use session::{
    Session, SessionControl, SessionHandle, SessionReport, RECORD_CHANNEL_CAPACITY,
};
