//! Omnivore crawler: a polite, parallel crawl engine
//!
//! This crate turns a set of seed addresses into a bounded, deduplicated
//! traversal of a link graph. Requests are spread over a fixed pool of workers
//! while every origin is paced individually according to robots.txt, the
//! configured rate limits, and the backoff state built up from server errors.

pub mod config;
pub mod crawler;
pub mod output;
pub mod politeness;
pub mod robots;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for crawl engine operations
///
/// Per-address failures never surface here: they are captured as a
/// [`state::FetchOutcome`] and reported through records and statistics.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Record sink error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Session {0} not found")]
    SessionNotFound(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for crawl engine operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::EngineConfig;
pub use crawler::{Session, SessionHandle, SessionReport};
pub use output::{ContentRecord, CrawlStats, RecordSink, StatsSnapshot};
pub use state::{FailureCategory, FetchOutcome, SessionId, SessionStatus};
pub use url::{normalize_url, Address, Origin};
