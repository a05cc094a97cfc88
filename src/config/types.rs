use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the crawl engine
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Starting addresses of the crawl
    pub seeds: Vec<String>,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub politeness: PolitenessConfig,

    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl EngineConfig {
    /// Builds a configuration with default settings for the given seeds
    pub fn new<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seeds: seeds.into_iter().map(Into::into).collect(),
            crawler: CrawlerConfig::default(),
            politeness: PolitenessConfig::default(),
            user_agent: UserAgentConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Maximum link distance from a seed (seeds are depth 0)
    pub max_depth: u32,

    /// Number of concurrent workers
    pub max_workers: usize,

    /// Per-request timeout (milliseconds)
    pub request_timeout_ms: u64,

    /// Maximum redirect hops followed for one address
    pub max_redirects: u32,

    /// Follow redirects inline; when false a redirect target is enqueued instead
    pub follow_redirects: bool,

    /// Honor robots.txt
    pub respect_robots: bool,

    /// How long fetched robots rules stay valid (seconds)
    pub robots_ttl_secs: u64,

    /// Wall-clock limit after which the session drains (seconds)
    pub session_deadline_secs: Option<u64>,

    /// Log a progress line every this many records (0 disables)
    pub progress_interval: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_workers: 8,
            request_timeout_ms: 30_000,
            max_redirects: 5,
            follow_redirects: true,
            respect_robots: true,
            robots_ttl_secs: 86_400,
            session_deadline_secs: None,
            progress_interval: 100,
        }
    }
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn robots_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_ttl_secs)
    }

    pub fn session_deadline(&self) -> Option<Duration> {
        self.session_deadline_secs.map(Duration::from_secs)
    }
}

/// Default pacing parameters, applied to every origin without an override
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PolitenessConfig {
    /// Minimum time between request starts to one origin (milliseconds)
    pub min_delay_ms: u64,

    /// Token bucket refill rate per origin
    pub max_requests_per_second: f64,

    /// Concurrent requests allowed to one origin
    pub in_flight_budget: u32,

    pub backoff_base_ms: u64,

    pub backoff_multiplier: f64,

    pub backoff_ceiling_ms: u64,

    /// Stretch the interval to the observed response latency
    pub adaptive_delay: bool,

    /// Per-origin overrides
    #[serde(rename = "origin")]
    pub overrides: Vec<OriginOverride>,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 1_000,
            max_requests_per_second: 1.0,
            in_flight_budget: 1,
            backoff_base_ms: 1_000,
            backoff_multiplier: 2.0,
            backoff_ceiling_ms: 60_000,
            adaptive_delay: false,
            overrides: Vec::new(),
        }
    }
}

/// Pacing overrides for a single origin; unset fields inherit the defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OriginOverride {
    /// Origin such as `https://slow.example.com`
    pub origin: String,
    pub min_delay_ms: Option<u64>,
    pub max_requests_per_second: Option<f64>,
    pub in_flight_budget: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub backoff_ceiling_ms: Option<u64>,
    pub adaptive_delay: Option<bool>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the robots.txt product token
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "Omnivore".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://github.com/omnivore-crawler".to_string(),
            contact_email: "crawler@omnivore.invalid".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Full User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration; every destination is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    /// SQLite database receiving records and session reports
    pub database_path: Option<PathBuf>,

    /// JSON-lines file receiving records
    pub jsonl_path: Option<PathBuf>,

    /// Markdown summary written after the session
    pub summary_path: Option<PathBuf>,
}
