//! Fetch outcome definitions
//!
//! Every dispatched address ends in exactly one [`FetchOutcome`]. Failures are
//! values, never errors: they travel through records and statistics.
use crate::url::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The classified result of fetching one address
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// A 2xx response
    Success {
        status_code: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        content_type: Option<String>,
        elapsed: Duration,
    },

    /// A 3xx response that was not followed inline
    Redirect { target_address: Address },

    /// A 4xx response
    ClientError {
        status_code: u16,
        retry_after: Option<Duration>,
    },

    /// A 5xx response
    ServerError {
        status_code: u16,
        retry_after: Option<Duration>,
    },

    /// Connection refused, DNS failure, TLS error, redirect loop and the like
    NetworkError { reason: String },

    /// The request exceeded the per-request timeout
    Timeout,

    /// Robots exclusion forbids the address; it was never requested
    RobotsDisallowed,
}

impl FetchOutcome {
    /// Short stable name of the outcome variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Redirect { .. } => "redirect",
            Self::ClientError { .. } => "client_error",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError { .. } => "network_error",
            Self::Timeout => "timeout",
            Self::RobotsDisallowed => "robots_disallowed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Success { status_code, .. }
            | Self::ClientError { status_code, .. }
            | Self::ServerError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::ClientError { retry_after, .. } | Self::ServerError { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }

    /// Whether this outcome should push the origin into backoff
    ///
    /// Server errors, network failures, timeouts and 429 do; other client
    /// errors do not.
    pub fn is_backoff_signal(&self) -> bool {
        match self {
            Self::ServerError { .. } | Self::NetworkError { .. } | Self::Timeout => true,
            Self::ClientError { status_code, .. } => *status_code == 429,
            _ => false,
        }
    }

    /// Failure category for statistics, or None for non-failures
    pub fn failure_category(&self) -> Option<FailureCategory> {
        match self {
            Self::Success { .. } | Self::Redirect { .. } => None,
            Self::ClientError { status_code: 429, .. } => Some(FailureCategory::ServerOverload),
            Self::ClientError { .. } => Some(FailureCategory::PermanentClient),
            Self::ServerError { status_code: 503, .. } => Some(FailureCategory::ServerOverload),
            Self::ServerError { .. } => Some(FailureCategory::ServerError),
            Self::NetworkError { .. } => Some(FailureCategory::TransientNetwork),
            Self::Timeout => Some(FailureCategory::Timeout),
            Self::RobotsDisallowed => Some(FailureCategory::RobotsDisallowed),
        }
    }

    /// Condenses the outcome into its serializable record form
    ///
    /// The body and headers are left out; page content is carried separately.
    pub fn summary(&self) -> OutcomeSummary {
        let (content_type, elapsed_ms) = match self {
            Self::Success {
                content_type,
                elapsed,
                ..
            } => (content_type.clone(), Some(elapsed.as_millis() as u64)),
            _ => (None, None),
        };

        let detail = match self {
            Self::Redirect { target_address } => Some(target_address.to_string()),
            Self::NetworkError { reason } => Some(reason.clone()),
            Self::ClientError {
                retry_after: Some(delay),
                ..
            }
            | Self::ServerError {
                retry_after: Some(delay),
                ..
            } => Some(format!("retry-after {}s", delay.as_secs())),
            _ => None,
        };

        OutcomeSummary {
            kind: self.kind().to_string(),
            status_code: self.status_code(),
            content_type,
            elapsed_ms,
            detail,
        }
    }
}

/// Serializable summary of a [`FetchOutcome`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Category a failed fetch is counted under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Connection failures and redirect problems
    TransientNetwork,

    Timeout,

    /// 4xx other than 429
    PermanentClient,

    /// 429 and 503
    ServerOverload,

    /// Any other 5xx
    ServerError,

    RobotsDisallowed,
}

impl FailureCategory {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::Timeout => "timeout",
            Self::PermanentClient => "permanent_client",
            Self::ServerOverload => "server_overload",
            Self::ServerError => "server_error",
            Self::RobotsDisallowed => "robots_disallowed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "transient_network" => Some(Self::TransientNetwork),
            "timeout" => Some(Self::Timeout),
            "permanent_client" => Some(Self::PermanentClient),
            "server_overload" => Some(Self::ServerOverload),
            "server_error" => Some(Self::ServerError),
            "robots_disallowed" => Some(Self::RobotsDisallowed),
            _ => None,
        }
    }

    /// Returns all categories, in reporting order
    pub fn all() -> [Self; 6] {
        [
            Self::TransientNetwork,
            Self::Timeout,
            Self::PermanentClient,
            Self::ServerOverload,
            Self::ServerError,
            Self::RobotsDisallowed,
        ]
    }

    /// Position of this category in [`FailureCategory::all`]
    pub fn index(&self) -> usize {
        match self {
            Self::TransientNetwork => 0,
            Self::Timeout => 1,
            Self::PermanentClient => 2,
            Self::ServerOverload => 3,
            Self::ServerError => 4,
            Self::RobotsDisallowed => 5,
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
