//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `FetchOutcome`: The classified result of fetching one address
//! - `FailureCategory`: How a failed fetch is counted in statistics
//! - `SessionStatus` / `SessionId`: Lifecycle and identity of a crawl session

mod outcome;
mod session;

pub use outcome::{FailureCategory, FetchOutcome, OutcomeSummary};
pub use session::{SessionId, SessionStatus};
