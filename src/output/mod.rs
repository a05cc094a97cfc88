//! Output module for crawl records, statistics and summaries
//!
//! This module handles:
//! - The [`RecordSink`] trait and the records a session emits
//! - Channel, JSON-lines, SQLite and fan-out sinks
//! - Live statistics counters and their snapshots
//! - Markdown summaries of finished sessions

mod markdown;
mod sinks;
mod sqlite_output;
pub mod stats;
mod traits;

pub use markdown::{format_markdown_summary, write_markdown_summary};
pub use sinks::{ChannelSink, JsonLinesSink, MultiSink};
pub use sqlite_output::{load_session_report, SqliteSink};
pub use stats::{print_statistics, CrawlStats, StatsSnapshot};
pub use traits::{ContentRecord, PageContent, RecordSink, SinkError, SinkResult};
