//! Markdown summary generation
//!
//! This module generates a human-readable markdown summary of a finished
//! session: run information, counters, failures and per-origin pacing.

use crate::crawler::SessionReport;
use crate::output::traits::SinkResult;
use crate::state::FailureCategory;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown summary of a session report to `output_path`
///
/// # Arguments
///
/// * `report` - The finished session report
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(SinkError)` - Failed to write summary
pub fn write_markdown_summary(report: &SessionReport, output_path: &Path) -> SinkResult<()> {
    let markdown = format_markdown_summary(report);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a session report as markdown
pub fn format_markdown_summary(report: &SessionReport) -> String {
    let stats = &report.stats;
    let mut md = String::new();

    md.push_str("# Omnivore Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Session Information\n\n");
    md.push_str(&format!("- **Session ID**: {}\n", report.session_id));
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", report.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        report.duration_ms as f64 / 1000.0
    ));
    md.push_str(&format!("- **Status**: {}\n", report.status));
    md.push_str(&format!("- **Max Depth**: {}\n", report.max_depth));
    md.push_str(&format!("- **Workers**: {}\n", report.max_workers));
    if let Some(hash) = &report.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push('\n');

    md.push_str("### Seeds\n\n");
    for seed in &report.seeds {
        md.push_str(&format!("- {}\n", seed));
    }
    md.push('\n');

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Addresses Discovered**: {}\n", stats.discovered));
    md.push_str(&format!("- **Fetched Successfully**: {}\n", stats.fetched_success));
    md.push_str(&format!("- **Failed**: {}\n", stats.fetched_failed));
    md.push_str(&format!("- **Ended in Redirect**: {}\n", stats.fetched_redirect));
    md.push_str(&format!("- **Redirect Hops Followed**: {}\n", stats.redirects));
    md.push_str(&format!("- **Malformed Content**: {}\n", stats.malformed_content));
    md.push_str(&format!(
        "- **Duplicates Rejected**: {}\n",
        stats.duplicates_rejected
    ));
    md.push_str(&format!("- **Beyond Max Depth**: {}\n", stats.depth_rejected));
    md.push_str(&format!("- **Robots Files Fetched**: {}\n", stats.robots_fetched));
    md.push_str(&format!("- **Bytes Downloaded**: {}\n", stats.bytes_downloaded));
    md.push_str(&format!("- **Success Rate**: {:.2}%\n\n", stats.success_rate()));

    // Failure breakdown
    if stats.fetched_failed > 0 {
        md.push_str("## Failures by Category\n\n");
        md.push_str("| Category | Count |\n");
        md.push_str("|----------|-------|\n");
        for category in FailureCategory::all() {
            let count = stats.failures(category);
            if count > 0 {
                md.push_str(&format!("| {} | {} |\n", category, count));
            }
        }
        md.push('\n');
    }

    // Per-origin pacing
    if !report.origins.is_empty() {
        md.push_str("## Origins\n\n");
        md.push_str("| Origin | Requests | Interval (ms) | Failures | Robots |\n");
        md.push_str("|--------|----------|---------------|----------|--------|\n");

        let mut origins: Vec<_> = report.origins.iter().collect();
        origins.sort_by(|a, b| b.requests_dispatched.cmp(&a.requests_dispatched));

        for origin in origins {
            let robots = origin
                .robots_fetched_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                origin.origin,
                origin.requests_dispatched,
                origin.effective_interval_ms,
                origin.consecutive_failures,
                robots
            ));
        }
        md.push('\n');
    }

    md
}
