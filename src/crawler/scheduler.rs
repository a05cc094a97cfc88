//! Worker pool
//!
//! This module handles:
//! - The loop each worker task runs until the session is quiescent or stopped
//! - Turning dispatches from the frontier into fetches, robots fetches and
//!   records
//! - Feeding discovered links back into the frontier
//! - Waiting efficiently when no origin is eligible

use crate::config::CrawlerConfig;
use crate::crawler::frontier::{Admission, Dispatch, Frontier, FrontierEntry};
use crate::crawler::pipeline::{process, Processed};
use crate::output::{ContentRecord, CrawlStats};
use crate::politeness::PolitenessGate;
use crate::robots::fetch_robots;
use crate::state::{FetchOutcome, SessionId};
use crate::url::{Address, Origin};
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

/// Shortest idle wait, so a hint of zero does not spin
const MIN_IDLE_WAIT: Duration = Duration::from_millis(5);

/// Longest idle wait; bounds how late a missed wake-up is noticed
const MAX_IDLE_WAIT: Duration = Duration::from_millis(250);

/// State shared by every worker of one session
pub struct WorkerContext {
    pub session_id: SessionId,
    pub frontier: Arc<Frontier>,
    pub gate: Arc<PolitenessGate>,
    pub client: Client,
    pub crawler: CrawlerConfig,
    pub stats: Arc<CrawlStats>,
    pub records: mpsc::Sender<ContentRecord>,
    /// Woken whenever new work may have become available
    pub wake: Notify,
    /// Cancelled to stop taking new work
    pub drain: CancellationToken,
    pub started: Instant,
}

impl WorkerContext {
    /// Offers a discovered address to the frontier and counts the decision
    pub fn offer(&self, address: Address, depth: u32, parent: Option<&Address>) -> Admission {
        let admission = self.frontier.enqueue(address, depth, parent);
        match admission {
            Admission::Accepted => self.stats.record_discovered(),
            Admission::Duplicate => self.stats.record_duplicate(),
            Admission::TooDeep => self.stats.record_depth_rejection(),
        }
        admission
    }
}

/// Runs one worker until the session is quiescent or draining
///
/// Every entry taken from the frontier is completed exactly once, after its
/// children were enqueued, so the outstanding count reaches zero only when
/// nothing is queued and no worker holds an entry.
pub async fn run_worker(ctx: Arc<WorkerContext>, worker_id: usize) {
    tracing::debug!("Worker {} started", worker_id);

    loop {
        if ctx.drain.is_cancelled() {
            tracing::debug!("Worker {} stopping: session draining", worker_id);
            break;
        }

        if ctx.frontier.outstanding() == 0 {
            tracing::debug!("Worker {} stopping: no outstanding work", worker_id);
            break;
        }

        match ctx.frontier.next_ready(&ctx.gate) {
            Some(Dispatch::Fetch(entry)) => handle_fetch(&ctx, entry).await,
            Some(Dispatch::Disallowed(entry)) => handle_disallowed(&ctx, entry).await,
            Some(Dispatch::FetchRobots(origin)) => handle_robots(&ctx, &origin).await,
            None => wait_for_work(&ctx).await,
        }
    }

    tracing::debug!("Worker {} exited", worker_id);
}

async fn handle_fetch(ctx: &WorkerContext, entry: FrontierEntry) {
    let origin = entry.address.origin().clone();
    tracing::debug!("Fetching {} (depth {})", entry.address, entry.depth);

    ctx.stats.start_fetch();
    let processed = process(
        &ctx.client,
        &ctx.gate,
        &ctx.frontier,
        &entry.address,
        &ctx.crawler,
    )
    .await;
    ctx.gate.release(&origin, &processed.outcome);
    ctx.stats.finish_fetch();

    record_stats(ctx, &processed);

    // Children of an entry at max depth are rejected by the frontier
    for link in &processed.links {
        ctx.offer(link.clone(), entry.depth + 1, Some(&entry.address));
    }

    let record = ContentRecord {
        session_id: ctx.session_id,
        address: entry.address,
        depth: entry.depth,
        discovered_from: entry.discovered_from,
        outcome: processed.outcome.summary(),
        extracted_links: processed.links,
        content: processed.content,
        fetched_at: Utc::now(),
    };

    emit(ctx, record).await;
    finish_entry(ctx);
}

async fn handle_disallowed(ctx: &WorkerContext, entry: FrontierEntry) {
    tracing::debug!("{} disallowed by robots.txt", entry.address);

    let outcome = FetchOutcome::RobotsDisallowed;
    ctx.stats.record_outcome(&outcome);

    let record = ContentRecord {
        session_id: ctx.session_id,
        address: entry.address,
        depth: entry.depth,
        discovered_from: entry.discovered_from,
        outcome: outcome.summary(),
        extracted_links: Vec::new(),
        content: None,
        fetched_at: Utc::now(),
    };

    emit(ctx, record).await;
    finish_entry(ctx);
}

async fn handle_robots(ctx: &WorkerContext, origin: &Origin) {
    let rules = fetch_robots(&ctx.client, &ctx.gate, origin, ctx.crawler.max_redirects).await;

    ctx.stats.record_robots_fetch();
    ctx.gate.store_robots(origin, rules);
    ctx.wake.notify_waiters();
}

async fn wait_for_work(ctx: &WorkerContext) {
    let hint = ctx
        .frontier
        .soonest_ready(&ctx.gate)
        .unwrap_or(MAX_IDLE_WAIT)
        .clamp(MIN_IDLE_WAIT, MAX_IDLE_WAIT);

    tokio::select! {
        _ = ctx.wake.notified() => {}
        _ = tokio::time::sleep(hint) => {}
        _ = ctx.drain.cancelled() => {}
    }
}

fn record_stats(ctx: &WorkerContext, processed: &Processed) {
    ctx.stats.record_outcome(&processed.outcome);
    ctx.stats.record_redirects(processed.redirects_followed);
    if processed.is_malformed() {
        ctx.stats.record_malformed();
    }
}

async fn emit(ctx: &WorkerContext, record: ContentRecord) {
    let address = record.address.clone();
    if ctx.records.send(record).await.is_err() {
        tracing::warn!("Record consumer is gone; dropping record for {}", address);
        return;
    }

    let emitted = ctx.stats.record_emitted();

    let interval = ctx.crawler.progress_interval;
    if interval > 0 && emitted % interval == 0 {
        let elapsed = ctx.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { emitted as f64 / elapsed } else { 0.0 };
        tracing::info!(
            "Progress: {} records, {} queued, {} outstanding, {:.2} records/sec",
            emitted,
            ctx.frontier.pending(),
            ctx.frontier.outstanding(),
            rate
        );
    }
}

/// Completes an entry and wakes idle workers, who either pick up new work or
/// notice that the session is quiescent
fn finish_entry(ctx: &WorkerContext) {
    if ctx.frontier.complete() {
        tracing::debug!("No outstanding work left");
    }
    ctx.wake.notify_waiters();
}
