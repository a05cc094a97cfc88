//! Crawl session controller
//!
//! A [`Session`] owns the frontier, the politeness gate and the worker pool of
//! one crawl. Starting it yields a [`SessionHandle`] for observing statistics,
//! requesting a graceful drain or an abort, and waiting for the final
//! [`SessionReport`].

use crate::config::{validate, EngineConfig};
use crate::crawler::fetcher::build_http_client;
use crate::crawler::frontier::Frontier;
use crate::crawler::scheduler::{run_worker, WorkerContext};
use crate::output::{ContentRecord, CrawlStats, RecordSink, StatsSnapshot};
use crate::politeness::{OriginSnapshot, PolicyStore, PolitenessGate};
use crate::state::{SessionId, SessionStatus};
use crate::url::Address;
use crate::{CrawlError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Records buffered between the workers and the sink before workers block
pub const RECORD_CHANNEL_CAPACITY: usize = 256;

/// Final summary of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub seeds: Vec<String>,
    pub max_depth: u32,
    pub max_workers: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stats: StatsSnapshot,
    pub origins: Vec<OriginSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

/// A validated, ready-to-start crawl
pub struct Session {
    id: SessionId,
    config: EngineConfig,
    client: Client,
    config_hash: Option<String>,
}

impl Session {
    /// Validates the configuration and builds the HTTP client
    ///
    /// # Returns
    ///
    /// * `Ok(Session)` - Ready to start
    /// * `Err(CrawlError::Config)` - The configuration is invalid
    /// * `Err(CrawlError::HttpClient)` - The HTTP client could not be built
    pub fn new(config: EngineConfig) -> Result<Self> {
        validate(&config)?;
        let client = build_http_client(&config.user_agent, &config.crawler)?;

        Ok(Self {
            id: SessionId::new(),
            config,
            client,
            config_hash: None,
        })
    }

    /// Attaches the hash of the configuration file to the final report
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates `config`, runs a session to the end and returns its report
    pub async fn run(config: EngineConfig, sink: Arc<dyn RecordSink>) -> Result<SessionReport> {
        Self::new(config)?.start(sink).wait().await
    }

    /// Seeds the frontier and spawns the worker pool
    ///
    /// Must be called from within a tokio runtime. Records are handed to
    /// `sink` from a blocking thread as they are produced; `sink.finish` is
    /// called once with the final report.
    pub fn start(self, sink: Arc<dyn RecordSink>) -> SessionHandle {
        let Session {
            id,
            config,
            client,
            config_hash,
        } = self;

        let stats = Arc::new(CrawlStats::new());
        let control = SessionControl {
            status: Arc::new(RwLock::new(SessionStatus::Running)),
            drain: CancellationToken::new(),
            abort: CancellationToken::new(),
        };

        let frontier = Arc::new(Frontier::new(config.crawler.max_depth));
        let gate = Arc::new(PolitenessGate::new(
            PolicyStore::new(&config.politeness),
            config.user_agent.crawler_name.clone(),
            config.crawler.respect_robots,
            config.crawler.robots_ttl(),
        ));
        let (records, receiver) = mpsc::channel(RECORD_CHANNEL_CAPACITY);

        let ctx = Arc::new(WorkerContext {
            session_id: id,
            frontier: Arc::clone(&frontier),
            gate: Arc::clone(&gate),
            client,
            crawler: config.crawler.clone(),
            stats: Arc::clone(&stats),
            records,
            wake: Notify::new(),
            drain: control.drain.clone(),
            started: Instant::now(),
        });

        for seed in &config.seeds {
            match Address::parse(seed) {
                Ok(address) => {
                    ctx.offer(address, 0, None);
                }
                Err(e) => tracing::warn!("Skipping seed {}: {}", seed, e),
            }
        }

        tracing::info!(
            "Starting session {} with {} seeds, max depth {}, {} workers",
            id,
            frontier.outstanding(),
            config.crawler.max_depth,
            config.crawler.max_workers
        );

        let supervisor = Supervisor {
            id,
            config,
            config_hash,
            started_at: Utc::now(),
            started: Instant::now(),
            stats: Arc::clone(&stats),
            control: control.clone(),
            frontier,
            gate,
        };
        let task = tokio::spawn(supervisor.run(ctx, receiver, sink));

        SessionHandle {
            id,
            stats,
            control,
            task,
        }
    }
}

/// Cloneable controls for a running session
#[derive(Clone)]
pub struct SessionControl {
    status: Arc<RwLock<SessionStatus>>,
    drain: CancellationToken,
    abort: CancellationToken,
}

impl SessionControl {
    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    /// Stops dispatching new work; in-flight fetches finish and are recorded
    pub fn drain(&self) {
        {
            let mut status = self.status.write();
            if *status == SessionStatus::Running {
                *status = SessionStatus::Draining;
            }
        }
        self.drain.cancel();
    }

    /// Stops the session immediately, cancelling in-flight fetches
    pub fn abort(&self) {
        {
            let mut status = self.status.write();
            if !status.is_terminal() {
                *status = SessionStatus::Aborted;
            }
        }
        self.drain.cancel();
        self.abort.cancel();
    }

    fn finish(&self) -> SessionStatus {
        let mut status = self.status.write();
        if self.abort.is_cancelled() {
            *status = SessionStatus::Aborted;
        } else {
            *status = SessionStatus::Completed;
        }
        *status
    }
}

/// Handle to a running session
pub struct SessionHandle {
    id: SessionId,
    stats: Arc<CrawlStats>,
    control: SessionControl,
    task: tokio::task::JoinHandle<Result<SessionReport>>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current counters; may be read at any time
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.control.status()
    }

    pub fn drain(&self) {
        self.control.drain();
    }

    pub fn abort(&self) {
        self.control.abort();
    }

    /// Controls that outlive [`SessionHandle::wait`], e.g. for a signal handler
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Waits for the session to end and returns its report
    pub async fn wait(self) -> Result<SessionReport> {
        self.task
            .await
            .map_err(|e| CrawlError::Worker(format!("session task failed: {}", e)))?
    }
}

/// Owns everything the session needs after its workers were spawned
struct Supervisor {
    id: SessionId,
    config: EngineConfig,
    config_hash: Option<String>,
    started_at: DateTime<Utc>,
    started: Instant,
    stats: Arc<CrawlStats>,
    control: SessionControl,
    frontier: Arc<Frontier>,
    gate: Arc<PolitenessGate>,
}

impl Supervisor {
    async fn run(
        self,
        ctx: Arc<WorkerContext>,
        receiver: mpsc::Receiver<ContentRecord>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<SessionReport> {
        let consumer_sink = Arc::clone(&sink);
        let consumer = tokio::task::spawn_blocking(move || consume_records(receiver, consumer_sink));

        let deadline = self.config.crawler.session_deadline().map(|deadline| {
            let control = self.control.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(deadline) => {
                        tracing::info!("Session deadline of {:?} reached, draining", deadline);
                        control.drain();
                    }
                    _ = control.drain.cancelled() => {}
                }
            })
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.crawler.max_workers {
            workers.spawn(run_worker(Arc::clone(&ctx), worker_id));
        }
        // Workers hold the only remaining record senders
        drop(ctx);

        self.join_workers(&mut workers).await;

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        let written = consumer
            .await
            .map_err(|e| CrawlError::Worker(format!("record consumer failed: {}", e)))?;

        let status = self.control.finish();
        let report = self.report(status);

        if self.frontier.outstanding() > 0 {
            tracing::info!(
                "Session {} stopped with {} addresses unprocessed",
                self.id,
                self.frontier.outstanding()
            );
        }

        let finish_report = report.clone();
        match tokio::task::spawn_blocking(move || sink.finish(&finish_report)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Record sink failed to finish: {}", e),
            Err(e) => tracing::warn!("Record sink finish task failed: {}", e),
        }

        tracing::info!(
            "Session {} {} after {:.1}s: {} records written, {} succeeded, {} failed",
            self.id,
            status,
            report.duration_ms as f64 / 1000.0,
            written,
            report.stats.fetched_success,
            report.stats.fetched_failed
        );

        Ok(report)
    }

    /// Waits for every worker, aborting the pool on request or when a worker
    /// is lost
    async fn join_workers(&self, workers: &mut JoinSet<()>) {
        let mut aborting = false;

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(Ok(())) => {}
                    Some(Err(e)) if e.is_cancelled() && aborting => {}
                    Some(Err(e)) => {
                        // A lost worker may have held an entry, so the session
                        // could never become quiescent.
                        tracing::error!("Worker task lost: {}", e);
                        self.control.abort();
                    }
                },
                _ = self.control.abort.cancelled(), if !aborting => {
                    tracing::info!("Aborting session {}", self.id);
                    aborting = true;
                    workers.abort_all();
                }
            }
        }
    }

    fn report(&self, status: SessionStatus) -> SessionReport {
        let mut origins = self.gate.snapshots();
        origins.sort_by(|a, b| a.origin.cmp(&b.origin));

        SessionReport {
            session_id: self.id,
            status,
            seeds: self.config.seeds.clone(),
            max_depth: self.config.crawler.max_depth,
            max_workers: self.config.crawler.max_workers,
            started_at: self.started_at,
            finished_at: Utc::now(),
            duration_ms: self.started.elapsed().as_millis() as u64,
            stats: self.stats.snapshot(),
            origins,
            config_hash: self.config_hash.clone(),
        }
    }
}

/// Drains the record channel into the sink until every sender is gone
fn consume_records(mut receiver: mpsc::Receiver<ContentRecord>, sink: Arc<dyn RecordSink>) -> u64 {
    let mut written = 0;
    while let Some(record) = receiver.blocking_recv() {
        match sink.write(&record) {
            Ok(()) => written += 1,
            Err(e) => tracing::warn!("Failed to write record for {}: {}", record.address, e),
        }
    }
    written
}
