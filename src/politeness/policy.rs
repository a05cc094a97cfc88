//! Origin policy store
//!
//! Holds per-origin crawling state: robots rules, pacing parameters, backoff,
//! and the token bucket. The store is a sharded map keyed by origin, so two
//! origins never contend on the same lock.

use crate::config::{OriginOverride, PolitenessConfig};
use crate::robots::ParsedRobots;
use crate::state::FetchOutcome;
use crate::url::Origin;
use chrono::{DateTime, Utc};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

/// Weight of the newest sample in the observed latency average
const LATENCY_SMOOTHING: f64 = 0.3;

/// Resolved pacing parameters for one origin
#[derive(Debug, Clone, PartialEq)]
pub struct PacingParams {
    pub min_interval: Duration,
    pub requests_per_second: f64,
    pub in_flight_budget: u32,
    pub backoff_base: Duration,
    pub backoff_multiplier: f64,
    pub backoff_ceiling: Duration,
    pub adaptive: bool,
}

impl PacingParams {
    pub fn from_config(config: &PolitenessConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(config.min_delay_ms),
            requests_per_second: config.max_requests_per_second,
            in_flight_budget: config.in_flight_budget.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_multiplier: config.backoff_multiplier,
            backoff_ceiling: Duration::from_millis(config.backoff_ceiling_ms),
            adaptive: config.adaptive_delay,
        }
    }

    /// Applies the fields an override sets, keeping the rest
    pub fn with_override(mut self, entry: &OriginOverride) -> Self {
        if let Some(ms) = entry.min_delay_ms {
            self.min_interval = Duration::from_millis(ms);
        }
        if let Some(rps) = entry.max_requests_per_second {
            self.requests_per_second = rps;
        }
        if let Some(budget) = entry.in_flight_budget {
            self.in_flight_budget = budget.max(1);
        }
        if let Some(ms) = entry.backoff_base_ms {
            self.backoff_base = Duration::from_millis(ms);
        }
        if let Some(multiplier) = entry.backoff_multiplier {
            self.backoff_multiplier = multiplier;
        }
        if let Some(ms) = entry.backoff_ceiling_ms {
            self.backoff_ceiling = Duration::from_millis(ms);
        }
        if let Some(adaptive) = entry.adaptive_delay {
            self.adaptive = adaptive;
        }
        self
    }

    /// Backoff delay after `failures` consecutive failures
    ///
    /// `base * multiplier^failures`, capped at the ceiling.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(failures.min(i32::MAX as u32) as i32);
        let secs = self.backoff_base.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.backoff_ceiling.as_secs_f64() {
            return self.backoff_ceiling;
        }
        Duration::from_secs_f64(secs)
    }

    /// Token bucket refilled at the configured rate, holding as many tokens as
    /// the in-flight budget
    fn quota(&self) -> Quota {
        let period = Duration::try_from_secs_f64(1.0 / self.requests_per_second)
            .unwrap_or(Duration::from_secs(1))
            .max(Duration::from_nanos(1));
        let burst = NonZeroU32::new(self.in_flight_budget).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst)
    }
}

/// Where an origin stands with its robots.txt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsStatus {
    /// Never fetched, or the cached rules expired
    Missing,
    /// A worker is fetching it now
    Fetching,
    Ready,
}

/// Per-origin crawling state
pub struct OriginPolicy {
    origin: Origin,
    params: PacingParams,
    robots_rules: Option<ParsedRobots>,
    robots_fetched_at: Option<DateTime<Utc>>,
    robots_loaded_at: Option<Instant>,
    robots_fetching: bool,
    robots_delay: Option<Duration>,
    in_flight: u32,
    consecutive_failures: u32,
    backoff_until: Option<Instant>,
    last_request_at: Option<Instant>,
    observed_latency: Option<Duration>,
    requests_dispatched: u64,
    limiter: DefaultDirectRateLimiter,
}

impl OriginPolicy {
    pub fn new(origin: Origin, params: PacingParams) -> Self {
        let limiter = RateLimiter::direct(params.quota());
        Self {
            origin,
            params,
            robots_rules: None,
            robots_fetched_at: None,
            robots_loaded_at: None,
            robots_fetching: false,
            robots_delay: None,
            in_flight: 0,
            consecutive_failures: 0,
            backoff_until: None,
            last_request_at: None,
            observed_latency: None,
            requests_dispatched: 0,
            limiter,
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn params(&self) -> &PacingParams {
        &self.params
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn backoff_until(&self) -> Option<Instant> {
        self.backoff_until
    }

    pub fn robots_rules(&self) -> Option<&ParsedRobots> {
        self.robots_rules.as_ref()
    }

    /// The interval actually enforced between request starts
    ///
    /// The largest of the configured minimum, the robots Crawl-delay, and,
    /// with adaptive pacing, the observed response latency.
    pub fn effective_interval(&self) -> Duration {
        let mut interval = self.params.min_interval;
        if let Some(delay) = self.robots_delay {
            interval = interval.max(delay);
        }
        if self.params.adaptive {
            if let Some(latency) = self.observed_latency {
                interval = interval.max(latency);
            }
        }
        interval
    }

    pub fn robots_status(&self, now: Instant, ttl: Duration) -> RobotsStatus {
        if self.robots_fetching {
            return RobotsStatus::Fetching;
        }
        match self.robots_loaded_at {
            Some(loaded) if now.saturating_duration_since(loaded) < ttl => RobotsStatus::Ready,
            _ => RobotsStatus::Missing,
        }
    }

    /// Marks the robots file as being fetched; the fetch counts as a request start
    pub fn begin_robots_fetch(&mut self, now: Instant) {
        self.robots_fetching = true;
        self.last_request_at = Some(now);
    }

    /// Installs freshly fetched robots rules
    pub fn set_robots(&mut self, rules: ParsedRobots, crawl_delay: Option<Duration>, now: Instant) {
        self.robots_rules = Some(rules);
        self.robots_delay = crawl_delay;
        self.robots_fetched_at = Some(Utc::now());
        self.robots_loaded_at = Some(now);
        self.robots_fetching = false;
    }

    /// Time until backoff and the minimum interval both allow a request
    ///
    /// Ignores the in-flight budget; used for pacing redirect hops of a
    /// request that already holds a slot.
    pub fn pacing_wait(&self, now: Instant) -> Option<Duration> {
        let mut wait = Duration::ZERO;

        if let Some(until) = self.backoff_until {
            wait = wait.max(until.saturating_duration_since(now));
        }

        if let Some(last) = self.last_request_at {
            let next = last + self.effective_interval();
            wait = wait.max(next.saturating_duration_since(now));
        }

        (!wait.is_zero()).then_some(wait)
    }

    /// Whether the in-flight budget is used up
    pub fn budget_exhausted(&self) -> bool {
        self.in_flight >= self.params.in_flight_budget
    }

    /// Takes a token from the bucket, or reports how long until one is available
    pub fn try_take_token(&self) -> Result<(), Duration> {
        use governor::clock::{Clock, DefaultClock};

        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }

    /// Records a dispatched request: one more in flight, start time noted
    pub fn record_dispatch(&mut self, now: Instant) {
        self.in_flight += 1;
        self.requests_dispatched += 1;
        self.last_request_at = Some(now);
    }

    /// Records an inline redirect hop
    pub fn record_hop(&mut self, now: Instant) {
        self.requests_dispatched += 1;
        self.last_request_at = Some(now);
    }

    /// Folds a finished request into the backoff and latency state
    pub fn record_release(&mut self, outcome: &FetchOutcome, now: Instant) {
        self.in_flight = self.in_flight.saturating_sub(1);

        if outcome.is_backoff_signal() {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            let mut delay = self.params.backoff_delay(self.consecutive_failures);
            if let Some(hint) = outcome.retry_after() {
                delay = delay.max(hint).min(self.params.backoff_ceiling);
            }
            self.backoff_until = Some(now + delay);
            tracing::debug!(
                "Backing off {} for {:?} after {} consecutive failures",
                self.origin,
                delay,
                self.consecutive_failures
            );
            return;
        }

        if let FetchOutcome::Success { elapsed, .. } = outcome {
            self.consecutive_failures = 0;
            self.backoff_until = None;
            self.observed_latency = Some(match self.observed_latency {
                Some(previous) => previous.mul_f64(1.0 - LATENCY_SMOOTHING) + elapsed.mul_f64(LATENCY_SMOOTHING),
                None => *elapsed,
            });
        }
    }

    pub fn snapshot(&self) -> OriginSnapshot {
        OriginSnapshot {
            origin: self.origin.clone(),
            requests_dispatched: self.requests_dispatched,
            consecutive_failures: self.consecutive_failures,
            effective_interval_ms: self.effective_interval().as_millis() as u64,
            robots_fetched_at: self.robots_fetched_at,
            in_backoff: self.backoff_until.is_some_and(|until| until > Instant::now()),
        }
    }
}

/// Point-in-time view of one origin, for reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginSnapshot {
    pub origin: Origin,
    pub requests_dispatched: u64,
    pub consecutive_failures: u32,
    pub effective_interval_ms: u64,
    pub robots_fetched_at: Option<DateTime<Utc>>,
    pub in_backoff: bool,
}

/// Sharded map of origin policies, created on first use
pub struct PolicyStore {
    policies: DashMap<Origin, OriginPolicy>,
    defaults: PacingParams,
    overrides: HashMap<Origin, PacingParams>,
}

impl PolicyStore {
    /// Builds a store from the politeness configuration
    ///
    /// Override entries whose origin does not parse are skipped; validation
    /// rejects them before a session starts.
    pub fn new(config: &PolitenessConfig) -> Self {
        let defaults = PacingParams::from_config(config);
        let overrides = config
            .overrides
            .iter()
            .filter_map(|entry| {
                let origin = Origin::parse(&entry.origin)?;
                Some((origin, defaults.clone().with_override(entry)))
            })
            .collect();

        Self {
            policies: DashMap::new(),
            defaults,
            overrides,
        }
    }

    /// Pacing parameters that apply to an origin
    pub fn params_for(&self, origin: &Origin) -> PacingParams {
        self.overrides
            .get(origin)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }

    /// Locks the policy of an origin, creating it if needed
    pub fn entry(&self, origin: &Origin) -> RefMut<'_, Origin, OriginPolicy> {
        self.policies
            .entry(origin.clone())
            .or_insert_with(|| OriginPolicy::new(origin.clone(), self.params_for(origin)))
    }

    /// Runs a read-only closure against an existing policy
    pub fn inspect<T>(&self, origin: &Origin, f: impl FnOnce(&OriginPolicy) -> T) -> Option<T> {
        self.policies.get(origin).map(|policy| f(&policy))
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Snapshots every known origin, sorted by origin
    pub fn snapshots(&self) -> Vec<OriginSnapshot> {
        let mut snapshots: Vec<OriginSnapshot> =
            self.policies.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.origin.cmp(&b.origin));
        snapshots
    }
}
