use crate::politeness::policy::{OriginSnapshot, PolicyStore, RobotsStatus};
use crate::robots::ParsedRobots;
use crate::state::FetchOutcome;
use crate::url::{Address, Origin};
use std::time::{Duration, Instant};

/// Re-check interval while another worker fetches an origin's robots.txt or
/// the origin's in-flight budget is used up
const RECHECK_INTERVAL: Duration = Duration::from_millis(25);

/// Answer of the gate for one candidate request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// A slot is reserved; the caller must [`PolitenessGate::release`] it
    Allow,
    /// Robots exclusion forbids the address
    Disallow,
    /// Robots rules are unknown and the caller has been chosen to fetch them
    NeedsRobots,
    /// Not now; try again after at most this long
    Wait(Duration),
}

/// Decides whether a request to an origin may proceed now
///
/// Enforces, per origin: robots exclusion, backoff after failures, the
/// in-flight budget, the minimum interval between request starts, and the
/// token bucket.
pub struct PolitenessGate {
    store: PolicyStore,
    agent_token: String,
    respect_robots: bool,
    robots_ttl: Duration,
}

impl PolitenessGate {
    /// Creates a gate
    ///
    /// # Arguments
    ///
    /// * `store` - Per-origin policy store
    /// * `agent_token` - Product token matched against robots.txt groups
    /// * `respect_robots` - Whether robots.txt is consulted at all
    /// * `robots_ttl` - How long fetched robots rules stay valid
    pub fn new(
        store: PolicyStore,
        agent_token: impl Into<String>,
        respect_robots: bool,
        robots_ttl: Duration,
    ) -> Self {
        Self {
            store,
            agent_token: agent_token.into(),
            respect_robots,
            robots_ttl,
        }
    }

    pub fn agent_token(&self) -> &str {
        &self.agent_token
    }

    /// Checks whether a request for `address` may start now
    ///
    /// On [`GateDecision::Allow`] the slot is already reserved: the in-flight
    /// counter is incremented, the start time recorded and a token consumed.
    pub fn check(&self, origin: &Origin, address: &Address) -> GateDecision {
        self.check_at(origin, address, Instant::now())
    }

    pub fn check_at(&self, origin: &Origin, address: &Address, now: Instant) -> GateDecision {
        let mut policy = self.store.entry(origin);

        if self.respect_robots {
            match policy.robots_status(now, self.robots_ttl) {
                RobotsStatus::Fetching => return GateDecision::Wait(RECHECK_INTERVAL),
                RobotsStatus::Missing => {
                    // A stale refetch still has to respect pacing.
                    if let Some(wait) = policy.pacing_wait(now) {
                        return GateDecision::Wait(wait);
                    }
                    policy.begin_robots_fetch(now);
                    tracing::trace!("{}: robots.txt needed", origin);
                    return GateDecision::NeedsRobots;
                }
                RobotsStatus::Ready => {
                    let allowed = policy
                        .robots_rules()
                        .map_or(true, |rules| rules.is_allowed(address.as_str(), &self.agent_token));
                    if !allowed {
                        tracing::trace!("{}: disallowed by robots.txt", address);
                        return GateDecision::Disallow;
                    }
                }
            }
        }

        if let Some(wait) = policy.pacing_wait(now) {
            tracing::trace!("{}: pacing, wait {:?}", origin, wait);
            return GateDecision::Wait(wait);
        }

        if policy.budget_exhausted() {
            return GateDecision::Wait(RECHECK_INTERVAL);
        }

        if let Err(wait) = policy.try_take_token() {
            tracing::trace!("{}: token bucket empty, wait {:?}", origin, wait);
            return GateDecision::Wait(wait.max(Duration::from_millis(1)));
        }

        policy.record_dispatch(now);
        GateDecision::Allow
    }

    /// Estimates how long until `origin` may become eligible, without reserving anything
    pub fn estimate_wait(&self, origin: &Origin) -> Duration {
        let now = Instant::now();
        self.store
            .inspect(origin, |policy| {
                let pacing = policy.pacing_wait(now).unwrap_or(Duration::ZERO);
                if policy.robots_status(now, self.robots_ttl) == RobotsStatus::Fetching
                    || policy.budget_exhausted()
                {
                    return pacing.max(RECHECK_INTERVAL);
                }
                pacing
            })
            .unwrap_or(Duration::ZERO)
    }

    /// Releases a slot reserved by [`GateDecision::Allow`] and feeds the outcome
    /// into the origin's backoff and latency state
    pub fn release(&self, origin: &Origin, outcome: &FetchOutcome) {
        self.store.entry(origin).record_release(outcome, Instant::now());
    }

    /// Installs robots rules fetched after [`GateDecision::NeedsRobots`]
    pub fn store_robots(&self, origin: &Origin, rules: ParsedRobots) {
        let crawl_delay = rules.crawl_delay(&self.agent_token);
        if let Some(delay) = crawl_delay {
            tracing::debug!("{}: robots.txt requests a crawl delay of {:?}", origin, delay);
        }
        self.store
            .entry(origin)
            .set_robots(rules, crawl_delay, Instant::now());
    }

    /// Whether a redirect hop to `target` may be followed by a request that
    /// holds a slot on `holder`
    ///
    /// Only hops within the holder's origin qualify, and only when the cached
    /// robots rules are current and allow the target. Anything else has to go
    /// through the frontier like a newly discovered link.
    pub fn permits_inline_hop(&self, holder: &Origin, target: &Address) -> bool {
        if target.origin() != holder {
            return false;
        }
        if !self.respect_robots {
            return true;
        }

        let now = Instant::now();
        self.store
            .inspect(holder, |policy| {
                policy.robots_status(now, self.robots_ttl) == RobotsStatus::Ready
                    && policy
                        .robots_rules()
                        .map_or(true, |rules| rules.is_allowed(target.as_str(), &self.agent_token))
            })
            .unwrap_or(false)
    }

    /// Waits until another request to `origin` respects its pacing and token
    /// bucket, then records it as a request start
    ///
    /// Used for redirect hops and robots.txt redirects. Does not touch the
    /// in-flight budget: the request belongs to one that already holds the
    /// origin's slot or robots fetch.
    pub async fn pace(&self, origin: &Origin) {
        loop {
            let wait = {
                let mut policy = self.store.entry(origin);
                let now = Instant::now();
                match policy.pacing_wait(now) {
                    Some(wait) => wait,
                    None => match policy.try_take_token() {
                        Ok(()) => {
                            policy.record_hop(now);
                            return;
                        }
                        Err(wait) => wait.max(Duration::from_millis(1)),
                    },
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    pub fn snapshots(&self) -> Vec<OriginSnapshot> {
        self.store.snapshots()
    }
}
