//! Crawl frontier
//!
//! The global work queue, partitioned by origin. Each partition is a FIFO, so
//! one origin is crawled roughly breadth-first; across origins the partition
//! whose front entry was discovered first is offered to the gate first.

use crate::politeness::{GateDecision, PolitenessGate};
use crate::url::{Address, Origin};
use dashmap::{DashMap, DashSet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// An address waiting to be fetched
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub address: Address,
    /// Link distance from the nearest seed
    pub depth: u32,
    pub discovered_from: Option<Address>,
    pub enqueued_at: Instant,
    /// Session-wide discovery sequence; lower means older
    pub seq: u64,
}

/// Result of offering an address to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Already visited in this session
    Duplicate,
    /// Deeper than the configured maximum
    TooDeep,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Work handed to a worker by [`Frontier::next_ready`]
#[derive(Debug)]
pub enum Dispatch {
    /// Fetch this entry; a gate slot has been reserved for it
    Fetch(FrontierEntry),
    /// Robots exclusion forbids this entry; record it without fetching
    Disallowed(FrontierEntry),
    /// Fetch this origin's robots.txt before its partition can proceed
    FetchRobots(Origin),
}

/// Origin-partitioned, deduplicated, depth-bounded work queue
pub struct Frontier {
    max_depth: u32,
    visited: DashSet<Address>,
    partitions: DashMap<Origin, VecDeque<FrontierEntry>>,
    seq: AtomicU64,
    /// Entries accepted but not yet completed
    outstanding: AtomicUsize,
}

impl Frontier {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth,
            visited: DashSet::new(),
            partitions: DashMap::new(),
            seq: AtomicU64::new(0),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Offers an address to the frontier
    ///
    /// The visited-set insertion decides: when two workers discover the same
    /// address concurrently, exactly one of them gets [`Admission::Accepted`].
    pub fn enqueue(&self, address: Address, depth: u32, parent: Option<&Address>) -> Admission {
        if depth > self.max_depth {
            return Admission::TooDeep;
        }

        if !self.visited.insert(address.clone()) {
            return Admission::Duplicate;
        }

        // Counted before the entry becomes visible, so outstanding work never
        // reads as zero while an entry sits in a partition.
        self.outstanding.fetch_add(1, Ordering::SeqCst);

        let entry = FrontierEntry {
            depth,
            discovered_from: parent.cloned(),
            enqueued_at: Instant::now(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            address,
        };

        self.partitions
            .entry(entry.address.origin().clone())
            .or_default()
            .push_back(entry);

        Admission::Accepted
    }

    /// Marks an address visited without queueing it
    ///
    /// Used for redirect targets fetched inline by the request that found
    /// them. Returns false when the address was already visited, in which case
    /// the caller must not fetch it.
    pub fn claim(&self, address: &Address) -> bool {
        self.visited.insert(address.clone())
    }

    /// Finds work that the gate permits right now
    ///
    /// Partitions are tried oldest front entry first. `None` means "nothing is
    /// eligible yet", not "done": use [`Frontier::outstanding`] for that.
    pub fn next_ready(&self, gate: &PolitenessGate) -> Option<Dispatch> {
        let mut candidates: Vec<(u64, Origin)> = self
            .partitions
            .iter()
            .filter_map(|partition| {
                partition
                    .value()
                    .front()
                    .map(|entry| (entry.seq, partition.key().clone()))
            })
            .collect();
        candidates.sort_unstable_by_key(|(seq, _)| *seq);

        for (_, origin) in candidates {
            let Some(mut partition) = self.partitions.get_mut(&origin) else {
                continue;
            };
            let Some(front) = partition.front() else {
                continue;
            };

            match gate.check(&origin, &front.address) {
                GateDecision::Allow => return partition.pop_front().map(Dispatch::Fetch),
                GateDecision::Disallow => return partition.pop_front().map(Dispatch::Disallowed),
                GateDecision::NeedsRobots => return Some(Dispatch::FetchRobots(origin)),
                GateDecision::Wait(_) => continue,
            }
        }

        None
    }

    /// Smallest time until some non-empty partition's origin may become eligible
    ///
    /// Returns `None` when every partition is empty.
    pub fn soonest_ready(&self, gate: &PolitenessGate) -> Option<Duration> {
        let origins: Vec<Origin> = self
            .partitions
            .iter()
            .filter(|partition| !partition.value().is_empty())
            .map(|partition| partition.key().clone())
            .collect();

        origins
            .iter()
            .map(|origin| gate.estimate_wait(origin))
            .min()
    }

    /// Marks a dispatched entry as fully processed
    ///
    /// Must be called after the entry's children were enqueued. Returns true
    /// when this completion left no outstanding work.
    pub fn complete(&self) -> bool {
        self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1
    }

    /// Entries accepted but not yet completed
    ///
    /// Zero exactly when every partition is empty and no worker holds an entry.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Whether every partition is empty
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(|partition| partition.value().is_empty())
    }

    /// Entries waiting in partitions
    pub fn pending(&self) -> usize {
        self.partitions.iter().map(|partition| partition.value().len()).sum()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn is_visited(&self, address: &Address) -> bool {
        self.visited.contains(address)
    }
}
