//! Decision metrics
//!
//! Thread-safe counters for access decisions, split by the path that produced
//! them, plus a bounded log of recent decisions for auditing.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant, SystemTime};

/// How a decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Engine disabled, everything allowed
    Bypassed,
    /// Allowed as the resource owner
    Owner,
    /// Allowed by a direct rule
    DirectRule,
    /// Allowed by a rule on one of the resource's groups
    GroupRule,
    /// Denied, either by an insufficient rule or by default
    Denied,
    /// No decision could be reached
    Undetermined,
}

impl Outcome {
    pub fn is_allowed(self) -> bool {
        matches!(
            self,
            Outcome::Bypassed | Outcome::Owner | Outcome::DirectRule | Outcome::GroupRule
        )
    }
}

/// Record of a recent decision
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub user_id: u64,
    pub resource: String,
    pub action: String,
    pub outcome: Outcome,
    pub duration_us: u64,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Overall metrics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub total: u64,
    pub bypassed: u64,
    pub owner: u64,
    pub direct_rule: u64,
    pub group_rule: u64,
    pub denied: u64,
    pub undetermined: u64,
    pub recent: Vec<DecisionRecord>,
}

/// Decision metrics collector
pub struct DecisionMetrics {
    start_time: Instant,
    bypassed: AtomicU64,
    owner: AtomicU64,
    direct_rule: AtomicU64,
    group_rule: AtomicU64,
    denied: AtomicU64,
    undetermined: AtomicU64,
    recent: RwLock<VecDeque<DecisionRecord>>,
    max_recent: usize,
}

impl DecisionMetrics {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Create a collector keeping at most `max_recent` decision records
    pub fn with_capacity(max_recent: usize) -> Self {
        Self {
            start_time: Instant::now(),
            bypassed: AtomicU64::new(0),
            owner: AtomicU64::new(0),
            direct_rule: AtomicU64::new(0),
            group_rule: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            undetermined: AtomicU64::new(0),
            recent: RwLock::new(VecDeque::with_capacity(max_recent)),
            max_recent,
        }
    }

    fn write_recent(&self) -> RwLockWriteGuard<'_, VecDeque<DecisionRecord>> {
        self.recent.write().unwrap_or_else(|poisoned| {
            tracing::warn!("metrics lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_recent(&self) -> RwLockReadGuard<'_, VecDeque<DecisionRecord>> {
        self.recent.read().unwrap_or_else(|poisoned| {
            tracing::warn!("metrics lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn counter(&self, outcome: Outcome) -> &AtomicU64 {
        match outcome {
            Outcome::Bypassed => &self.bypassed,
            Outcome::Owner => &self.owner,
            Outcome::DirectRule => &self.direct_rule,
            Outcome::GroupRule => &self.group_rule,
            Outcome::Denied => &self.denied,
            Outcome::Undetermined => &self.undetermined,
        }
    }

    /// Record one decision
    pub fn record(
        &self,
        user_id: u64,
        resource: &str,
        action: &str,
        outcome: Outcome,
        duration: Duration,
        detail: Option<&str>,
    ) {
        self.counter(outcome).fetch_add(1, Ordering::Relaxed);

        if self.max_recent == 0 {
            return;
        }
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut recent = self.write_recent();
        if recent.len() >= self.max_recent {
            recent.pop_front();
        }
        recent.push_back(DecisionRecord {
            user_id,
            resource: resource.to_string(),
            action: action.to_string(),
            outcome,
            duration_us: duration.as_micros() as u64,
            timestamp,
            detail: detail.map(String::from),
        });
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        self.counter(outcome).load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        [
            Outcome::Bypassed,
            Outcome::Owner,
            Outcome::DirectRule,
            Outcome::GroupRule,
            Outcome::Denied,
            Outcome::Undetermined,
        ]
        .into_iter()
        .map(|outcome| self.count(outcome))
        .sum()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let recent = self.read_recent().iter().cloned().collect();
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            total: self.total(),
            bypassed: self.count(Outcome::Bypassed),
            owner: self.count(Outcome::Owner),
            direct_rule: self.count(Outcome::DirectRule),
            group_rule: self.count(Outcome::GroupRule),
            denied: self.count(Outcome::Denied),
            undetermined: self.count(Outcome::Undetermined),
            recent,
        }
    }
}

impl Default for DecisionMetrics {
    fn default() -> Self {
        Self::new()
    }
}
