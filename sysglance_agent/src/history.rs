//! Time-windowed metric history shared between the sampler (sole writer)
//! and request handlers (readers).

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::types::{HistoryPoint, MetricKind};

pub const DEFAULT_WINDOW_MS: i64 = 60_000;

/// Ordered (time, value) points for one metric, bounded by age rather than count.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    points: VecDeque<HistoryPoint>,
    window_ms: i64,
}

impl HistoryRing {
    pub fn new(window_ms: i64) -> Self {
        Self {
            points: VecDeque::with_capacity(64),
            window_ms,
        }
    }

    /// Append, then drop everything older than the window relative to `time`.
    /// Non-finite values are stored as 0.0.
    pub fn push(&mut self, time: i64, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        // A timestamp behind the newest point (clock step back) is pinned to it
        // so the sequence stays non-decreasing.
        let time = match self.points.back() {
            Some(last) if last.time > time => last.time,
            _ => time,
        };
        self.points.push_back(HistoryPoint { time, value });
        self.prune(time);
    }

    fn prune(&mut self, now: i64) {
        while let Some(front) = self.points.front() {
            if now - front.time > self.window_ms {
                self.points.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn to_vec(&self) -> Vec<HistoryPoint> {
        self.points.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One independently locked ring per metric.
///
/// Locks are only held for the duration of a push or a copy, never across
/// an await or an OS call.
#[derive(Debug)]
pub struct MetricHistory {
    cpu: Mutex<HistoryRing>,
    memory: Mutex<HistoryRing>,
    disk: Mutex<HistoryRing>,
    network: Mutex<HistoryRing>,
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

impl MetricHistory {
    pub fn new(window_ms: i64) -> Self {
        Self {
            cpu: Mutex::new(HistoryRing::new(window_ms)),
            memory: Mutex::new(HistoryRing::new(window_ms)),
            disk: Mutex::new(HistoryRing::new(window_ms)),
            network: Mutex::new(HistoryRing::new(window_ms)),
        }
    }

    fn ring(&self, metric: MetricKind) -> &Mutex<HistoryRing> {
        match metric {
            MetricKind::Cpu => &self.cpu,
            MetricKind::Memory => &self.memory,
            MetricKind::Disk => &self.disk,
            MetricKind::Network => &self.network,
        }
    }

    pub fn append(&self, metric: MetricKind, time: i64, value: f64) {
        self.ring(metric)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(time, value);
    }

    /// Owned copy of one metric's points, oldest first.
    pub fn read(&self, metric: MetricKind) -> Vec<HistoryPoint> {
        self.ring(metric)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    pub fn read_all(&self) -> BTreeMap<MetricKind, Vec<HistoryPoint>> {
        MetricKind::ALL
            .iter()
            .map(|&m| (m, self.read(m)))
            .collect()
    }
}
