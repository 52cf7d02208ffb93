//! Data types sent to clients over HTTP and WebSocket.
//! Keep this module minimal and stable: it defines the wire format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four metrics tracked in history, in their wire spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::Network,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
            MetricKind::Network => "network",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable reading of all system-wide metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    /// Sent + received bytes across all interfaces since boot.
    pub network_total_bytes: u64,
    /// Sub-metrics that fell back to a neutral default on this tick.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<MetricKind>,
}

impl Snapshot {
    pub fn value_of(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::Cpu => self.cpu_percent,
            MetricKind::Memory => self.memory_percent,
            MetricKind::Disk => self.disk_percent,
            MetricKind::Network => self.network_total_bytes as f64,
        }
    }

    pub fn is_degraded(&self, metric: MetricKind) -> bool {
        self.degraded.contains(&metric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub time: i64,
    pub value: f64,
}

/// Point-in-time projection of one OS process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    #[serde(rename = "user")]
    pub owner: Option<String>,
    #[serde(rename = "threads")]
    pub thread_count: Option<usize>,
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub start_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCpuProcess {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopMemoryProcess {
    pub pid: u32,
    pub name: String,
    pub memory_percent: f64,
}

/// System-wide figures fed to the analysis prompt and echoed back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemData {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub network_bytes_sent: u64,
    pub network_bytes_recv: u64,
    pub top_cpu_processes: Vec<TopCpuProcess>,
    pub top_memory_processes: Vec<TopMemoryProcess>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessAnalysis {
    pub analysis: String,
    pub anomalies: String,
    pub recommendations: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAnalysis {
    pub analysis: String,
    pub system_data: SystemData,
}

/// Which way to move a process's scheduling priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityDirection {
    /// Be nicer: a larger nice value.
    Lower,
    /// Be greedier: a smaller nice value.
    Raise,
}

impl std::str::FromStr for PriorityDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lower" => Ok(PriorityDirection::Lower),
            "raise" => Ok(PriorityDirection::Raise),
            other => Err(format!("unknown action '{other}', expected 'lower' or 'raise'")),
        }
    }
}

/// Round to one decimal place, as shown on the dashboard.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
