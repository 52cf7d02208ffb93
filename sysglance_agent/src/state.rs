//! Shared agent state and the on-demand query operations served to clients.
//!
//! The sampler writes history; everything here only reads it. Probe calls run on
//! the blocking pool so no handler stalls the runtime or holds a history lock
//! while the OS answers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::analysis::{self, TextGenerator};
use crate::broadcast::Broadcaster;
use crate::control::{self, PriorityChange};
use crate::error::ControlError;
use crate::history::MetricHistory;
use crate::probe::SystemProbe;
use crate::sampler::{now_ms, snapshot_from};
use crate::types::{
    HistoryPoint, MetricKind, PriorityDirection, ProcessAnalysis, ProcessInfo, Snapshot,
    SystemAnalysis, SystemData, TopCpuProcess, TopMemoryProcess,
};

const TOP_N: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub probe: Arc<dyn SystemProbe>,
    pub history: Arc<MetricHistory>,
    pub broadcaster: Broadcaster,
    pub generator: Arc<dyn TextGenerator>,
}

impl AppState {
    pub fn new(
        probe: Arc<dyn SystemProbe>,
        history: Arc<MetricHistory>,
        broadcaster: Broadcaster,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            probe,
            history,
            broadcaster,
            generator,
        }
    }

    async fn with_probe<T, F>(&self, f: F) -> Result<T, ControlError>
    where
        F: FnOnce(&dyn SystemProbe) -> T + Send + 'static,
        T: Send + 'static,
    {
        let probe = Arc::clone(&self.probe);
        tokio::task::spawn_blocking(move || f(probe.as_ref()))
            .await
            .map_err(|e| ControlError::Other(format!("probe task failed: {e}")))
    }

    /// Fresh reading straight from the probe; history is left untouched.
    pub async fn current(&self) -> Result<Snapshot, ControlError> {
        let counters = self
            .with_probe(|p| p.system_counters())
            .await?
            .map_err(|e| ControlError::Other(format!("{e:#}")))?;
        Ok(snapshot_from(counters, now_ms()))
    }

    pub fn history(&self) -> BTreeMap<MetricKind, Vec<HistoryPoint>> {
        self.history.read_all()
    }

    pub async fn processes(&self) -> Result<Vec<ProcessInfo>, ControlError> {
        self.with_probe(|p| p.enumerate_processes()).await
    }

    pub async fn adjust_priority(
        &self,
        pid: u32,
        direction: PriorityDirection,
    ) -> Result<PriorityChange, ControlError> {
        self.with_probe(move |p| control::adjust_priority(p, pid, direction))
            .await?
    }

    pub async fn terminate(&self, pid: u32) -> Result<(), ControlError> {
        self.with_probe(move |p| control::terminate(p, pid)).await?
    }

    /// Three independent prompts about one process. Upstream failures become
    /// error text in their slot; a missing process is an error.
    pub async fn analyze_process(&self, pid: u32) -> Result<ProcessAnalysis, ControlError> {
        let info = self.with_probe(move |p| p.process_info(pid)).await??;
        debug!(pid, name = %info.name, "analyzing process");

        let generator = self.generator.as_ref();
        let behaviour = analysis::process_behaviour_prompt(&info);
        let anomaly = analysis::anomaly_prompt(&info);
        let recommendation = analysis::recommendation_prompt(&info);
        let (analysis, anomalies, recommendations) = tokio::join!(
            analysis::generate_text(generator, &behaviour),
            analysis::generate_text(generator, &anomaly),
            analysis::generate_text(generator, &recommendation),
        );
        Ok(ProcessAnalysis {
            analysis,
            anomalies,
            recommendations,
        })
    }

    pub async fn system_data(&self) -> Result<SystemData, ControlError> {
        let (counters, processes) = self
            .with_probe(|p| (p.system_counters(), p.enumerate_processes()))
            .await?;
        let counters = counters.map_err(|e| ControlError::Other(format!("{e:#}")))?;
        let network = counters.network.clone().unwrap_or_default();
        let snapshot = snapshot_from(counters, now_ms());
        Ok(SystemData {
            cpu_percent: snapshot.cpu_percent,
            memory_percent: snapshot.memory_percent,
            disk_percent: snapshot.disk_percent,
            network_bytes_sent: network.bytes_sent,
            network_bytes_recv: network.bytes_recv,
            top_cpu_processes: top_by_cpu(&processes),
            top_memory_processes: top_by_memory(&processes),
        })
    }

    pub async fn analyze_system(&self) -> Result<SystemAnalysis, ControlError> {
        let system_data = self.system_data().await?;
        let prompt = analysis::system_prompt(&system_data);
        let analysis = analysis::generate_text(self.generator.as_ref(), &prompt).await;
        Ok(SystemAnalysis {
            analysis,
            system_data,
        })
    }
}

pub fn top_by_cpu(processes: &[ProcessInfo]) -> Vec<TopCpuProcess> {
    let mut sorted: Vec<&ProcessInfo> = processes.iter().collect();
    sorted.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    sorted
        .into_iter()
        .take(TOP_N)
        .map(|p| TopCpuProcess {
            pid: p.pid,
            name: p.name.clone(),
            cpu_percent: p.cpu_percent,
        })
        .collect()
}

pub fn top_by_memory(processes: &[ProcessInfo]) -> Vec<TopMemoryProcess> {
    let mut sorted: Vec<&ProcessInfo> = processes.iter().collect();
    sorted.sort_by(|a, b| b.memory_percent.total_cmp(&a.memory_percent));
    sorted
        .into_iter()
        .take(TOP_N)
        .map(|p| TopMemoryProcess {
            pid: p.pid,
            name: p.name.clone(),
            memory_percent: p.memory_percent,
        })
        .collect()
}
