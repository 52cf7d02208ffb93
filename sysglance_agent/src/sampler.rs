//! Background sampler: once per period, reads system counters, appends each metric
//! to its history ring, and hands the snapshot to the broadcaster.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::broadcast::Broadcaster;
use crate::history::MetricHistory;
use crate::probe::{SystemCounters, SystemProbe};
use crate::types::{MetricKind, Snapshot};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Floor for reported CPU so an idle host is distinguishable from "no reading".
pub const MIN_CPU_PERCENT: f64 = 0.1;

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Turn raw counters into a snapshot, substituting neutral defaults for
/// unavailable sub-metrics and recording which ones were substituted.
pub fn snapshot_from(counters: SystemCounters, timestamp: i64) -> Snapshot {
    let mut degraded = Vec::new();

    let disk_percent = match counters.disk_percent {
        Ok(v) => v,
        Err(e) => {
            warn!(metric = "disk", reason = %e.reason, "sub-metric unavailable; using 0.0");
            degraded.push(MetricKind::Disk);
            0.0
        }
    };
    let network_total_bytes = match counters.network {
        Ok(n) => n.total(),
        Err(e) => {
            warn!(metric = "network", reason = %e.reason, "sub-metric unavailable; using 0");
            degraded.push(MetricKind::Network);
            0
        }
    };

    Snapshot {
        timestamp,
        cpu_percent: counters.cpu_percent.max(MIN_CPU_PERCENT).min(100.0),
        memory_percent: counters.memory_percent,
        disk_percent,
        network_total_bytes,
        degraded,
    }
}

/// One tick without the broadcast: read, record, return.
pub fn sample_once(probe: &dyn SystemProbe, history: &MetricHistory) -> anyhow::Result<Arc<Snapshot>> {
    let counters = probe.system_counters()?;
    let snapshot = snapshot_from(counters, now_ms());
    for metric in MetricKind::ALL {
        history.append(metric, snapshot.timestamp, snapshot.value_of(metric));
    }
    Ok(Arc::new(snapshot))
}

/// Running sampler task. Dropping the handle also stops the task.
pub struct SamplerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Signal shutdown and wait for the current tick to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("sampler task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub fn spawn_sampler(
    probe: Arc<dyn SystemProbe>,
    history: Arc<MetricHistory>,
    broadcaster: Broadcaster,
    period: Duration,
) -> SamplerHandle {
    let (shutdown, mut stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis() as u64, "sampler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }
            // The probe does blocking syscalls; keep them off the runtime threads.
            let tick = {
                let probe = Arc::clone(&probe);
                let history = Arc::clone(&history);
                tokio::task::spawn_blocking(move || sample_once(probe.as_ref(), &history)).await
            };
            match tick {
                Ok(Ok(snapshot)) => {
                    broadcaster.publish(snapshot).await;
                }
                Ok(Err(e)) => error!("sampling tick failed: {e:#}"),
                Err(e) => error!("sampling task aborted: {e}"),
            }
        }
        info!("sampler stopped");
    });
    SamplerHandle { shutdown, task }
}
