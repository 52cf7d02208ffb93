//! Scripted stand-ins for the OS probe and the text-generation service.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sysglance_agent::analysis::TextGenerator;
use sysglance_agent::broadcast::Broadcaster;
use sysglance_agent::error::{ControlError, Unavailable, UpstreamFailure};
use sysglance_agent::history::MetricHistory;
use sysglance_agent::probe::{NetCounters, SystemCounters, SystemProbe};
use sysglance_agent::state::AppState;
use sysglance_agent::types::ProcessInfo;

pub struct FakeProbe {
    pub cpu: Mutex<f64>,
    pub memory: Mutex<f64>,
    pub disk: Mutex<f64>,
    pub net: Mutex<NetCounters>,
    pub fail_disk: AtomicBool,
    pub fail_network: AtomicBool,
    pub fail_all: AtomicBool,
    pub counter_calls: AtomicUsize,
    /// How long each counter read blocks the calling thread.
    pub counter_delay: Mutex<Duration>,
    /// pid -> (info, nice)
    pub processes: Mutex<HashMap<u32, (ProcessInfo, i32)>>,
    /// pids the caller may look at but not touch
    pub protected: Mutex<HashSet<u32>>,
    pub terminated: Mutex<Vec<u32>>,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            cpu: Mutex::new(25.0),
            memory: Mutex::new(50.0),
            disk: Mutex::new(75.0),
            net: Mutex::new(NetCounters {
                bytes_sent: 1_000,
                bytes_recv: 2_000,
            }),
            fail_disk: AtomicBool::new(false),
            fail_network: AtomicBool::new(false),
            fail_all: AtomicBool::new(false),
            counter_calls: AtomicUsize::new(0),
            counter_delay: Mutex::new(Duration::ZERO),
            processes: Mutex::new(HashMap::new()),
            protected: Mutex::new(HashSet::new()),
            terminated: Mutex::new(Vec::new()),
        }
    }
}

pub fn process(pid: u32, name: &str, cpu: f64, mem: f64) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        cpu_percent: cpu,
        memory_percent: mem,
        owner: Some("tester".into()),
        thread_count: Some(4),
        start_time: "2024-01-01 12:00:00".into(),
    }
}

impl FakeProbe {
    pub fn with_process(self, info: ProcessInfo, nice: i32) -> Self {
        self.processes.lock().unwrap().insert(info.pid, (info, nice));
        self
    }

    pub fn protect(self, pid: u32) -> Self {
        self.protected.lock().unwrap().insert(pid);
        self
    }

    pub fn nice_of(&self, pid: u32) -> Option<i32> {
        self.processes.lock().unwrap().get(&pid).map(|(_, n)| *n)
    }

    fn guard(&self, pid: u32) -> Result<(), ControlError> {
        if !self.processes.lock().unwrap().contains_key(&pid) {
            return Err(ControlError::NotFound(pid));
        }
        if self.protected.lock().unwrap().contains(&pid) {
            return Err(ControlError::PermissionDenied(pid));
        }
        Ok(())
    }
}

impl SystemProbe for FakeProbe {
    fn system_counters(&self) -> anyhow::Result<SystemCounters> {
        self.counter_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.counter_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.fail_all.load(Ordering::SeqCst) {
            anyhow::bail!("counters exploded");
        }
        Ok(SystemCounters {
            cpu_percent: *self.cpu.lock().unwrap(),
            memory_percent: *self.memory.lock().unwrap(),
            disk_percent: if self.fail_disk.load(Ordering::SeqCst) {
                Err(Unavailable::new("disk offline"))
            } else {
                Ok(*self.disk.lock().unwrap())
            },
            network: if self.fail_network.load(Ordering::SeqCst) {
                Err(Unavailable::new("no interfaces"))
            } else {
                Ok(*self.net.lock().unwrap())
            },
        })
    }

    fn enumerate_processes(&self) -> Vec<ProcessInfo> {
        let mut list: Vec<ProcessInfo> = self
            .processes
            .lock()
            .unwrap()
            .values()
            .map(|(p, _)| p.clone())
            .collect();
        list.sort_by_key(|p| p.pid);
        list
    }

    fn process_info(&self, pid: u32) -> Result<ProcessInfo, ControlError> {
        self.processes
            .lock()
            .unwrap()
            .get(&pid)
            .map(|(p, _)| p.clone())
            .ok_or(ControlError::NotFound(pid))
    }

    fn process_priority(&self, pid: u32) -> Result<i32, ControlError> {
        self.nice_of(pid).ok_or(ControlError::NotFound(pid))
    }

    fn set_process_priority(&self, pid: u32, value: i32) -> Result<(), ControlError> {
        self.guard(pid)?;
        assert!((-20..=19).contains(&value), "out-of-range nice {value}");
        if let Some(entry) = self.processes.lock().unwrap().get_mut(&pid) {
            entry.1 = value;
        }
        Ok(())
    }

    fn terminate_process(&self, pid: u32) -> Result<(), ControlError> {
        self.guard(pid)?;
        self.terminated.lock().unwrap().push(pid);
        Ok(())
    }
}

/// Echoes the first non-empty prompt line, or fails when told to.
#[derive(Default)]
pub struct StubGenerator {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(UpstreamFailure("503 Service Unavailable".into()));
        }
        let first = prompt
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        Ok(format!("insight: {first}"))
    }
}

pub struct Harness {
    pub probe: Arc<FakeProbe>,
    pub generator: Arc<StubGenerator>,
    pub state: AppState,
}

pub fn harness(probe: FakeProbe) -> Harness {
    let probe = Arc::new(probe);
    let generator = Arc::new(StubGenerator::default());
    let state = AppState::new(
        probe.clone(),
        Arc::new(MetricHistory::default()),
        Broadcaster::default(),
        generator.clone(),
    );
    Harness {
        probe,
        generator,
        state,
    }
}
