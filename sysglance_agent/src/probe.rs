//! OS capability surface: system counters, process enumeration and process control.
//!
//! `SystemProbe` is the seam between the agent and the operating system. The
//! production implementation wraps persistent sysinfo handles; tests swap in a
//! scripted fake.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use chrono::{DateTime, Local};
use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, Networks, Pid, Process, ProcessRefreshKind,
    ProcessStatus, ProcessesToUpdate, RefreshKind, System, UpdateKind, Users,
};
use tracing::warn;

use crate::error::{ControlError, Unavailable};
use crate::types::{round1, ProcessInfo};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

impl NetCounters {
    pub fn total(&self) -> u64 {
        self.bytes_sent.saturating_add(self.bytes_recv)
    }
}

/// Raw system-wide counters. Disk and network may individually be unavailable.
#[derive(Debug, Clone)]
pub struct SystemCounters {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: Result<f64, Unavailable>,
    pub network: Result<NetCounters, Unavailable>,
}

pub trait SystemProbe: Send + Sync + 'static {
    /// Fails as a whole only when CPU/memory cannot be read at all.
    fn system_counters(&self) -> anyhow::Result<SystemCounters>;

    /// Live processes; ones that vanish or turn zombie mid-scan are skipped.
    fn enumerate_processes(&self) -> Vec<ProcessInfo>;

    fn process_info(&self, pid: u32) -> Result<ProcessInfo, ControlError>;

    /// Current nice value.
    fn process_priority(&self, pid: u32) -> Result<i32, ControlError>;

    fn set_process_priority(&self, pid: u32, value: i32) -> Result<(), ControlError>;

    /// Graceful termination request (SIGTERM on unix).
    fn terminate_process(&self, pid: u32) -> Result<(), ControlError>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn default_disk_mount() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("C:\\")
    } else {
        PathBuf::from("/")
    }
}

/// sysinfo-backed probe. Handles are kept alive across calls so CPU deltas work.
/// Counters and the process table use separate `System` handles so a full
/// process scan never holds up a sampling tick.
pub struct SysinfoProbe {
    sys: Mutex<System>,
    procs: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<Networks>,
    users: Mutex<Users>,
    disk_mount: PathBuf,
}

impl SysinfoProbe {
    pub fn new(disk_mount: PathBuf) -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        let mut sys = System::new_with_specifics(refresh_kind);
        // Baseline for the first CPU delta.
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        Self {
            sys: Mutex::new(sys),
            procs: Mutex::new(System::new()),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            users: Mutex::new(Users::new_with_refreshed_list()),
            disk_mount,
        }
    }

    fn disk_percent(&self) -> Result<f64, Unavailable> {
        let mut disks = lock(&self.disks);
        disks.refresh(true);
        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == self.disk_mount.as_path())
            .ok_or_else(|| {
                Unavailable::new(format!("no disk mounted at {}", self.disk_mount.display()))
            })?;
        let total = disk.total_space();
        if total == 0 {
            return Err(Unavailable::new(format!(
                "disk at {} reports zero capacity",
                self.disk_mount.display()
            )));
        }
        let used = total.saturating_sub(disk.available_space());
        Ok(used as f64 / total as f64 * 100.0)
    }

    fn network(&self) -> Result<NetCounters, Unavailable> {
        let mut nets = lock(&self.networks);
        nets.refresh(true);
        if nets.iter().next().is_none() {
            return Err(Unavailable::new("no network interfaces reported"));
        }
        Ok(nets.iter().fold(NetCounters::default(), |acc, (_, data)| {
            NetCounters {
                bytes_sent: acc.bytes_sent.saturating_add(data.total_transmitted()),
                bytes_recv: acc.bytes_recv.saturating_add(data.total_received()),
            }
        }))
    }

    fn process_refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing()
            .with_cpu()
            .with_memory()
            .with_user(UpdateKind::OnlyIfNotSet)
            .with_tasks()
    }
}

// Task refresh makes sysinfo list every Linux thread alongside its process.
fn is_listable(p: &Process) -> bool {
    p.thread_kind().is_none()
        && !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
}

pub fn format_start_time(unix_secs: u64) -> String {
    i64::try_from(unix_secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}

fn project(p: &Process, total_mem: u64, users: &Users) -> ProcessInfo {
    let memory_percent = if total_mem > 0 {
        p.memory() as f64 / total_mem as f64 * 100.0
    } else {
        0.0
    };
    ProcessInfo {
        pid: p.pid().as_u32(),
        name: p.name().to_string_lossy().into_owned(),
        cpu_percent: round1(p.cpu_usage() as f64),
        memory_percent: round1(memory_percent),
        owner: p
            .user_id()
            .and_then(|uid| users.get_user_by_id(uid))
            .map(|u| u.name().to_string()),
        thread_count: p.tasks().map(|t| t.len()),
        start_time: format_start_time(p.start_time()),
    }
}

impl SystemProbe for SysinfoProbe {
    fn system_counters(&self) -> anyhow::Result<SystemCounters> {
        let (cpu_percent, memory_percent) = {
            let mut sys = lock(&self.sys);
            std::panic::catch_unwind(AssertUnwindSafe(|| {
                sys.refresh_cpu_usage();
                sys.refresh_memory();
            }))
            .map_err(|e| anyhow!("sysinfo refresh panicked: {e:?}"))?;
            let total = sys.total_memory();
            let used = total.saturating_sub(sys.available_memory());
            let mem = if total > 0 {
                used as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            (sys.global_cpu_usage() as f64, mem)
        };

        Ok(SystemCounters {
            cpu_percent,
            memory_percent,
            disk_percent: self.disk_percent(),
            network: self.network(),
        })
    }

    fn enumerate_processes(&self) -> Vec<ProcessInfo> {
        let mut sys = lock(&self.procs);
        if let Err(e) = std::panic::catch_unwind(AssertUnwindSafe(|| {
            sys.refresh_memory();
            sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                Self::process_refresh_kind(),
            );
        })) {
            warn!("sysinfo process refresh panicked: {e:?}");
            return Vec::new();
        }
        let mut users = lock(&self.users);
        users.refresh();
        let total_mem = sys.total_memory();
        sys.processes()
            .values()
            .filter(|p| is_listable(p))
            .map(|p| project(p, total_mem, &users))
            .collect()
    }

    fn process_info(&self, pid: u32) -> Result<ProcessInfo, ControlError> {
        let mut sys = lock(&self.procs);
        let target = Pid::from_u32(pid);
        sys.refresh_memory();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            Self::process_refresh_kind(),
        );
        let total_mem = sys.total_memory();
        let process = sys
            .process(target)
            .filter(|p| is_listable(p))
            .ok_or(ControlError::NotFound(pid))?;
        let mut users = lock(&self.users);
        if process
            .user_id()
            .is_some_and(|uid| users.get_user_by_id(uid).is_none())
        {
            users.refresh();
        }
        Ok(project(process, total_mem, &users))
    }

    fn process_priority(&self, pid: u32) -> Result<i32, ControlError> {
        os::get_priority(pid)
    }

    fn set_process_priority(&self, pid: u32, value: i32) -> Result<(), ControlError> {
        os::set_priority(pid, value)
    }

    #[cfg(unix)]
    fn terminate_process(&self, pid: u32) -> Result<(), ControlError> {
        os::terminate(pid)
    }

    #[cfg(not(unix))]
    fn terminate_process(&self, pid: u32) -> Result<(), ControlError> {
        let mut sys = lock(&self.procs);
        let target = Pid::from_u32(pid);
        sys.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        let process = sys.process(target).ok_or(ControlError::NotFound(pid))?;
        let sent = process
            .kill_with(sysinfo::Signal::Term)
            .unwrap_or_else(|| process.kill());
        if sent {
            Ok(())
        } else {
            Err(ControlError::Other(format!("failed to terminate process {pid}")))
        }
    }
}

#[cfg(unix)]
mod os {
    use crate::error::ControlError;
    use std::io;

    fn map_errno(pid: u32, err: io::Error) -> ControlError {
        match err.raw_os_error() {
            Some(libc::ESRCH) => ControlError::NotFound(pid),
            Some(libc::EPERM) | Some(libc::EACCES) => ControlError::PermissionDenied(pid),
            _ => ControlError::Other(format!("process {pid}: {err}")),
        }
    }

    // pid 0 and values past i32::MAX would address process groups or every
    // process; never hand those to the kernel.
    fn checked_pid(pid: u32) -> Result<libc::pid_t, ControlError> {
        match libc::pid_t::try_from(pid) {
            Ok(raw) if raw > 0 => Ok(raw),
            _ => Err(ControlError::InvalidRequest(format!("invalid PID {pid}"))),
        }
    }

    pub fn get_priority(pid: u32) -> Result<i32, ControlError> {
        let raw = checked_pid(pid)?;
        let value = unsafe { libc::getpriority(libc::PRIO_PROCESS, raw as libc::id_t) };
        if value == -1 {
            return nice_minus_one(pid, raw);
        }
        Ok(value)
    }

    // -1 is both a legal nice value and getpriority's error return, and errno
    // cannot be reset portably. The only failure for a valid pid is ESRCH, so
    // ask the kernel whether the process exists instead.
    pub(super) fn nice_minus_one(pid: u32, raw: libc::pid_t) -> Result<i32, ControlError> {
        if unsafe { libc::kill(raw, 0) } == 0 {
            return Ok(-1);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EPERM) => Ok(-1),
            _ => Err(map_errno(pid, err)),
        }
    }

    pub fn set_priority(pid: u32, value: i32) -> Result<(), ControlError> {
        let raw = checked_pid(pid)?;
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, raw as libc::id_t, value) };
        if rc == -1 {
            return Err(map_errno(pid, io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn terminate(pid: u32) -> Result<(), ControlError> {
        let raw = checked_pid(pid)?;
        let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
        if rc == -1 {
            return Err(map_errno(pid, io::Error::last_os_error()));
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod os {
    use crate::error::ControlError;

    pub fn get_priority(_pid: u32) -> Result<i32, ControlError> {
        Err(ControlError::Other(
            "process priority is not supported on this platform".into(),
        ))
    }

    pub fn set_priority(_pid: u32, _value: i32) -> Result<(), ControlError> {
        Err(ControlError::Other(
            "process priority is not supported on this platform".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_total_saturates() {
        let n = NetCounters {
            bytes_sent: u64::MAX,
            bytes_recv: 10,
        };
        assert_eq!(n.total(), u64::MAX);
    }

    #[test]
    fn start_time_has_dashboard_shape() {
        let s = format_start_time(1_700_000_000);
        assert_eq!(s.len(), "2023-11-14 22:13:20".len());
        assert_eq!(&s[4..5], "-");
        assert_eq!(&s[10..11], " ");
    }

    #[cfg(unix)]
    #[test]
    fn own_priority_is_readable() {
        let pid = std::process::id();
        let nice = os::get_priority(pid).expect("read own nice value");
        assert!((-20..=19).contains(&nice));
    }

    #[cfg(unix)]
    #[test]
    fn minus_one_nice_is_told_apart_from_a_missing_process() {
        let own = std::process::id();
        assert_eq!(os::nice_minus_one(own, own as libc::pid_t).unwrap(), -1);

        let mut child = std::process::Command::new("true").spawn().expect("spawn");
        let gone = child.id();
        child.wait().expect("reap");
        assert!(matches!(
            os::nice_minus_one(gone, gone as libc::pid_t),
            Err(ControlError::NotFound(p)) if p == gone
        ));
    }

    #[test]
    fn counters_do_not_wait_on_a_process_scan() {
        let probe = SysinfoProbe::new(default_disk_mount());
        // A scan in flight holds the process table; counters must still answer.
        let _scan = lock(&probe.procs);
        probe.system_counters().expect("counters");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn listed_entries_are_processes_not_threads() {
        let probe = SysinfoProbe::new(default_disk_mount());
        // Spin up a few threads so this process has tasks to leak.
        let workers: Vec<_> = (0..3)
            .map(|_| {
                std::thread::spawn(|| std::thread::sleep(std::time::Duration::from_millis(500)))
            })
            .collect();

        let listed = probe.enumerate_processes();
        assert!(listed.iter().any(|p| p.pid == std::process::id()));
        for p in &listed {
            // Entries that exited since the scan have no status file any more.
            let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", p.pid)) else {
                continue;
            };
            let tgid = status
                .lines()
                .find_map(|l| l.strip_prefix("Tgid:"))
                .map(|v| v.trim().parse::<u32>().expect("numeric tgid"));
            assert_eq!(tgid, Some(p.pid), "{} ({}) is a thread", p.pid, p.name);
        }

        for w in workers {
            w.join().expect("worker");
        }
    }

    #[cfg(unix)]
    #[test]
    fn zero_pid_is_rejected_before_syscall() {
        assert!(matches!(
            os::terminate(0),
            Err(ControlError::InvalidRequest(_))
        ));
    }
}
