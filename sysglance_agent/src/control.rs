//! Process control: priority adjustment and termination.

use serde::Serialize;
use tracing::info;

use crate::error::ControlError;
use crate::probe::SystemProbe;
use crate::types::PriorityDirection;

pub const NICE_MIN: i32 = -20;
pub const NICE_MAX: i32 = 19;
pub const NICE_STEP: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityChange {
    pub pid: u32,
    pub previous: i32,
    pub current: i32,
}

/// Step the nice value one notch in `direction`, never leaving [-20, 19].
pub fn next_priority(current: i32, direction: PriorityDirection) -> i32 {
    let current = current.clamp(NICE_MIN, NICE_MAX);
    match direction {
        PriorityDirection::Lower => (current + NICE_STEP).min(NICE_MAX),
        PriorityDirection::Raise => (current - NICE_STEP).max(NICE_MIN),
    }
}

fn validate_pid(pid: u32) -> Result<u32, ControlError> {
    if pid == 0 {
        return Err(ControlError::InvalidRequest("PID is required".into()));
    }
    Ok(pid)
}

pub fn adjust_priority(
    probe: &dyn SystemProbe,
    pid: u32,
    direction: PriorityDirection,
) -> Result<PriorityChange, ControlError> {
    let pid = validate_pid(pid)?;
    let previous = probe.process_priority(pid)?;
    let current = next_priority(previous, direction);
    probe.set_process_priority(pid, current)?;
    info!(pid, previous, current, "process priority changed");
    Ok(PriorityChange {
        pid,
        previous,
        current,
    })
}

pub fn terminate(probe: &dyn SystemProbe, pid: u32) -> Result<(), ControlError> {
    let pid = validate_pid(pid)?;
    probe.terminate_process(pid)?;
    info!(pid, "termination requested");
    Ok(())
}
