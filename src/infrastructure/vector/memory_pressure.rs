//! Process memory pressure sampling via sysinfo.

use std::sync::{Mutex, PoisonError};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::domain::ports::PressureSignal;

/// Compares the resident set size of the current process against a fixed
/// threshold.
pub struct ProcessMemoryPressure {
    system: Mutex<System>,
    pid: Option<Pid>,
    threshold_mb: u64,
}

impl ProcessMemoryPressure {
    pub fn new(threshold_mb: u64) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot resolve current pid, memory pressure disabled");
                None
            }
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
            threshold_mb,
        }
    }

    pub const fn threshold_mb(&self) -> u64 {
        self.threshold_mb
    }

    /// Refresh and return the process RSS in megabytes.
    pub fn sample_mb(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        system.process(pid).map(|p| p.memory() / 1024 / 1024)
    }
}

impl PressureSignal for ProcessMemoryPressure {
    fn is_under_pressure(&self) -> bool {
        self.sample_mb().is_some_and(|mb| mb > self.threshold_mb)
    }

    fn usage_mb(&self) -> Option<u64> {
        self.sample_mb()
    }
}
