//! Memory and time sampling for benchmark stages.

use crate::errors::{BenchError, BenchResult};
use std::sync::Mutex;
use std::time::Instant;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Source of the current process's resident memory.
pub trait MemoryProbe {
    /// Resident set size in megabytes at call time.
    fn sample(&self) -> BenchResult<f64>;
}

/// Resident set size of this process as reported by the OS.
pub struct ProcessMemory {
    pid: Pid,
    system: Mutex<System>,
}

impl ProcessMemory {
    /// Build the probe and take one sample, so an unsupported platform fails
    /// before any stage runs.
    pub fn new() -> BenchResult<Self> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| BenchError::Probe(format!("cannot resolve own pid: {}", e)))?;
        let probe = Self {
            pid,
            system: Mutex::new(System::new()),
        };
        probe.sample()?;
        Ok(probe)
    }
}

impl MemoryProbe for ProcessMemory {
    fn sample(&self) -> BenchResult<f64> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| BenchError::Probe("memory probe lock poisoned".to_string()))?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        let process = system.process(self.pid).ok_or_else(|| {
            BenchError::Probe(format!("process {} not visible to sysinfo", self.pid))
        })?;
        Ok(process.memory() as f64 / BYTES_PER_MB)
    }
}

/// Monotonic stopwatch.
#[derive(Debug, Default, Clone, Copy)]
pub struct Timer;

/// A started measurement; hand it back to [`Timer::stop`].
#[derive(Debug, Clone, Copy)]
pub struct TimerHandle {
    started: Instant,
}

impl Timer {
    pub fn start(&self) -> TimerHandle {
        TimerHandle {
            started: Instant::now(),
        }
    }

    /// Seconds elapsed since `handle` was started.
    pub fn stop(&self, handle: TimerHandle) -> f64 {
        handle.started.elapsed().as_secs_f64()
    }
}
