use crate::Collector;
use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tally_common::types::Metrics;

/// Readings about the agent process itself: resident and virtual memory,
/// CPU share, run time and I/O totals.
pub struct ProcessCollector {
    system: System,
    pid: Option<Pid>,
}

impl ProcessCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    fn collect(&mut self) -> Result<Vec<Metrics>> {
        let pid = self
            .pid
            .ok_or_else(|| anyhow!("current process id is unavailable"))?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| anyhow!("process {pid} not found"))?;

        let io = process.disk_usage();
        Ok(vec![
            Metrics::gauge("ProcessMemory", process.memory() as f64),
            Metrics::gauge("ProcessVirtualMemory", process.virtual_memory() as f64),
            Metrics::gauge("ProcessCPU", process.cpu_usage() as f64),
            Metrics::gauge("ProcessRunTime", process.run_time() as f64),
            Metrics::gauge("ProcessReadBytes", io.total_read_bytes as f64),
            Metrics::gauge("ProcessWrittenBytes", io.total_written_bytes as f64),
        ])
    }
}
