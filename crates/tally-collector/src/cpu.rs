use crate::Collector;
use anyhow::Result;
use sysinfo::System;
use tally_common::types::Metrics;

/// Per-core utilization as `CPUutilization1..N`, plus the global average.
///
/// Usage is computed from the difference between two refreshes, so the first
/// refresh happens at construction.
pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Vec<Metrics>> {
        self.system.refresh_cpu_all();

        let mut metrics = vec![Metrics::gauge(
            "CPUutilization",
            self.system.global_cpu_usage() as f64,
        )];
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            metrics.push(Metrics::gauge(
                format!("CPUutilization{}", i + 1),
                cpu.cpu_usage() as f64,
            ));
        }
        Ok(metrics)
    }
}
