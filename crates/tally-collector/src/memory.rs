use crate::Collector;
use anyhow::Result;
use sysinfo::System;
use tally_common::types::Metrics;

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self) -> Result<Vec<Metrics>> {
        self.system.refresh_memory();

        let total = self.system.total_memory();
        let used = self.system.used_memory();
        let usage_pct = if total > 0 {
            (used as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Ok(vec![
            Metrics::gauge("TotalMemory", total as f64),
            Metrics::gauge("FreeMemory", self.system.free_memory() as f64),
            Metrics::gauge("AvailableMemory", self.system.available_memory() as f64),
            Metrics::gauge("UsedMemory", used as f64),
            Metrics::gauge("UsedMemoryPercent", usage_pct),
            // Swap
            Metrics::gauge("TotalSwap", self.system.total_swap() as f64),
            Metrics::gauge("UsedSwap", self.system.used_swap() as f64),
        ])
    }
}
