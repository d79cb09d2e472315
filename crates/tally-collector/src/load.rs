use crate::Collector;
use anyhow::Result;
use sysinfo::System;
use tally_common::types::Metrics;

pub struct LoadCollector;

impl LoadCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoadCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for LoadCollector {
    fn name(&self) -> &str {
        "load"
    }

    fn collect(&mut self) -> Result<Vec<Metrics>> {
        let load_avg = System::load_average();
        Ok(vec![
            Metrics::gauge("LoadAverage1", load_avg.one),
            Metrics::gauge("LoadAverage5", load_avg.five),
            Metrics::gauge("LoadAverage15", load_avg.fifteen),
            Metrics::gauge("Uptime", System::uptime() as f64),
        ])
    }
}
