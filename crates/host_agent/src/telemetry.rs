//! Host resource sampling for check-in heartbeats.

use chrono::Utc;
use std::sync::Arc;
use sysinfo::System;
use tokio::sync::RwLock;
use weaver_types::wire::ResourceUsage;

/// Most recent sample, shared between the telemetry and check-in loops
pub type LatestUsage = Arc<RwLock<ResourceUsage>>;

pub struct UsageSampler {
    system: System,
    cpu_count: usize,
}

impl UsageSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta: prime the first measurement
        system.refresh_cpu();
        Self {
            system,
            cpu_count: num_cpus::get(),
        }
    }

    pub fn sample(&mut self) -> ResourceUsage {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        ResourceUsage {
            cpu_percent: self.system.global_cpu_info().cpu_usage(),
            cpu_count: self.cpu_count,
            memory_used_bytes: self.system.used_memory(),
            memory_total_bytes: self.system.total_memory(),
            sampled_at: Some(Utc::now()),
        }
    }
}

impl Default for UsageSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_reports_host() {
        let mut sampler = UsageSampler::new();
        let usage = sampler.sample();
        assert!(usage.cpu_count >= 1);
        assert!(usage.memory_total_bytes > 0);
        assert!(usage.memory_used_bytes <= usage.memory_total_bytes);
        assert!(usage.sampled_at.is_some());
    }
}
