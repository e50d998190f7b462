use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::cgroup::fs;
use crate::cgroup::path::CgroupPath;
use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::interface::Plugin;
use crate::plugins::{parse_cgroup_arg, required_arg};
use crate::util::error::Result;

/// Holds while the targeted cgroups have scanned pages for reclaim within
/// the last `duration` seconds. Page scans are read off memory.stat's
/// pgscan counter; a positive delta between ticks marks reclaim activity.
pub struct MemoryReclaim {
    cgroups: Vec<CgroupPath>,
    duration: Duration,
    last_pgscan: i64,
    last_reclaim_at: Option<Instant>,
}

impl MemoryReclaim {
    pub fn new() -> Self {
        Self {
            cgroups: Vec::new(),
            duration: Duration::ZERO,
            last_pgscan: 0,
            last_reclaim_at: None,
        }
    }
}

impl Default for MemoryReclaim {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for MemoryReclaim {
    fn name(&self) -> &'static str {
        "memory_reclaim"
    }

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.cgroups = parse_cgroup_arg(self.name(), args, resources, context)?;
        self.duration = Duration::from_secs(required_arg(self.name(), args, "duration")?);
        Ok(())
    }

    async fn run(&mut self, _ctx: &mut OomdContext) -> Result<PluginRet> {
        let mut pgscan = 0i64;
        for pattern in &self.cgroups {
            for resolved in fs::resolve_wildcard_path(pattern) {
                if let Ok(memstat) = fs::get_memstat(&resolved) {
                    pgscan += memstat.get("pgscan").copied().unwrap_or(0);
                }
            }
        }

        debug!(delta = pgscan - self.last_pgscan, "pgscan");

        if pgscan > self.last_pgscan {
            self.last_reclaim_at = Some(Instant::now());
        }
        self.last_pgscan = pgscan;

        match self.last_reclaim_at {
            Some(at) if at.elapsed() <= self.duration => Ok(PluginRet::Continue),
            _ => Ok(PluginRet::Stop),
        }
    }
}
