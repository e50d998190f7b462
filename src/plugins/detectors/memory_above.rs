use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::cgroup::fs;
use crate::cgroup::path::CgroupPath;
use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::interface::Plugin;
use crate::plugins::{parse_cgroup_arg, required_arg};
use crate::util::error::Result;
use crate::util::parse::{parse_bool, parse_mem_threshold, MemThreshold};

const DEFAULT_MEMINFO: &str = "/proc/meminfo";

/// Holds once a targeted cgroup's memory usage has exceeded the
/// threshold for `duration` seconds. With `threshold_anon` the
/// comparison is against anonymous memory instead of memory.current.
pub struct MemoryAbove {
    cgroups: Vec<CgroupPath>,
    threshold: MemThreshold,
    is_anon: bool,
    duration: Duration,
    debug: bool,
    meminfo_location: String,
    hit_thres_at: Option<Instant>,
}

impl MemoryAbove {
    pub fn new() -> Self {
        Self {
            cgroups: Vec::new(),
            threshold: MemThreshold::Bytes(0),
            is_anon: false,
            duration: Duration::ZERO,
            debug: false,
            meminfo_location: DEFAULT_MEMINFO.to_string(),
            hit_thres_at: None,
        }
    }
}

impl Default for MemoryAbove {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for MemoryAbove {
    fn name(&self) -> &'static str {
        "memory_above"
    }

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.cgroups = parse_cgroup_arg(self.name(), args, resources, context)?;

        // threshold_anon takes precedence over threshold
        if let Some(raw) = args.get("threshold_anon") {
            self.threshold = parse_mem_threshold(raw)?;
            self.is_anon = true;
        } else if let Some(raw) = args.get("threshold") {
            self.threshold = parse_mem_threshold(raw)?;
        } else {
            return Err(crate::util::error::OomdError::plugin_init(
                self.name(),
                "argument=threshold not present",
            ));
        }

        self.duration = Duration::from_secs(required_arg(self.name(), args, "duration")?);

        if let Some(val) = args.get("debug") {
            self.debug = parse_bool(val);
        }
        if let Some(loc) = args.get("meminfo_location") {
            self.meminfo_location = loc.clone();
        }

        Ok(())
    }

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet> {
        let mut current_usage = 0i64;
        let mut current_cgroup = None;

        for (path, cg) in ctx.matching(&self.cgroups) {
            let usage = if self.is_anon {
                cg.anon_usage
            } else {
                cg.current_usage
            };
            if self.debug {
                debug!(cgroup = %path, usage, anon = self.is_anon, "usage sample");
            }
            if usage > current_usage {
                current_usage = usage;
                current_cgroup = Some(path.clone());
            }
        }

        let threshold_bytes = match self.threshold {
            MemThreshold::Bytes(b) => b,
            MemThreshold::Percent(_) => {
                let meminfo = fs::get_meminfo(&self.meminfo_location)?;
                let memtotal = meminfo.get("MemTotal").copied().unwrap_or(0);
                self.threshold.resolve(memtotal)
            }
        };

        if current_usage > threshold_bytes {
            let hit_at = *self.hit_thres_at.get_or_insert_with(Instant::now);
            if hit_at.elapsed() >= self.duration {
                info!(
                    cgroup = %current_cgroup.unwrap_or_else(|| CgroupPath::new("/", "")),
                    usage_mb = current_usage >> 20,
                    threshold_mb = threshold_bytes >> 20,
                    duration_secs = self.duration.as_secs(),
                    "memory usage over threshold"
                );
                return Ok(PluginRet::Continue);
            }
        } else {
            self.hit_thres_at = None;
        }

        Ok(PluginRet::Stop)
    }
}
