use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cgroup::fs;
use crate::cgroup::path::CgroupPath;
use crate::cgroup::types::PressureType;
use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::interface::Plugin;
use crate::plugins::{optional_arg, parse_cgroup_arg};
use crate::util::error::Result;

const DEFAULT_INTERVAL_TICKS: u64 = 6;
const DEFAULT_LIMIT_MIN_BYTES: i64 = 100 << 20;
const DEFAULT_PRESSURE_PCT_LOW: f32 = 0.1;
const DEFAULT_PRESSURE_PCT_HIGH: f32 = 1.0;
const DEFAULT_PROBE_COEFF: f64 = 0.01;
const DEFAULT_BACKOFF_COEFF: f64 = 0.05;
const HIGH_TMP_GRACE: Duration = Duration::from_secs(20);

/// Slow feedback controller that squeezes a workload's memory footprint
/// until pressure signal appears, without provoking refault storms.
///
/// Every `interval` ticks, per target cgroup: with pressure under the
/// low watermark the write-side limit probes a few percent below
/// memory.current; over the high watermark it backs off; in between it
/// holds. The limit never goes under max(memory.min, limit_min_bytes).
/// Kernels exposing memory.high.tmp get the limit written there with a
/// grace duration, leaving memory.high untouched.
pub struct Senpai {
    cgroups: Vec<CgroupPath>,
    interval_ticks: u64,
    limit_min_bytes: i64,
    limit_max_bytes: i64,
    pressure_pct_low: f32,
    pressure_pct_high: f32,
    probe_coeff: f64,
    backoff_coeff: f64,
    tick: u64,
    limits: HashMap<String, i64>,
}

impl Senpai {
    pub fn new() -> Self {
        Self {
            cgroups: Vec::new(),
            interval_ticks: DEFAULT_INTERVAL_TICKS,
            limit_min_bytes: DEFAULT_LIMIT_MIN_BYTES,
            limit_max_bytes: i64::MAX,
            pressure_pct_low: DEFAULT_PRESSURE_PCT_LOW,
            pressure_pct_high: DEFAULT_PRESSURE_PCT_HIGH,
            probe_coeff: DEFAULT_PROBE_COEFF,
            backoff_coeff: DEFAULT_BACKOFF_COEFF,
            tick: 0,
            limits: HashMap::new(),
        }
    }

    fn adjust_cgroup_limit(&mut self, cgroup_abs_path: &str) -> Result<()> {
        let current = fs::read_memcurrent(cgroup_abs_path)?;
        let pressure = fs::read_mempressure(cgroup_abs_path, PressureType::Some)?;
        let memory_min = fs::read_memmin(cgroup_abs_path).unwrap_or(0);
        let floor = memory_min.max(self.limit_min_bytes);

        let new_limit = match self.limits.get(cgroup_abs_path) {
            // First observation: start the limit at the current footprint
            None => current.max(floor),
            Some(&limit) => {
                let adjusted = if pressure.sec_10 <= self.pressure_pct_low {
                    (limit.min(current) as f64 * (1.0 - self.probe_coeff)) as i64
                } else if pressure.sec_10 >= self.pressure_pct_high {
                    (limit as f64 * (1.0 + self.backoff_coeff)) as i64
                } else {
                    limit
                };
                adjusted.min(self.limit_max_bytes).max(floor)
            }
        };

        let prev = self.limits.insert(cgroup_abs_path.to_string(), new_limit);
        if prev == Some(new_limit) {
            return Ok(());
        }

        debug!(
            cgroup = cgroup_abs_path,
            limit = new_limit,
            current,
            pressure = pressure.sec_10 as f64,
            "senpai adjusting limit"
        );

        let high_tmp = format!("{}/{}", cgroup_abs_path, fs::MEM_HIGH_TMP_FILE);
        if Path::new(&high_tmp).exists() {
            fs::write_memhigh_tmp(cgroup_abs_path, new_limit, HIGH_TMP_GRACE)
        } else {
            fs::write_memhigh(cgroup_abs_path, new_limit)
        }
    }
}

impl Default for Senpai {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for Senpai {
    fn name(&self) -> &'static str {
        "senpai"
    }

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.cgroups = parse_cgroup_arg(self.name(), args, resources, context)?;

        if let Some(ticks) = optional_arg(self.name(), args, "interval")? {
            self.interval_ticks = ticks;
        }
        if let Some(bytes) = optional_arg(self.name(), args, "limit_min_bytes")? {
            self.limit_min_bytes = bytes;
        }
        if let Some(bytes) = optional_arg(self.name(), args, "limit_max_bytes")? {
            self.limit_max_bytes = bytes;
        }
        if let Some(pct) = optional_arg(self.name(), args, "pressure_pct_low")? {
            self.pressure_pct_low = pct;
        }
        if let Some(pct) = optional_arg(self.name(), args, "pressure_pct_high")? {
            self.pressure_pct_high = pct;
        }
        if let Some(coeff) = optional_arg(self.name(), args, "probe_coeff")? {
            self.probe_coeff = coeff;
        }
        if let Some(coeff) = optional_arg(self.name(), args, "backoff_coeff")? {
            self.backoff_coeff = coeff;
        }

        Ok(())
    }

    async fn run(&mut self, _ctx: &mut OomdContext) -> Result<PluginRet> {
        if self.interval_ticks > 0 && self.tick % self.interval_ticks != 0 {
            self.tick += 1;
            return Ok(PluginRet::Continue);
        }
        self.tick += 1;

        for pattern in self.cgroups.clone() {
            for resolved in fs::resolve_wildcard_path(&pattern) {
                if let Err(e) = self.adjust_cgroup_limit(&resolved) {
                    warn!(cgroup = %resolved, error = %e, "senpai skipping cgroup");
                }
            }
        }

        Ok(PluginRet::Continue)
    }
}
