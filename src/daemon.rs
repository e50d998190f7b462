use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

use crate::cgroup::fs;
use crate::cgroup::path::CgroupPath;
use crate::cgroup::types::{PressureType, ResourcePressure};
use crate::core::context::{CgroupContext, OomdContext, SystemContext};
use crate::engine::Engine;
use crate::util::error::{OomdError, Result};

/// Decay constant for the usage EWMA:
/// new_avg = prev_avg * (D-1)/D + current/D
const AVERAGE_SIZE_DECAY: f64 = 10.0;

const DEFAULT_MEMINFO: &str = "/proc/meminfo";
const DEFAULT_VMSTAT: &str = "/proc/vmstat";

/// Fixed coefficients folding an io.stat line into one scalar cost.
/// Bytes carry their own weight; an I/O operation is charged a seek's
/// worth of byte equivalents.
const IO_COST_RBYTE: f64 = 1.0;
const IO_COST_WBYTE: f64 = 2.0;
const IO_COST_DBYTE: f64 = 0.5;
const IO_COST_RIO: f64 = 4096.0;
const IO_COST_WIO: f64 = 4096.0;

/// The outer loop: refreshes the cgroup snapshot each tick, hands it to
/// the engine, then sleeps out the remainder of the interval.
pub struct Oomd {
    engine: Engine,
    interval: Duration,
    meminfo_location: String,
    vmstat_location: String,
    warned_files: HashSet<String>,
}

impl Oomd {
    pub fn new(engine: Engine, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            meminfo_location: DEFAULT_MEMINFO.to_string(),
            vmstat_location: DEFAULT_VMSTAT.to_string(),
            warned_files: HashSet::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_meminfo_location(mut self, location: &str) -> Self {
        self.meminfo_location = location.to_string();
        self
    }

    /// A control file that fails to parse gets one warning, then silence;
    /// the field it feeds is elided for the tick either way.
    fn warn_once(&mut self, file: String, err: &OomdError) {
        if self.warned_files.insert(file.clone()) {
            warn!(file = %file, error = %err, "control file unreadable, eliding");
        }
    }

    fn io_cost_of(iostat: &[crate::cgroup::types::DeviceIOStat]) -> f64 {
        iostat
            .iter()
            .map(|dev| {
                dev.rbytes as f64 * IO_COST_RBYTE
                    + dev.wbytes as f64 * IO_COST_WBYTE
                    + dev.dbytes as f64 * IO_COST_DBYTE
                    + dev.rios as f64 * IO_COST_RIO
                    + dev.wios as f64 * IO_COST_WIO
            })
            .sum()
    }

    fn read_cgroup_context(
        &mut self,
        path: &CgroupPath,
        meminfo: &HashMap<String, i64>,
    ) -> CgroupContext {
        let abs = path.absolute();

        // The root cgroup exposes no memory.current; emulate it
        let current_usage = if path.is_root() {
            meminfo.get("MemTotal").copied().unwrap_or(0)
                - meminfo.get("MemFree").copied().unwrap_or(0)
        } else {
            match fs::read_memcurrent(&abs) {
                Ok(v) => v,
                Err(e) => {
                    self.warn_once(format!("{}/memory.current", abs), &e);
                    0
                }
            }
        };

        // The root cgroup may predate per-cgroup PSI; the system-wide
        // files carry the same signal there.
        let pressure_read = fs::read_mempressure(&abs, PressureType::Some).or_else(|e| {
            if path.is_root() {
                fs::read_system_mempressure(PressureType::Some)
            } else {
                Err(e)
            }
        });
        let pressure = match pressure_read {
            Ok(p) => p,
            Err(e) => {
                self.warn_once(format!("{}/memory.pressure", abs), &e);
                ResourcePressure::default()
            }
        };

        // Older kernels have no io.pressure; NaN the fields out
        let io_pressure_read = fs::read_iopressure(&abs, PressureType::Some).or_else(|e| {
            if path.is_root() {
                fs::read_system_iopressure(PressureType::Some)
            } else {
                Err(e)
            }
        });
        let io_pressure = match io_pressure_read {
            Ok(p) => p,
            Err(e) => {
                self.warn_once(format!("{}/io.pressure", abs), &e);
                ResourcePressure::unavailable()
            }
        };

        let memory_low = fs::read_memlow(&abs).unwrap_or(0);
        let memory_min = fs::read_memmin(&abs).unwrap_or(0);
        let swap_usage = fs::read_swap_current(&abs).unwrap_or(0);
        let anon_usage = fs::get_memstat(&abs)
            .map(|m| m.get("anon").copied().unwrap_or(0))
            .unwrap_or(0);
        let nr_dying_descendants = fs::get_nr_dying_descendants(&abs);
        let io_cost_cumulative = fs::read_iostat(&abs)
            .map(|stat| Self::io_cost_of(&stat))
            .unwrap_or(0.0);

        CgroupContext {
            pressure,
            io_pressure,
            current_usage,
            memory_low,
            swap_usage,
            anon_usage,
            memory_protection: current_usage.min(memory_low.max(memory_min)),
            io_cost_cumulative,
            nr_dying_descendants,
            ..Default::default()
        }
    }

    /// Builds a fresh context for every monitored cgroup and swaps it in,
    /// carrying the EWMA and io-cost deltas over from the previous tick.
    pub fn update_context(&mut self, ctx: &mut OomdContext) -> Result<()> {
        let mut new_ctx = OomdContext::new();

        let meminfo = match fs::get_meminfo(&self.meminfo_location) {
            Ok(m) => m,
            Err(e) => {
                self.warn_once(self.meminfo_location.clone(), &e);
                HashMap::new()
            }
        };

        let swaptotal = meminfo.get("SwapTotal").copied().unwrap_or(0);
        let swapfree = meminfo.get("SwapFree").copied().unwrap_or(0);
        new_ctx.set_system_context(SystemContext {
            swaptotal,
            swapused: swaptotal - swapfree,
        });

        for resource in self.engine.monitored_resources().clone() {
            // Without the memory controller none of the knobs this daemon
            // depends on exist; treat that as unrecoverable.
            let parent = resource.glob_free_prefix();
            let controllers = fs::read_controllers(&parent.absolute());
            if !controllers.iter().any(|c| c == "memory") {
                error!(
                    cgroup = %parent.absolute(),
                    "cgroup memory controller not enabled"
                );
                return Err(OomdError::MissingController(parent.absolute()));
            }

            let resolved = if resource.is_root() {
                vec![resource.absolute()]
            } else {
                fs::resolve_wildcard_path(&resource)
            };

            for abs in resolved {
                if !fs::is_dir(&abs) {
                    continue;
                }
                let rel = abs
                    .strip_prefix(resource.cgroup_fs())
                    .unwrap_or("")
                    .trim_start_matches('/');
                let path = CgroupPath::new(resource.cgroup_fs(), rel);
                let cgroup_ctx = self.read_cgroup_context(&path, &meminfo);
                new_ctx.set_cgroup_context(path, cgroup_ctx);
            }
        }

        // Carry running state forward from the previous tick
        let interval_secs = self.interval.as_secs_f64().max(1e-9);
        for key in new_ctx.cgroups() {
            let prev = ctx.get_cgroup_context(&key);
            let prev_avg = prev.map(|p| p.average_usage).unwrap_or(0.0);
            let prev_cost = prev.map(|p| p.io_cost_cumulative);

            let Some(cg) = new_ctx.get_mut_cgroup_context(&key) else {
                continue;
            };
            cg.average_usage = prev_avg * ((AVERAGE_SIZE_DECAY - 1.0) / AVERAGE_SIZE_DECAY)
                + cg.current_usage as f64 / AVERAGE_SIZE_DECAY;
            cg.io_cost_rate = prev_cost
                .map(|prev| (cg.io_cost_cumulative - prev) / interval_secs)
                .unwrap_or(0.0);
        }

        *ctx = new_ctx;
        Ok(())
    }

    fn dump_cgroup_overview(&mut self, cgroup: &CgroupPath) {
        let abs = cgroup.glob_free_prefix().absolute();
        let Ok(current) = fs::read_memcurrent(&abs) else {
            return;
        };
        let Ok(pressure) = fs::read_mempressure(&abs, PressureType::Some) else {
            return;
        };
        let meminfo = fs::get_meminfo(&self.meminfo_location).unwrap_or_default();
        let vmstat = fs::get_vmstat(&self.vmstat_location).unwrap_or_default();
        let pgscan = vmstat.get("pgscan_kswapd").copied().unwrap_or(0)
            + vmstat.get("pgscan_direct").copied().unwrap_or(0);

        let pressure = format!(
            "{:.2}:{:.2}:{:.2}",
            pressure.sec_10, pressure.sec_60, pressure.sec_600
        );
        debug!(
            cgroup = %cgroup,
            total_mb = current >> 20,
            pressure = %pressure,
            swapfree_mb = meminfo.get("SwapFree").copied().unwrap_or(0) >> 20,
            swaptotal_mb = meminfo.get("SwapTotal").copied().unwrap_or(0) >> 20,
            pgscan,
            "cgroup overview"
        );
    }

    pub async fn run(mut self) -> Result<()> {
        let mut ctx = OomdContext::new();
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        info!(interval_secs = self.interval.as_secs(), "running oomd");

        loop {
            let before = Instant::now();

            self.update_context(&mut ctx)?;
            for resource in self.engine.monitored_resources().clone() {
                self.dump_cgroup_overview(&resource);
            }

            self.engine.run_once(&mut ctx).await;

            // A long action chain truncates the sleep but never skips it:
            // the loop always yields at least once per tick.
            let elapsed = before.elapsed();
            let to_sleep = self.interval.saturating_sub(elapsed);

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                    break;
                }
                _ = async {
                    if to_sleep.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(to_sleep).await;
                    }
                } => {}
            }
        }

        Ok(())
    }
}
