use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::info;

use crate::cgroup::path::CgroupPath;
use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::interface::Plugin;
use crate::plugins::{parse_cgroup_arg, parse_resource_arg, optional_arg, required_arg, ResourceType};
use crate::util::error::Result;

const DEFAULT_FAST_FALL_RATIO: f32 = 0.85;

/// Like pressure_above, with an additional predicted-rise gate: the 10s
/// window must exceed `fast_fall_ratio` of the 60s window, so a spike
/// that is already cooling off does not trigger a kill.
pub struct PressureRisingBeyond {
    cgroups: Vec<CgroupPath>,
    resource: ResourceType,
    threshold: f32,
    duration: Duration,
    fast_fall_ratio: f32,
    hit_thres_at: Option<Instant>,
}

impl PressureRisingBeyond {
    pub fn new() -> Self {
        Self {
            cgroups: Vec::new(),
            resource: ResourceType::Memory,
            threshold: 0.0,
            duration: Duration::ZERO,
            fast_fall_ratio: DEFAULT_FAST_FALL_RATIO,
            hit_thres_at: None,
        }
    }
}

impl Default for PressureRisingBeyond {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for PressureRisingBeyond {
    fn name(&self) -> &'static str {
        "pressure_rising_beyond"
    }

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.cgroups = parse_cgroup_arg(self.name(), args, resources, context)?;
        self.resource = parse_resource_arg(self.name(), args)?;
        self.threshold = required_arg(self.name(), args, "threshold")?;
        self.duration = Duration::from_secs(required_arg(self.name(), args, "duration")?);
        self.fast_fall_ratio = optional_arg(self.name(), args, "fast_fall_ratio")?
            .unwrap_or(DEFAULT_FAST_FALL_RATIO);
        Ok(())
    }

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet> {
        // Judge by the hottest targeted cgroup
        let mut worst: Option<(CgroupPath, f32, f32, f32)> = None;
        for (path, cg) in ctx.matching(&self.cgroups) {
            let pressure = match self.resource {
                ResourceType::Memory => &cg.pressure,
                ResourceType::Io => &cg.io_pressure,
            };
            let window = pressure.worst_window();
            if !window.is_finite() {
                continue;
            }
            if worst.as_ref().map(|w| window > w.1).unwrap_or(true) {
                worst = Some((path.clone(), window, pressure.sec_10, pressure.sec_60));
            }
        }

        let Some((cgroup, window, sec_10, sec_60)) = worst else {
            self.hit_thres_at = None;
            return Ok(PluginRet::Stop);
        };

        if window >= self.threshold {
            let hit_at = *self.hit_thres_at.get_or_insert_with(Instant::now);
            let still_rising = sec_10 > self.fast_fall_ratio * sec_60;
            if hit_at.elapsed() >= self.duration && still_rising {
                info!(
                    cgroup = %cgroup,
                    pressure = window as f64,
                    sec_10 = sec_10 as f64,
                    sec_60 = sec_60 as f64,
                    threshold = self.threshold as f64,
                    "pressure over threshold and not falling"
                );
                return Ok(PluginRet::Continue);
            }
        } else {
            self.hit_thres_at = None;
        }

        Ok(PluginRet::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::types::ResourcePressure;
    use crate::core::context::CgroupContext;

    fn setup(cgroup: &str, fast_fall_ratio: &str) -> PressureRisingBeyond {
        let mut plugin = PressureRisingBeyond::new();
        let mut resources = MonitoredResources::new();
        let args = PluginArgs::from([
            ("cgroup".to_string(), cgroup.to_string()),
            ("resource".to_string(), "memory".to_string()),
            ("threshold".to_string(), "80".to_string()),
            ("duration".to_string(), "0".to_string()),
            ("fast_fall_ratio".to_string(), fast_fall_ratio.to_string()),
        ]);
        let context = PluginConstructionContext::new("/sys/fs/cgroup");
        plugin.init(&mut resources, &args, &context).unwrap();
        plugin
    }

    fn ctx_with(rel: &str, sec_10: f32, sec_60: f32) -> OomdContext {
        let mut ctx = OomdContext::new();
        ctx.set_cgroup_context(
            CgroupPath::new("/sys/fs/cgroup", rel),
            CgroupContext {
                pressure: ResourcePressure {
                    sec_10,
                    sec_60,
                    sec_600: 1.0,
                    total: None,
                },
                ..Default::default()
            },
        );
        ctx
    }

    #[tokio::test]
    async fn detects_high_and_rising_pressure() {
        let mut plugin = setup("high_pressure", "0.85");
        let mut ctx = ctx_with("high_pressure", 99.99, 80.0);
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Continue);
    }

    #[tokio::test]
    async fn cooling_spike_does_not_fire() {
        // 10s window already well below the 60s window: the spike passed
        let mut plugin = setup("high_pressure", "0.85");
        let mut ctx = ctx_with("high_pressure", 60.0, 99.0);
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
    }

    #[tokio::test]
    async fn low_pressure_does_not_fire() {
        let mut plugin = setup("low_pressure", "0");
        let mut ctx = ctx_with("low_pressure", 1.11, 1.11);
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
    }

    #[tokio::test]
    async fn wildcard_finds_the_hot_cgroup() {
        let mut plugin = setup("*", "0");
        let mut ctx = ctx_with("high_pressure", 99.99, 99.99);
        ctx.set_cgroup_context(
            CgroupPath::new("/sys/fs/cgroup", "low_pressure"),
            CgroupContext {
                pressure: ResourcePressure {
                    sec_10: 1.11,
                    sec_60: 1.11,
                    sec_600: 1.0,
                    total: None,
                },
                ..Default::default()
            },
        );
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Continue);
    }
}
