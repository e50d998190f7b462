use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::info;

use crate::cgroup::path::CgroupPath;
use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::interface::Plugin;
use crate::plugins::{parse_cgroup_arg, parse_resource_arg, required_arg, ResourceType};
use crate::util::error::Result;

/// Holds (CONTINUE) once the worst PSI window of any targeted cgroup has
/// been at or above the threshold continuously for `duration` seconds.
#[derive(Default)]
pub struct PressureAbove {
    cgroups: Vec<CgroupPath>,
    resource: ResourceType,
    threshold: f32,
    duration: Duration,
    hit_thres_at: Option<Instant>,
}

impl PressureAbove {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Plugin for PressureAbove {
    fn name(&self) -> &'static str {
        "pressure_above"
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
        Ok(())
    }

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet> {
        let mut worst = f32::NAN;
        let mut worst_cgroup = None;

        for (path, cg) in ctx.matching(&self.cgroups) {
            let pressure = match self.resource {
                ResourceType::Memory => &cg.pressure,
                ResourceType::Io => &cg.io_pressure,
            };
            let window = pressure.worst_window();
            // NaN-filled pressure (io.pressure on old kernels) never wins
            if !worst.is_finite() || window > worst {
                worst = window;
                worst_cgroup = Some(path.clone());
            }
        }

        if worst.is_finite() && worst >= self.threshold {
            let hit_at = *self.hit_thres_at.get_or_insert_with(Instant::now);
            if hit_at.elapsed() >= self.duration {
                info!(
                    cgroup = %worst_cgroup.unwrap_or_else(|| CgroupPath::new("/", "")),
                    pressure = worst as f64,
                    threshold = self.threshold as f64,
                    duration_secs = self.duration.as_secs(),
                    "pressure over threshold"
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

    fn setup(cgroup: &str, resource: &str, threshold: &str) -> PressureAbove {
        let mut plugin = PressureAbove::new();
        let mut resources = MonitoredResources::new();
        let args = PluginArgs::from([
            ("cgroup".to_string(), cgroup.to_string()),
            ("resource".to_string(), resource.to_string()),
            ("threshold".to_string(), threshold.to_string()),
            ("duration".to_string(), "0".to_string()),
        ]);
        let context = PluginConstructionContext::new("/sys/fs/cgroup");
        plugin.init(&mut resources, &args, &context).unwrap();
        assert_eq!(resources.len(), cgroup.split(',').count());
        plugin
    }

    fn ctx_with_pressure(entries: &[(&str, f32)]) -> OomdContext {
        let mut ctx = OomdContext::new();
        for (rel, sec_10) in entries {
            ctx.set_cgroup_context(
                CgroupPath::new("/sys/fs/cgroup", rel),
                CgroupContext {
                    pressure: ResourcePressure {
                        sec_10: *sec_10,
                        sec_60: 1.0,
                        sec_600: 1.0,
                        total: None,
                    },
                    ..Default::default()
                },
            );
        }
        ctx
    }

    #[tokio::test]
    async fn detects_high_pressure() {
        let mut plugin = setup("high_pressure", "memory", "80");
        let mut ctx = ctx_with_pressure(&[("high_pressure", 99.99)]);
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Continue);
    }

    #[tokio::test]
    async fn ignores_low_pressure() {
        let mut plugin = setup("low_pressure", "memory", "80");
        let mut ctx = ctx_with_pressure(&[("low_pressure", 1.11)]);
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
    }

    #[tokio::test]
    async fn wildcard_scans_every_matching_cgroup() {
        let mut plugin = setup("*", "memory", "80");
        let mut ctx = ctx_with_pressure(&[("high_pressure", 99.99), ("low_pressure", 1.11)]);
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Continue);
    }

    #[tokio::test]
    async fn multi_cgroup_takes_the_worst() {
        let mut plugin = setup("high_pressure,low_pressure", "memory", "80");
        let mut ctx = ctx_with_pressure(&[("high_pressure", 99.99), ("low_pressure", 1.11)]);
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Continue);
    }

    #[tokio::test]
    async fn duration_gates_first_observation() {
        let mut plugin = setup("high_pressure", "memory", "80");
        plugin.duration = Duration::from_secs(600);
        let mut ctx = ctx_with_pressure(&[("high_pressure", 99.99)]);
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
        // The timer armed, but 600s obviously have not elapsed.
        assert!(plugin.hit_thres_at.is_some());
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
    }

    #[tokio::test]
    async fn nan_io_pressure_never_fires() {
        let mut plugin = setup("x", "io", "1");
        let mut ctx = OomdContext::new();
        ctx.set_cgroup_context(
            CgroupPath::new("/sys/fs/cgroup", "x"),
            CgroupContext {
                io_pressure: ResourcePressure::unavailable(),
                ..Default::default()
            },
        );
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
    }

    #[test]
    fn missing_arguments_fail_init() {
        let mut plugin = PressureAbove::new();
        let mut resources = MonitoredResources::new();
        let context = PluginConstructionContext::new("/sys/fs/cgroup");

        let args = PluginArgs::from([("cgroup".to_string(), "x".to_string())]);
        assert!(plugin.init(&mut resources, &args, &context).is_err());

        let args = PluginArgs::from([
            ("cgroup".to_string(), "x".to_string()),
            ("resource".to_string(), "disk".to_string()),
            ("threshold".to_string(), "80".to_string()),
            ("duration".to_string(), "0".to_string()),
        ]);
        assert!(plugin.init(&mut resources, &args, &context).is_err());
    }
}
