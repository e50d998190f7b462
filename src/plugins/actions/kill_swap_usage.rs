use async_trait::async_trait;

use crate::cgroup::fs;
use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::actions::base_kill::BaseKill;
use crate::plugins::interface::Plugin;
use crate::util::error::Result;
use crate::util::parse::{parse_mem_threshold, MemThreshold};

/// Kills the cgroup using the most swap. With a `threshold` argument the
/// action holds off entirely until the scope's combined swap usage
/// crosses it (a percentage resolves against SwapTotal).
pub struct KillSwapUsage {
    base: BaseKill,
    threshold: Option<MemThreshold>,
    meminfo_location: Option<String>,
}

impl KillSwapUsage {
    pub fn new() -> Self {
        Self::with_base(BaseKill::new())
    }

    pub(crate) fn with_base(base: BaseKill) -> Self {
        Self {
            base,
            threshold: None,
            meminfo_location: None,
        }
    }

    fn swaptotal(&self, ctx: &OomdContext) -> i64 {
        match &self.meminfo_location {
            Some(loc) => fs::get_meminfo(loc)
                .map(|m| m.get("SwapTotal").copied().unwrap_or(0))
                .unwrap_or(0),
            None => ctx.system_context().swaptotal,
        }
    }
}

impl Default for KillSwapUsage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for KillSwapUsage {
    fn name(&self) -> &'static str {
        "kill_by_swap_usage"
    }

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.base.init_common(self.name(), resources, args, context)?;
        if let Some(raw) = args.get("threshold") {
            self.threshold = Some(parse_mem_threshold(raw)?);
        }
        self.meminfo_location = args.get("meminfo_location").cloned();
        Ok(())
    }

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet> {
        let mut candidates = ctx.snapshot();
        self.base.prune_to_scope(&mut candidates);

        // A cgroup with no swap footprint is never a useful victim here
        candidates.retain(|(_, cg)| cg.swap_usage > 0);

        if let Some(threshold) = self.threshold {
            let used: i64 = candidates.iter().map(|(_, cg)| cg.swap_usage).sum();
            if used < threshold.resolve(self.swaptotal(ctx)) {
                return Ok(PluginRet::Continue);
            }
        }

        OomdContext::reverse_sort_by(&mut candidates, |cg| cg.swap_usage as f64);
        if self.base.try_to_kill_something(self.name(), ctx, &candidates) {
            self.base.pause_after_kill().await;
            return Ok(PluginRet::Stop);
        }

        Ok(PluginRet::Continue)
    }
}
