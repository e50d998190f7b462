use async_trait::async_trait;

use crate::core::context::{CgroupContext, OomdContext};
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::actions::base_kill::BaseKill;
use crate::plugins::interface::Plugin;
use crate::plugins::optional_arg;
use crate::util::error::Result;

const DEFAULT_SIZE_THRESHOLD_PCT: f64 = 50.0;
const DEFAULT_MIN_GROWTH_RATIO: f64 = 1.25;

/// Kills the dominant memory consumer, falling back to the fastest
/// grower. Selection runs in three passes over the pruned scope:
///
/// 1. cgroups holding at least `size_threshold` percent of the scope's
///    total usage, biggest first;
/// 2. cgroups growing at least `min_growth_ratio` over their running
///    average, fastest growing first;
/// 3. everything by size, biggest first, as the last resort.
pub struct KillMemoryGrowth {
    base: BaseKill,
    size_threshold_pct: f64,
    min_growth_ratio: f64,
}

impl KillMemoryGrowth {
    pub fn new() -> Self {
        Self::with_base(BaseKill::new())
    }

    pub(crate) fn with_base(base: BaseKill) -> Self {
        Self {
            base,
            size_threshold_pct: DEFAULT_SIZE_THRESHOLD_PCT,
            min_growth_ratio: DEFAULT_MIN_GROWTH_RATIO,
        }
    }

    fn growth_ratio(cg: &CgroupContext) -> f64 {
        cg.current_usage as f64 / cg.average_usage.max(1.0)
    }
}

impl Default for KillMemoryGrowth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for KillMemoryGrowth {
    fn name(&self) -> &'static str {
        "kill_by_memory_size_or_growth"
    }

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.base.init_common(self.name(), resources, args, context)?;
        if let Some(pct) = optional_arg(self.name(), args, "size_threshold")? {
            self.size_threshold_pct = pct;
        }
        if let Some(ratio) = optional_arg(self.name(), args, "min_growth_ratio")? {
            self.min_growth_ratio = ratio;
        }
        Ok(())
    }

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet> {
        let mut candidates = ctx.snapshot();
        self.base.prune_to_scope(&mut candidates);

        let total: i64 = candidates.iter().map(|(_, cg)| cg.current_usage).sum();
        let size_floor = total as f64 * self.size_threshold_pct / 100.0;

        // Pass 1: clear memory hogs
        let mut sized: Vec<_> = candidates
            .iter()
            .filter(|(_, cg)| cg.effective_usage() as f64 >= size_floor)
            .cloned()
            .collect();
        OomdContext::reverse_sort_by(&mut sized, |cg| cg.effective_usage() as f64);
        if self.base.try_to_kill_something(self.name(), ctx, &sized) {
            self.base.pause_after_kill().await;
            return Ok(PluginRet::Stop);
        }

        // Pass 2: fast growers
        let mut growing: Vec<_> = candidates
            .iter()
            .filter(|(_, cg)| Self::growth_ratio(cg) >= self.min_growth_ratio)
            .cloned()
            .collect();
        OomdContext::reverse_sort_by(&mut growing, Self::growth_ratio);
        if self.base.try_to_kill_something(self.name(), ctx, &growing) {
            self.base.pause_after_kill().await;
            return Ok(PluginRet::Stop);
        }

        // Pass 3: last-ditch size kill with no threshold
        let mut by_size = candidates;
        OomdContext::reverse_sort_by(&mut by_size, |cg| cg.effective_usage() as f64);
        if self.base.try_to_kill_something(self.name(), ctx, &by_size) {
            self.base.pause_after_kill().await;
            return Ok(PluginRet::Stop);
        }

        Ok(PluginRet::Continue)
    }
}
