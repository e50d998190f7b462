use async_trait::async_trait;
use tracing::info;

use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::interface::Plugin;
use crate::plugins::required_arg;
use crate::util::error::Result;

/// Holds when free swap drops under `threshold_pct` percent of total
/// swap. Vetoes the group outright when swap is off.
#[derive(Default)]
pub struct SwapFree {
    threshold_pct: i64,
}

impl SwapFree {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Plugin for SwapFree {
    fn name(&self) -> &'static str {
        "swap_free"
    }

    fn init(
        &mut self,
        _resources: &mut MonitoredResources,
        args: &PluginArgs,
        _context: &PluginConstructionContext,
    ) -> Result<()> {
        self.threshold_pct = required_arg(self.name(), args, "threshold_pct")?;
        Ok(())
    }

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet> {
        let system = ctx.system_context();
        if system.swaptotal <= 0 {
            return Ok(PluginRet::Stop);
        }

        let swapfree = system.swaptotal - system.swapused;
        let swapthres = system.swaptotal * self.threshold_pct / 100;
        if swapfree < swapthres {
            info!(
                swapfree_mb = swapfree >> 20,
                threshold_mb = swapthres >> 20,
                swaptotal_mb = system.swaptotal >> 20,
                "free swap below threshold"
            );
            Ok(PluginRet::Continue)
        } else {
            Ok(PluginRet::Stop)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::SystemContext;

    fn setup(threshold_pct: &str) -> SwapFree {
        let mut plugin = SwapFree::new();
        let mut resources = MonitoredResources::new();
        let args = PluginArgs::from([("threshold_pct".to_string(), threshold_pct.to_string())]);
        let context = PluginConstructionContext::new("/sys/fs/cgroup");
        plugin.init(&mut resources, &args, &context).unwrap();
        plugin
    }

    fn ctx_with_swap(total_kib: i64, used_kib: i64) -> OomdContext {
        let mut ctx = OomdContext::new();
        ctx.set_system_context(SystemContext {
            swaptotal: total_kib * 1024,
            swapused: used_kib * 1024,
        });
        ctx
    }

    #[tokio::test]
    async fn fires_when_swap_nearly_exhausted() {
        let mut plugin = setup("20");
        let mut ctx = ctx_with_swap(20971512, 20971440);
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Continue);
    }

    #[tokio::test]
    async fn holds_off_with_plenty_of_swap() {
        let mut plugin = setup("20");
        let mut ctx = ctx_with_swap(20971512, 3310136);
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
    }

    #[tokio::test]
    async fn swap_off_vetoes() {
        let mut plugin = setup("20");
        let mut ctx = ctx_with_swap(0, 0);
        assert_eq!(plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
    }
}
