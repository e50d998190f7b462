use async_trait::async_trait;

use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::interface::Plugin;
use crate::util::error::Result;

/// Unconditionally vetoes its detector group. Useful for disabling a
/// ruleset in place without deleting its config.
#[derive(Default)]
pub struct Stop;

impl Stop {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for Stop {
    fn name(&self) -> &'static str {
        "stop"
    }

    fn init(
        &mut self,
        _resources: &mut MonitoredResources,
        _args: &PluginArgs,
        _context: &PluginConstructionContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn run(&mut self, _ctx: &mut OomdContext) -> Result<PluginRet> {
        Ok(PluginRet::Stop)
    }
}
