use async_trait::async_trait;

use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::util::error::Result;

/// Interface shared by every detector and action.
///
/// A plugin is constructed exactly once, at rule-program load time.
/// `init` validates the argument map and records the cgroup patterns the
/// plugin wants watched; a failure there is fatal to daemon startup.
/// `run` is invoked once per tick while the plugin's ruleset is being
/// evaluated. Plugins may keep internal state between ticks but must not
/// hold references into the context, which is rebuilt every tick.
///
/// An `Err` out of `run` is caught by the engine, logged, and treated as
/// CONTINUE ("no opinion").
#[async_trait]
pub trait Plugin: Send {
    fn name(&self) -> &'static str;

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()>;

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet>;
}
