use async_trait::async_trait;

use crate::cgroup::path::CgroupPath;
use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::interface::Plugin;
use crate::plugins::parse_cgroup_arg;
use crate::util::error::Result;

/// Holds when any of the listed cgroups (wildcards included) is present
/// in the snapshot. `negate=true` inverts the check.
#[derive(Default)]
pub struct Exists {
    cgroups: Vec<CgroupPath>,
    negate: bool,
}

impl Exists {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Plugin for Exists {
    fn name(&self) -> &'static str {
        "exists"
    }

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.cgroups = parse_cgroup_arg(self.name(), args, resources, context)?;
        if let Some(val) = args.get("negate") {
            self.negate = crate::util::parse::parse_bool(val);
        }
        Ok(())
    }

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet> {
        let exists = !ctx.matching(&self.cgroups).is_empty();
        if exists != self.negate {
            Ok(PluginRet::Continue)
        } else {
            Ok(PluginRet::Stop)
        }
    }
}
