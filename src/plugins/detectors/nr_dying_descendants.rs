use async_trait::async_trait;
use tracing::debug;

use crate::cgroup::path::CgroupPath;
use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::interface::Plugin;
use crate::plugins::{parse_cgroup_arg, required_arg};
use crate::util::error::{OomdError, Result};

/// Compares a cgroup's count of dying descendants against a bound:
/// with `lte=true` (the default) holds when the count is <= `count`,
/// otherwise holds when it is > `count`.
pub struct NrDyingDescendants {
    cgroups: Vec<CgroupPath>,
    count: i64,
    lte: bool,
    debug: bool,
}

impl NrDyingDescendants {
    pub fn new() -> Self {
        Self {
            cgroups: Vec::new(),
            count: 0,
            lte: true,
            debug: false,
        }
    }
}

impl Default for NrDyingDescendants {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for NrDyingDescendants {
    fn name(&self) -> &'static str {
        "nr_dying_descendants"
    }

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.cgroups = parse_cgroup_arg(self.name(), args, resources, context)?;

        self.count = required_arg(self.name(), args, "count")?;
        if self.count < 0 {
            return Err(OomdError::plugin_init(
                self.name(),
                "argument=count must be non-negative",
            ));
        }

        if let Some(val) = args.get("lte") {
            self.lte = crate::util::parse::parse_bool(val);
        }
        if let Some(val) = args.get("debug") {
            self.debug = crate::util::parse::parse_bool(val);
        }

        Ok(())
    }

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet> {
        for (path, cg) in ctx.matching(&self.cgroups) {
            let nr = cg.nr_dying_descendants;
            if (self.lte && nr <= self.count) || (!self.lte && nr > self.count) {
                if self.debug {
                    debug!(
                        cgroup = %path,
                        nr_dying_descendants = nr,
                        count = self.count,
                        lte = self.lte,
                        "dying descendants bound met"
                    );
                }
                return Ok(PluginRet::Continue);
            }
        }

        Ok(PluginRet::Stop)
    }
}
