use async_trait::async_trait;
use tracing::debug;

use crate::cgroup::path::CgroupPath;
use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::interface::Plugin;
use crate::plugins::{optional_arg, parse_cgroup_arg};
use crate::util::error::Result;
use crate::util::parse::{parse_bool, parse_size};

/// Rewrites the snapshot entries of the listed cgroups so that later
/// plugins in the same ruleset see a scaled or shifted usage. The one
/// action whose side effect is context mutation; raw memory.current is
/// left untouched, only `effective_usage()` changes.
pub struct AdjustCgroup {
    cgroups: Vec<CgroupPath>,
    memory_scale: Option<f32>,
    memory: Option<i64>,
    debug: bool,
}

impl AdjustCgroup {
    pub fn new() -> Self {
        Self {
            cgroups: Vec::new(),
            memory_scale: None,
            memory: None,
            debug: false,
        }
    }
}

impl Default for AdjustCgroup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for AdjustCgroup {
    fn name(&self) -> &'static str {
        "adjust_cgroup"
    }

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.cgroups = parse_cgroup_arg(self.name(), args, resources, context)?;
        self.memory_scale = optional_arg(self.name(), args, "memory_scale")?;
        if let Some(raw) = args.get("memory") {
            self.memory = Some(parse_size(raw)?);
        }
        if let Some(val) = args.get("debug") {
            self.debug = parse_bool(val);
        }
        Ok(())
    }

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet> {
        let targets: Vec<CgroupPath> = ctx
            .matching(&self.cgroups)
            .into_iter()
            .map(|(path, _)| path.clone())
            .collect();

        for path in targets {
            let Some(cg) = ctx.get_mut_cgroup_context(&path) else {
                continue;
            };
            if let Some(scale) = self.memory_scale {
                cg.memory_scale = scale;
            }
            if let Some(memory) = self.memory {
                // A positive `memory` argument raises effective usage,
                // which effective_usage() models as a negative discount
                cg.memory_adj = -memory;
            }
            if self.debug {
                debug!(
                    cgroup = %path,
                    effective_usage = cg.effective_usage(),
                    memory_scale = cg.memory_scale as f64,
                    memory_adj = cg.memory_adj,
                    "adjusted cgroup"
                );
            }
        }

        Ok(PluginRet::Continue)
    }
}
