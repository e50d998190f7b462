use std::cmp::Ordering;

use async_trait::async_trait;

use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::actions::base_kill::BaseKill;
use crate::plugins::interface::Plugin;
use crate::util::error::Result;

/// Kills the cgroup with the highest I/O cost rate, breaking ties by the
/// cumulative cost.
pub struct KillIOCost {
    base: BaseKill,
}

impl KillIOCost {
    pub fn new() -> Self {
        Self::with_base(BaseKill::new())
    }

    pub(crate) fn with_base(base: BaseKill) -> Self {
        Self { base }
    }
}

impl Default for KillIOCost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for KillIOCost {
    fn name(&self) -> &'static str {
        "kill_by_io_cost"
    }

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.base.init_common(self.name(), resources, args, context)
    }

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet> {
        let mut candidates = ctx.snapshot();
        self.base.prune_to_scope(&mut candidates);

        candidates.sort_by(|a, b| {
            b.1.io_cost_rate
                .partial_cmp(&a.1.io_cost_rate)
                .unwrap_or(Ordering::Equal)
                .then(
                    b.1.io_cost_cumulative
                        .partial_cmp(&a.1.io_cost_cumulative)
                        .unwrap_or(Ordering::Equal),
                )
        });

        if self.base.try_to_kill_something(self.name(), ctx, &candidates) {
            self.base.pause_after_kill().await;
            return Ok(PluginRet::Stop);
        }

        Ok(PluginRet::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::path::CgroupPath;
    use crate::core::context::CgroupContext;
    use crate::plugins::actions::base_kill::test_support::{make_cgroup, MockBackend, MockState};
    use tempfile::TempDir;

    struct Setup {
        plugin: KillIOCost,
        state: MockState,
        root: TempDir,
    }

    fn setup(cgroup_arg: &str, dry: bool) -> Setup {
        let root = TempDir::new().unwrap();
        make_cgroup(root.path(), "one_high/cgroup1", &[123]);
        make_cgroup(root.path(), "one_high/cgroup2", &[456]);
        make_cgroup(root.path(), "one_high/cgroup3", &[789]);
        make_cgroup(root.path(), "sibling/cgroup1", &[888]);

        let state = MockState::default();
        let mut plugin = KillIOCost::with_base(BaseKill::with_backend(Box::new(MockBackend {
            state: state.clone(),
        })));

        let mut resources = MonitoredResources::new();
        let mut args = PluginArgs::from([
            ("cgroup".to_string(), cgroup_arg.to_string()),
            ("post_action_delay".to_string(), "0".to_string()),
        ]);
        if dry {
            args.insert("dry".to_string(), "true".to_string());
        }
        let context = PluginConstructionContext::new(root.path().to_str().unwrap());
        plugin.init(&mut resources, &args, &context).unwrap();

        Setup {
            plugin,
            state,
            root,
        }
    }

    fn set_io_cost(ctx: &mut OomdContext, root: &TempDir, rel: &str, cumulative: f64, rate: f64) {
        ctx.set_cgroup_context(
            CgroupPath::new(root.path().to_str().unwrap(), rel),
            CgroupContext {
                io_cost_cumulative: cumulative,
                io_cost_rate: rate,
                ..Default::default()
            },
        );
    }

    fn populate(ctx: &mut OomdContext, root: &TempDir) {
        set_io_cost(ctx, root, "one_high/cgroup1", 10000.0, 10.0);
        set_io_cost(ctx, root, "one_high/cgroup2", 5000.0, 30.0);
        set_io_cost(ctx, root, "one_high/cgroup3", 6000.0, 50.0);
        set_io_cost(ctx, root, "sibling/cgroup1", 20000.0, 100.0);
    }

    #[tokio::test]
    async fn kills_the_highest_io_cost_rate() {
        let mut s = setup("one_high/*", false);
        let mut ctx = OomdContext::new();
        populate(&mut ctx, &s.root);

        assert_eq!(s.plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
        let killed = s.state.killed_pids();
        assert!(killed.contains(&789));
        assert_eq!(killed.len(), 1);
    }

    #[tokio::test]
    async fn multi_scope_includes_the_sibling() {
        let mut s = setup("one_high/*,sibling/*", false);
        let mut ctx = OomdContext::new();
        populate(&mut ctx, &s.root);

        assert_eq!(s.plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
        let killed = s.state.killed_pids();
        assert!(killed.contains(&888));
        assert_eq!(killed.len(), 1);
    }

    #[tokio::test]
    async fn ties_break_on_cumulative_cost() {
        let mut s = setup("one_high/*", false);
        let mut ctx = OomdContext::new();
        set_io_cost(&mut ctx, &s.root, "one_high/cgroup1", 10000.0, 50.0);
        set_io_cost(&mut ctx, &s.root, "one_high/cgroup2", 5000.0, 50.0);

        assert_eq!(s.plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
        assert!(s.state.killed_pids().contains(&123));
    }

    #[tokio::test]
    async fn dry_run_kills_nothing() {
        let mut s = setup("one_high/*", true);
        let mut ctx = OomdContext::new();
        populate(&mut ctx, &s.root);

        assert_eq!(s.plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
        assert!(s.state.killed_pids().is_empty());
    }
}
