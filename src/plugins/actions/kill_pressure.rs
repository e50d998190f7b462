use async_trait::async_trait;

use crate::core::context::OomdContext;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};
use crate::plugins::actions::base_kill::BaseKill;
use crate::plugins::interface::Plugin;
use crate::plugins::{parse_resource_arg, ResourceType};
use crate::util::error::Result;

/// Kills the cgroup generating the most pressure on the configured
/// resource, judged by its worst PSI window.
pub struct KillPressure {
    base: BaseKill,
    resource: ResourceType,
}

impl KillPressure {
    pub fn new() -> Self {
        Self::with_base(BaseKill::new())
    }

    pub(crate) fn with_base(base: BaseKill) -> Self {
        Self {
            base,
            resource: ResourceType::Memory,
        }
    }
}

impl Default for KillPressure {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for KillPressure {
    fn name(&self) -> &'static str {
        "kill_by_pressure"
    }

    fn init(
        &mut self,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.base.init_common(self.name(), resources, args, context)?;
        self.resource = parse_resource_arg(self.name(), args)?;
        Ok(())
    }

    async fn run(&mut self, ctx: &mut OomdContext) -> Result<PluginRet> {
        let mut candidates = ctx.snapshot();
        self.base.prune_to_scope(&mut candidates);

        let resource = self.resource;
        OomdContext::reverse_sort_by(&mut candidates, move |cg| {
            let pressure = match resource {
                ResourceType::Memory => &cg.pressure,
                ResourceType::Io => &cg.io_pressure,
            };
            let worst = pressure.worst_window();
            if worst.is_finite() {
                worst as f64
            } else {
                f64::MIN
            }
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
    use crate::cgroup::types::ResourcePressure;
    use crate::core::context::CgroupContext;
    use crate::plugins::actions::base_kill::test_support::{make_cgroup, MockBackend, MockState};
    use tempfile::TempDir;

    struct Setup {
        plugin: KillPressure,
        state: MockState,
        root: TempDir,
    }

    fn setup(cgroup_arg: &str) -> Setup {
        let root = TempDir::new().unwrap();
        make_cgroup(root.path(), "one_high/cgroup1", &[123]);
        make_cgroup(root.path(), "one_high/cgroup2", &[456]);
        make_cgroup(root.path(), "one_high/cgroup3", &[789]);
        make_cgroup(root.path(), "sibling/cgroup1", &[111]);

        let state = MockState::default();
        let mut plugin = KillPressure::with_base(BaseKill::with_backend(Box::new(
            MockBackend {
                state: state.clone(),
            },
        )));

        let mut resources = MonitoredResources::new();
        let args = PluginArgs::from([
            ("cgroup".to_string(), cgroup_arg.to_string()),
            ("resource".to_string(), "io".to_string()),
            ("post_action_delay".to_string(), "0".to_string()),
        ]);
        let context = PluginConstructionContext::new(root.path().to_str().unwrap());
        plugin.init(&mut resources, &args, &context).unwrap();

        Setup {
            plugin,
            state,
            root,
        }
    }

    fn set_io_pressure(ctx: &mut OomdContext, root: &TempDir, rel: &str, sec_10: f32) {
        ctx.set_cgroup_context(
            CgroupPath::new(root.path().to_str().unwrap(), rel),
            CgroupContext {
                io_pressure: ResourcePressure {
                    sec_10,
                    sec_60: 1.0,
                    sec_600: 1.0,
                    total: None,
                },
                ..Default::default()
            },
        );
    }

    #[tokio::test]
    async fn kills_the_highest_pressure_in_scope() {
        let mut s = setup("one_high/*");
        let mut ctx = OomdContext::new();
        set_io_pressure(&mut ctx, &s.root, "one_high/cgroup1", 60.0);
        set_io_pressure(&mut ctx, &s.root, "one_high/cgroup2", 50.0);
        set_io_pressure(&mut ctx, &s.root, "one_high/cgroup3", 80.0);
        set_io_pressure(&mut ctx, &s.root, "sibling/cgroup1", 99.0);

        assert_eq!(s.plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
        let killed = s.state.killed_pids();
        assert!(killed.contains(&789));
        assert_eq!(killed.len(), 1);
    }

    #[tokio::test]
    async fn widened_scope_can_pick_the_sibling() {
        let mut s = setup("one_high/*,sibling/*");
        let mut ctx = OomdContext::new();
        set_io_pressure(&mut ctx, &s.root, "one_high/cgroup1", 60.0);
        set_io_pressure(&mut ctx, &s.root, "one_high/cgroup2", 50.0);
        set_io_pressure(&mut ctx, &s.root, "one_high/cgroup3", 80.0);
        set_io_pressure(&mut ctx, &s.root, "sibling/cgroup1", 99.0);

        assert_eq!(s.plugin.run(&mut ctx).await.unwrap(), PluginRet::Stop);
        let killed = s.state.killed_pids();
        assert!(killed.contains(&111));
        assert_eq!(killed.len(), 1);
    }

    #[tokio::test]
    async fn nothing_to_kill_continues() {
        let mut s = setup("one_high/*");
        let mut ctx = OomdContext::new();
        assert_eq!(s.plugin.run(&mut ctx).await.unwrap(), PluginRet::Continue);
        assert!(s.state.killed_pids().is_empty());
    }
}
