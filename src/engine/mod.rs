pub mod detector_group;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod ruleset;
pub mod types;

pub use detector_group::DetectorGroup;
pub use engine::Engine;
pub use ruleset::Ruleset;
pub use types::{MonitoredResources, PluginArgs, PluginConstructionContext, PluginRet};

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::core::context::OomdContext;
    use crate::plugins::interface::Plugin;
    use crate::util::error::{OomdError, Result};

    type Trace = Arc<Mutex<Vec<String>>>;

    struct Scripted {
        label: String,
        ret: PluginRet,
        fail: bool,
        trace: Trace,
    }

    impl Scripted {
        fn boxed(label: &str, ret: PluginRet, trace: &Trace) -> Box<dyn Plugin> {
            Box::new(Self {
                label: label.to_string(),
                ret,
                fail: false,
                trace: trace.clone(),
            })
        }

        fn failing(label: &str, trace: &Trace) -> Box<dyn Plugin> {
            Box::new(Self {
                label: label.to_string(),
                ret: PluginRet::Stop,
                fail: true,
                trace: trace.clone(),
            })
        }
    }

    #[async_trait]
    impl Plugin for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
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
            self.trace.lock().unwrap().push(self.label.clone());
            if self.fail {
                return Err(OomdError::BadControlFile("scripted failure".to_string()));
            }
            Ok(self.ret)
        }
    }

    fn trace() -> Trace {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn logged(trace: &Trace) -> Vec<String> {
        trace.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn detector_stop_short_circuits_the_group() {
        let t = trace();
        let mut group = DetectorGroup::new(
            "group".to_string(),
            vec![
                Scripted::boxed("d1", PluginRet::Continue, &t),
                Scripted::boxed("d2", PluginRet::Stop, &t),
                Scripted::boxed("d3", PluginRet::Continue, &t),
            ],
        );

        let mut ctx = OomdContext::new();
        assert!(!group.check(&mut ctx).await);
        assert_eq!(logged(&t), vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn group_holds_when_all_detectors_continue() {
        let t = trace();
        let mut group = DetectorGroup::new(
            "group".to_string(),
            vec![
                Scripted::boxed("d1", PluginRet::Continue, &t),
                Scripted::boxed("d2", PluginRet::Continue, &t),
            ],
        );

        let mut ctx = OomdContext::new();
        assert!(group.check(&mut ctx).await);
        assert_eq!(logged(&t), vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn ruleset_fires_iff_any_group_holds() {
        let t = trace();
        let mut ruleset = Ruleset::new(
            "rule".to_string(),
            vec![
                DetectorGroup::new(
                    "vetoed".to_string(),
                    vec![Scripted::boxed("g1", PluginRet::Stop, &t)],
                ),
                DetectorGroup::new(
                    "holds".to_string(),
                    vec![Scripted::boxed("g2", PluginRet::Continue, &t)],
                ),
            ],
            vec![Scripted::boxed("act", PluginRet::Continue, &t)],
        );

        let mut ctx = OomdContext::new();
        ruleset.run_once(&mut ctx).await;
        assert_eq!(logged(&t), vec!["g1", "g2", "act"]);
        assert_eq!(ctx.action_context().ruleset, "rule");
        assert_eq!(ctx.action_context().detectorgroup, "holds");
    }

    #[tokio::test]
    async fn ruleset_without_matching_group_runs_no_actions() {
        let t = trace();
        let mut ruleset = Ruleset::new(
            "rule".to_string(),
            vec![DetectorGroup::new(
                "vetoed".to_string(),
                vec![Scripted::boxed("g1", PluginRet::Stop, &t)],
            )],
            vec![Scripted::boxed("act", PluginRet::Continue, &t)],
        );

        let mut ctx = OomdContext::new();
        ruleset.run_once(&mut ctx).await;
        assert_eq!(logged(&t), vec!["g1"]);
    }

    #[tokio::test]
    async fn action_stop_skips_remaining_actions() {
        let t = trace();
        let mut ruleset = Ruleset::new(
            "rule".to_string(),
            vec![DetectorGroup::new(
                "holds".to_string(),
                vec![Scripted::boxed("d", PluginRet::Continue, &t)],
            )],
            vec![
                Scripted::boxed("a1", PluginRet::Continue, &t),
                Scripted::boxed("a2", PluginRet::Stop, &t),
                Scripted::boxed("a3", PluginRet::Continue, &t),
            ],
        );

        let mut ctx = OomdContext::new();
        ruleset.run_once(&mut ctx).await;
        assert_eq!(logged(&t), vec!["d", "a1", "a2"]);
    }

    #[tokio::test]
    async fn rulesets_are_isolated_from_each_other() {
        let t = trace();
        let make_rule = |name: &str, det_ret: PluginRet, t: &Trace| {
            Ruleset::new(
                name.to_string(),
                vec![DetectorGroup::new(
                    format!("{}-dg", name),
                    vec![Scripted::boxed(&format!("{}-det", name), det_ret, t)],
                )],
                vec![Scripted::boxed(&format!("{}-act", name), PluginRet::Stop, t)],
            )
        };

        let mut engine = Engine::new(
            MonitoredResources::new(),
            vec![
                make_rule("r1", PluginRet::Continue, &t),
                make_rule("r2", PluginRet::Stop, &t),
                make_rule("r3", PluginRet::Continue, &t),
            ],
        );

        let mut ctx = OomdContext::new();
        engine.run_once(&mut ctx).await;

        // r1 and r3 fire and run their actions; r2's action never runs,
        // and r1's STOP action has no bearing on r3.
        assert_eq!(
            logged(&t),
            vec!["r1-det", "r1-act", "r2-det", "r3-det", "r3-act"]
        );
    }

    #[tokio::test]
    async fn failing_detector_counts_as_continue() {
        let t = trace();
        let mut group = DetectorGroup::new(
            "group".to_string(),
            vec![
                Scripted::failing("broken", &t),
                Scripted::boxed("after", PluginRet::Continue, &t),
            ],
        );

        let mut ctx = OomdContext::new();
        assert!(group.check(&mut ctx).await);
        assert_eq!(logged(&t), vec!["broken", "after"]);
    }
}
