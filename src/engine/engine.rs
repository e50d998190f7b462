use crate::core::context::OomdContext;
use crate::engine::ruleset::Ruleset;
use crate::engine::types::MonitoredResources;

/// The compiled rule program: every ruleset, evaluated in declaration
/// order each tick, plus the union of cgroup patterns the snapshot
/// builder must keep fresh.
pub struct Engine {
    resources: MonitoredResources,
    rulesets: Vec<Ruleset>,
}

impl Engine {
    pub fn new(resources: MonitoredResources, rulesets: Vec<Ruleset>) -> Self {
        Self {
            resources,
            rulesets,
        }
    }

    pub async fn run_once(&mut self, ctx: &mut OomdContext) {
        for ruleset in &mut self.rulesets {
            ruleset.run_once(ctx).await;
        }
    }

    pub fn monitored_resources(&self) -> &MonitoredResources {
        &self.resources
    }
}
