use tracing::{debug, info, warn};

use crate::core::context::{ActionContext, OomdContext};
use crate::engine::detector_group::DetectorGroup;
use crate::engine::types::PluginRet;
use crate::plugins::interface::Plugin;

/// One independently evaluated rule: a disjunction of detector groups
/// gating an ordered action chain.
pub struct Ruleset {
    name: String,
    detector_groups: Vec<DetectorGroup>,
    action_group: Vec<Box<dyn Plugin>>,
}

impl Ruleset {
    pub fn new(
        name: String,
        detector_groups: Vec<DetectorGroup>,
        action_group: Vec<Box<dyn Plugin>>,
    ) -> Self {
        Self {
            name,
            detector_groups,
            action_group,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run_once(&mut self, ctx: &mut OomdContext) {
        let mut fired_group: Option<String> = None;

        for dg in &mut self.detector_groups {
            if dg.check(ctx).await {
                info!(
                    detector_group = dg.name(),
                    ruleset = %self.name,
                    "detector group fired, running action chain"
                );
                fired_group = Some(dg.name().to_string());
                break;
            }
        }

        let Some(detectorgroup) = fired_group else {
            return;
        };

        ctx.set_action_context(ActionContext {
            ruleset: self.name.clone(),
            detectorgroup,
        });

        for action in &mut self.action_group {
            debug!(action = action.name(), "running action");
            let ret = match action.run(ctx).await {
                Ok(ret) => ret,
                Err(e) => {
                    warn!(action = action.name(), error = %e, "action failed, assuming CONTINUE");
                    PluginRet::Continue
                }
            };

            match ret {
                PluginRet::Continue => {
                    debug!(action = action.name(), "returned CONTINUE, continuing action chain");
                }
                PluginRet::Stop => {
                    debug!(action = action.name(), "returned STOP, terminating action chain");
                    break;
                }
            }
        }

        debug!(ruleset = %self.name, "finished executing ruleset");
    }
}
