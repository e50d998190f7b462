use tracing::{debug, warn};

use crate::core::context::OomdContext;
use crate::engine::types::PluginRet;
use crate::plugins::interface::Plugin;

/// A conjunction of detectors: the group holds iff every detector in it
/// returns CONTINUE. The first STOP aborts the chain, so detectors at
/// later positions are never consulted that tick.
pub struct DetectorGroup {
    name: String,
    detectors: Vec<Box<dyn Plugin>>,
}

impl DetectorGroup {
    pub fn new(name: String, detectors: Vec<Box<dyn Plugin>>) -> Self {
        Self { name, detectors }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn check(&mut self, ctx: &mut OomdContext) -> bool {
        for detector in &mut self.detectors {
            let ret = match detector.run(ctx).await {
                Ok(ret) => ret,
                Err(e) => {
                    warn!(detector = detector.name(), error = %e, "detector failed, assuming CONTINUE");
                    PluginRet::Continue
                }
            };

            match ret {
                PluginRet::Continue => {
                    debug!(detector = detector.name(), "returned CONTINUE, continuing detector chain");
                }
                PluginRet::Stop => {
                    debug!(detector = detector.name(), "returned STOP, terminating detector chain");
                    return false;
                }
            }
        }

        true
    }
}
