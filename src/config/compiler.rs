use tracing::error;

use crate::config::ir;
use crate::engine::{DetectorGroup, Engine, MonitoredResources, PluginConstructionContext, Ruleset};
use crate::plugins::interface::Plugin;
use crate::plugins::registry::registry;
use crate::util::error::{OomdError, Result};

/// Lowers the IR into a runnable engine. Every plugin is constructed and
/// initialized here, exactly once; any bad plugin name or argument set
/// aborts compilation so the daemon refuses to start.
pub fn compile(root: &ir::Root, context: &PluginConstructionContext) -> Result<Engine> {
    if root.version.is_empty() {
        return Err(OomdError::Config("no version string specified".to_string()));
    }

    let mut resources = MonitoredResources::new();
    let mut rulesets = Vec::new();

    for ruleset in &root.rulesets {
        rulesets.push(compile_ruleset(&mut resources, ruleset, context)?);
    }

    Ok(Engine::new(resources, rulesets))
}

fn compile_ruleset(
    resources: &mut MonitoredResources,
    ruleset: &ir::Ruleset,
    context: &PluginConstructionContext,
) -> Result<Ruleset> {
    if ruleset.name.is_empty() {
        return Err(OomdError::Config("ruleset is missing name".to_string()));
    }
    if ruleset.dgs.is_empty() || ruleset.acts.is_empty() {
        return Err(OomdError::Config(format!(
            "ruleset {} is missing detector groups or actions",
            ruleset.name
        )));
    }

    let mut detector_groups = Vec::new();
    for dg in &ruleset.dgs {
        detector_groups.push(compile_detector_group(resources, dg, context)?);
    }

    let mut actions = Vec::new();
    for action in &ruleset.acts {
        actions.push(compile_plugin(resources, action, context)?);
    }

    Ok(Ruleset::new(
        ruleset.name.clone(),
        detector_groups,
        actions,
    ))
}

fn compile_detector_group(
    resources: &mut MonitoredResources,
    group: &ir::DetectorGroup,
    context: &PluginConstructionContext,
) -> Result<DetectorGroup> {
    if group.name.is_empty() {
        return Err(OomdError::Config(
            "detector group is missing name".to_string(),
        ));
    }
    if group.detectors.is_empty() {
        return Err(OomdError::Config(format!(
            "detector group {} has no detectors",
            group.name
        )));
    }

    let mut detectors = Vec::new();
    for detector in &group.detectors {
        detectors.push(compile_plugin(resources, detector, context)?);
    }

    Ok(DetectorGroup::new(group.name.clone(), detectors))
}

fn compile_plugin(
    resources: &mut MonitoredResources,
    spec: &ir::PluginSpec,
    context: &PluginConstructionContext,
) -> Result<Box<dyn Plugin>> {
    if spec.name.is_empty() {
        return Err(OomdError::Config("plugin is missing name".to_string()));
    }

    let mut instance = registry().create(&spec.name).ok_or_else(|| {
        OomdError::Config(format!(
            "could not locate plugin {} in plugin registry",
            spec.name
        ))
    })?;

    if let Err(e) = instance.init(resources, &spec.args, context) {
        error!(plugin = %spec.name, error = %e, "plugin failed to init");
        return Err(e);
    }

    Ok(instance)
}
