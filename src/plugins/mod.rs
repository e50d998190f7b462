pub mod actions;
pub mod detectors;
pub mod interface;
pub mod registry;

use crate::cgroup::path::CgroupPath;
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext};
use crate::util::error::{OomdError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceType {
    #[default]
    Memory,
    Io,
}

/// Parses the mandatory `cgroup` argument: a comma-separated list of
/// relative paths, each possibly wildcarded. Every pattern is recorded in
/// the monitored resource set so the snapshot builder picks it up.
pub(crate) fn parse_cgroup_arg(
    plugin: &str,
    args: &PluginArgs,
    resources: &mut MonitoredResources,
    context: &PluginConstructionContext,
) -> Result<Vec<CgroupPath>> {
    let raw = args
        .get("cgroup")
        .ok_or_else(|| OomdError::plugin_init(plugin, "argument=cgroup not present"))?;

    let cgroups: Vec<CgroupPath> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|part| CgroupPath::new(context.cgroup_fs(), part))
        .collect();

    if cgroups.is_empty() {
        return Err(OomdError::plugin_init(plugin, "argument=cgroup is empty"));
    }

    for cgroup in &cgroups {
        resources.insert(cgroup.clone());
    }

    Ok(cgroups)
}

pub(crate) fn parse_resource_arg(plugin: &str, args: &PluginArgs) -> Result<ResourceType> {
    match args.get("resource").map(String::as_str) {
        Some("memory") => Ok(ResourceType::Memory),
        Some("io") => Ok(ResourceType::Io),
        _ => Err(OomdError::plugin_init(
            plugin,
            "argument=resource missing or not (io|memory)",
        )),
    }
}

pub(crate) fn required_arg<T: std::str::FromStr>(
    plugin: &str,
    args: &PluginArgs,
    key: &str,
) -> Result<T> {
    match args.get(key) {
        Some(val) => val
            .parse()
            .map_err(|_| OomdError::plugin_init(plugin, format!("argument={} is invalid", key))),
        None => Err(OomdError::plugin_init(
            plugin,
            format!("argument={} not present", key),
        )),
    }
}

pub(crate) fn optional_arg<T: std::str::FromStr>(
    plugin: &str,
    args: &PluginArgs,
    key: &str,
) -> Result<Option<T>> {
    match args.get(key) {
        Some(val) => val
            .parse()
            .map(Some)
            .map_err(|_| OomdError::plugin_init(plugin, format!("argument={} is invalid", key))),
        None => Ok(None),
    }
}
