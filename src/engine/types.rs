use std::collections::{HashMap, HashSet};

use crate::cgroup::path::CgroupPath;

/// Verdict shared by detectors and actions.
///
/// For a detector, CONTINUE means "condition met, keep evaluating the
/// group" and STOP vetoes the group. For an action, STOP terminates the
/// ruleset's action chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginRet {
    Continue,
    Stop,
}

/// Flat key=value argument map bound to a plugin at construction time.
pub type PluginArgs = HashMap<String, String>;

/// Union of every cgroup pattern any plugin asked to have watched;
/// populated during plugin init so the snapshot builder knows what to
/// read each tick.
pub type MonitoredResources = HashSet<CgroupPath>;

/// Ambient facts a plugin needs while parsing its arguments, notably the
/// cgroup filesystem mount point the daemon was pointed at.
#[derive(Debug, Clone)]
pub struct PluginConstructionContext {
    cgroup_fs: String,
}

impl PluginConstructionContext {
    pub fn new(cgroup_fs: &str) -> Self {
        Self {
            cgroup_fs: cgroup_fs.to_string(),
        }
    }

    pub fn cgroup_fs(&self) -> &str {
        &self.cgroup_fs
    }
}
