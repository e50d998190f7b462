use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crate::cgroup::path::CgroupPath;
use crate::cgroup::types::ResourcePressure;

/// Snapshot of one cgroup at one tick. Everything here is read off the
/// cgroup filesystem by the snapshot builder except `average_usage`
/// (carried forward as an EWMA), `io_cost_rate` (delta against the
/// previous tick) and the `memory_scale`/`memory_adj` overlay, which only
/// the adjust_cgroup action touches.
#[derive(Debug, Clone, PartialEq)]
pub struct CgroupContext {
    pub pressure: ResourcePressure,
    pub io_pressure: ResourcePressure,
    pub current_usage: i64,
    pub average_usage: f64,
    pub memory_low: i64,
    pub swap_usage: i64,
    pub anon_usage: i64,
    pub memory_protection: i64,
    pub io_cost_cumulative: f64,
    pub io_cost_rate: f64,
    pub nr_dying_descendants: i64,
    pub memory_scale: f32,
    pub memory_adj: i64,
}

impl Default for CgroupContext {
    fn default() -> Self {
        Self {
            pressure: ResourcePressure::default(),
            io_pressure: ResourcePressure::default(),
            current_usage: 0,
            average_usage: 0.0,
            memory_low: 0,
            swap_usage: 0,
            anon_usage: 0,
            memory_protection: 0,
            io_cost_cumulative: 0.0,
            io_cost_rate: 0.0,
            nr_dying_descendants: 0,
            memory_scale: 1.0,
            memory_adj: 0,
        }
    }
}

impl CgroupContext {
    /// Usage as seen by victim selection, after the adjust_cgroup overlay
    /// and the protection discount.
    pub fn effective_usage(&self) -> i64 {
        (self.current_usage as f64 * self.memory_scale as f64) as i64
            - self.memory_adj
            - self.memory_protection
    }
}

/// Swap accounting read from /proc/meminfo once per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemContext {
    pub swaptotal: i64,
    pub swapused: i64,
}

/// Set by the engine right before an action chain runs, so actions can
/// report which ruleset and detector group put them on the hook.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub ruleset: String,
    pub detectorgroup: String,
}

#[derive(Debug)]
struct CgroupNode {
    path: CgroupPath,
    ctx: CgroupContext,
    parent: Option<usize>,
    children: Vec<usize>,
    /// Created only to anchor a descendant; holds no snapshot data.
    is_empty_branch: bool,
}

/// Per-tick cgroup state, organized as a tree (arena of nodes with parent
/// indices) with a hash index for O(1) path lookup. Rebuilt every tick;
/// plugins treat it as read-only except for the adjust_cgroup overlay.
#[derive(Debug, Default)]
pub struct OomdContext {
    nodes: Vec<CgroupNode>,
    node_index: HashMap<CgroupPath, usize>,
    action_context: ActionContext,
    system_context: SystemContext,
}

impl OomdContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_cgroup_context(&self, path: &CgroupPath) -> bool {
        self.node_index
            .get(path)
            .map(|&idx| !self.nodes[idx].is_empty_branch)
            .unwrap_or(false)
    }

    pub fn cgroups(&self) -> Vec<CgroupPath> {
        self.nodes
            .iter()
            .filter(|n| !n.is_empty_branch)
            .map(|n| n.path.clone())
            .collect()
    }

    pub fn get_cgroup_context(&self, path: &CgroupPath) -> Option<&CgroupContext> {
        self.node_index
            .get(path)
            .map(|&idx| &self.nodes[idx])
            .filter(|n| !n.is_empty_branch)
            .map(|n| &n.ctx)
    }

    pub fn get_mut_cgroup_context(&mut self, path: &CgroupPath) -> Option<&mut CgroupContext> {
        match self.node_index.get(path) {
            Some(&idx) if !self.nodes[idx].is_empty_branch => Some(&mut self.nodes[idx].ctx),
            _ => None,
        }
    }

    pub fn set_cgroup_context(&mut self, path: CgroupPath, ctx: CgroupContext) {
        let idx = self.ensure_node(&path);
        self.nodes[idx].ctx = ctx;
        self.nodes[idx].is_empty_branch = false;
    }

    fn ensure_node(&mut self, path: &CgroupPath) -> usize {
        if let Some(&idx) = self.node_index.get(path) {
            return idx;
        }

        let parent = if path.is_root() {
            None
        } else {
            Some(self.ensure_node(&path.parent()))
        };

        let idx = self.nodes.len();
        self.nodes.push(CgroupNode {
            path: path.clone(),
            ctx: CgroupContext::default(),
            parent,
            children: Vec::new(),
            is_empty_branch: true,
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(idx);
        }
        self.node_index.insert(path.clone(), idx);
        idx
    }

    /// Parent of a known cgroup, following the tree's back edge. The
    /// parent may be an empty branch.
    pub fn parent_of(&self, path: &CgroupPath) -> Option<&CgroupPath> {
        let &idx = self.node_index.get(path)?;
        self.nodes[idx]
            .parent
            .map(|p| &self.nodes[p].path)
    }

    /// Flat copy of every populated cgroup, in unspecified order.
    pub fn snapshot(&self) -> Vec<(CgroupPath, CgroupContext)> {
        self.nodes
            .iter()
            .filter(|n| !n.is_empty_branch)
            .map(|n| (n.path.clone(), n.ctx.clone()))
            .collect()
    }

    /// Populated cgroups whose path matches at least one of the given
    /// wildcard patterns.
    pub fn matching(&self, patterns: &[CgroupPath]) -> Vec<(&CgroupPath, &CgroupContext)> {
        self.nodes
            .iter()
            .filter(|n| !n.is_empty_branch)
            .filter(|n| patterns.iter().any(|p| n.path.matches_pattern(p)))
            .map(|n| (&n.path, &n.ctx))
            .collect()
    }

    /// Sorts largest-first by the given key.
    pub fn reverse_sort_by<F>(vec: &mut [(CgroupPath, CgroupContext)], get_key: F)
    where
        F: Fn(&CgroupContext) -> f64,
    {
        vec.sort_by(|a, b| {
            get_key(&b.1)
                .partial_cmp(&get_key(&a.1))
                .unwrap_or(Ordering::Equal)
        });
    }

    /// Restricts a candidate list to the configured scope: only entries
    /// matched by at least one pattern survive.
    pub fn remove_sibling_cgroups(
        patterns: &[CgroupPath],
        vec: &mut Vec<(CgroupPath, CgroupContext)>,
    ) {
        vec.retain(|(path, _)| patterns.iter().any(|p| path.matches_pattern(p)));
    }

    pub fn action_context(&self) -> &ActionContext {
        &self.action_context
    }

    pub fn set_action_context(&mut self, context: ActionContext) {
        self.action_context = context;
    }

    pub fn system_context(&self) -> &SystemContext {
        &self.system_context
    }

    pub fn set_system_context(&mut self, context: SystemContext) {
        self.system_context = context;
    }

    pub fn dump(&self) {
        for node in self.nodes.iter().filter(|n| !n.is_empty_branch) {
            let ms = &node.ctx;
            let pressure = format!(
                "{:.2}:{:.2}:{:.2}-{:.2}:{:.2}:{:.2}",
                ms.pressure.sec_10,
                ms.pressure.sec_60,
                ms.pressure.sec_600,
                ms.io_pressure.sec_10,
                ms.io_pressure.sec_60,
                ms.io_pressure.sec_600
            );
            debug!(
                cgroup = %node.path,
                pressure = %pressure,
                mem_mb = ms.current_usage >> 20,
                mem_avg_mb = (ms.average_usage as i64) >> 20,
                mem_low_mb = ms.memory_low >> 20,
                swap_mb = ms.swap_usage >> 20,
                "context entry"
            );
        }
    }
}
