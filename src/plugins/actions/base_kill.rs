use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cgroup::fs::{self, EntryFilter};
use crate::cgroup::path::CgroupPath;
use crate::core::context::{CgroupContext, OomdContext};
use crate::engine::types::{MonitoredResources, PluginArgs, PluginConstructionContext};
use crate::plugins::{optional_arg, parse_cgroup_arg};
use crate::util::error::{OomdError, Result};

pub const KILL_INITIATION_XATTR: &str = "trusted.oomd_ooms";
pub const KILL_COMPLETION_XATTR: &str = "trusted.oomd_kill";
pub const KILL_UUID_XATTR: &str = "trusted.oomd_kill_uuid";

const DEFAULT_POST_ACTION_DELAY_SECS: u64 = 15;

/// The side-effecting bits of a kill, split out so tests can intercept
/// signals and xattr writes while everything else runs for real.
pub trait KillBackend: Send + Sync {
    fn kill_pids(&mut self, pids: &[libc::pid_t]) -> usize;
    fn getxattr(&self, path: &str, attr: &str) -> String;
    fn setxattr(&mut self, path: &str, attr: &str, val: &str) -> bool;
}

/// Delivers SIGKILL and writes the audit xattrs on the live system.
pub struct SigkillBackend;

impl KillBackend for SigkillBackend {
    fn kill_pids(&mut self, pids: &[libc::pid_t]) -> usize {
        let mut nr_killed = 0;
        for &pid in pids {
            match kill(Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) => {
                    info!(pid, "killed pid");
                    nr_killed += 1;
                }
                Err(e) => {
                    warn!(pid, error = %e, "failed to kill pid");
                }
            }
        }
        nr_killed
    }

    fn getxattr(&self, path: &str, attr: &str) -> String {
        fs::get_xattr(path, attr)
    }

    fn setxattr(&mut self, path: &str, attr: &str, val: &str) -> bool {
        fs::set_xattr(path, attr, val)
    }
}

/// Common machinery of every kill action: scope pruning, the recursive
/// kill walk, the xattr audit trail, and the post-kill delay. Concrete
/// plugins differ only in how they order the candidates.
pub struct BaseKill {
    cgroups: Vec<CgroupPath>,
    post_action_delay_secs: u64,
    dry: bool,
    backend: Box<dyn KillBackend>,
}

impl BaseKill {
    pub fn new() -> Self {
        Self::with_backend(Box::new(SigkillBackend))
    }

    pub fn with_backend(backend: Box<dyn KillBackend>) -> Self {
        Self {
            cgroups: Vec::new(),
            post_action_delay_secs: DEFAULT_POST_ACTION_DELAY_SECS,
            dry: false,
            backend,
        }
    }

    /// Parses the arguments every kill plugin shares: `cgroup`,
    /// `post_action_delay` and `dry`.
    pub fn init_common(
        &mut self,
        plugin: &str,
        resources: &mut MonitoredResources,
        args: &PluginArgs,
        context: &PluginConstructionContext,
    ) -> Result<()> {
        self.cgroups = parse_cgroup_arg(plugin, args, resources, context)?;

        if let Some(delay) = optional_arg::<i64>(plugin, args, "post_action_delay")? {
            if delay < 0 {
                return Err(OomdError::plugin_init(
                    plugin,
                    "argument=post_action_delay must be non-negative",
                ));
            }
            self.post_action_delay_secs = delay as u64;
        }

        if let Some(val) = args.get("dry") {
            self.dry = crate::util::parse::parse_bool(val);
        }

        Ok(())
    }

    pub fn cgroups(&self) -> &[CgroupPath] {
        &self.cgroups
    }

    pub fn is_dry(&self) -> bool {
        self.dry
    }

    /// Confine candidates to the configured cgroup scope.
    pub fn prune_to_scope(&self, vec: &mut Vec<(CgroupPath, CgroupContext)>) {
        OomdContext::remove_sibling_cgroups(&self.cgroups, vec);
    }

    /// Walks the ranked candidates and kills the first one that yields at
    /// least one dead process. Returns whether anything was killed.
    pub fn try_to_kill_something(
        &mut self,
        plugin: &str,
        ctx: &OomdContext,
        candidates: &[(CgroupPath, CgroupContext)],
    ) -> bool {
        for (path, cgroup_ctx) in candidates {
            if let Some(kill_uuid) = self.try_to_kill_cgroup(&path.absolute(), true, self.dry) {
                self.log_kill(plugin, ctx, path, cgroup_ctx, &kill_uuid);
                return true;
            }
        }
        false
    }

    /// Kills every process in the cgroup. With `recursive`, descends
    /// depth first, killing at each node before walking into its
    /// children so freshly forked processes can't escape into an
    /// unvisited subtree. Returns the kill's UUID, or None when not a
    /// single process died.
    pub fn try_to_kill_cgroup(
        &mut self,
        cgroup_abs_path: &str,
        recursive: bool,
        dry: bool,
    ) -> Option<String> {
        let kill_uuid = Uuid::new_v4().to_string();

        if dry {
            info!(cgroup = cgroup_abs_path, "dry-run mode, would have killed");
            return Some(kill_uuid);
        }

        self.report_kill_initiation(cgroup_abs_path);

        let nr_killed = self.kill_cgroup_tree(cgroup_abs_path, recursive);
        if nr_killed == 0 {
            return None;
        }

        self.report_kill_completion(cgroup_abs_path, nr_killed);
        self.report_kill_uuid(cgroup_abs_path, &kill_uuid);
        Some(kill_uuid)
    }

    fn kill_cgroup_tree(&mut self, cgroup_abs_path: &str, recursive: bool) -> usize {
        let pids = fs::get_pids(cgroup_abs_path);
        let mut nr_killed = self.backend.kill_pids(&pids);

        if recursive {
            for dir in fs::read_dir(cgroup_abs_path, EntryFilter::Dirs).dirs {
                nr_killed +=
                    self.kill_cgroup_tree(&format!("{}/{}", cgroup_abs_path, dir), true);
            }
        }

        nr_killed
    }

    fn log_kill(
        &self,
        plugin: &str,
        ctx: &OomdContext,
        path: &CgroupPath,
        cgroup_ctx: &CgroupContext,
        kill_uuid: &str,
    ) {
        let action = ctx.action_context();
        let pressure = format!(
            "{:.2}:{:.2}:{:.2}",
            cgroup_ctx.pressure.sec_10, cgroup_ctx.pressure.sec_60, cgroup_ctx.pressure.sec_600
        );
        info!(
            killed = %path,
            usage_mb = cgroup_ctx.current_usage >> 20,
            pressure = %pressure,
            killer = plugin,
            dry = self.dry,
            kill_uuid,
            ruleset = %action.ruleset,
            detectorgroup = %action.detectorgroup,
            "oomd kill"
        );
    }

    /// Bumped once per kill attempt, before any signal goes out.
    pub fn report_kill_initiation(&mut self, cgroup_abs_path: &str) {
        let prev: i64 = self
            .backend
            .getxattr(cgroup_abs_path, KILL_INITIATION_XATTR)
            .parse()
            .unwrap_or(0);
        self.backend.setxattr(
            cgroup_abs_path,
            KILL_INITIATION_XATTR,
            &(prev + 1).to_string(),
        );
    }

    /// Accumulates the number of killed processes across all kills.
    pub fn report_kill_completion(&mut self, cgroup_abs_path: &str, nr_killed: usize) {
        let prev: i64 = self
            .backend
            .getxattr(cgroup_abs_path, KILL_COMPLETION_XATTR)
            .parse()
            .unwrap_or(0);
        self.backend.setxattr(
            cgroup_abs_path,
            KILL_COMPLETION_XATTR,
            &(prev + nr_killed as i64).to_string(),
        );
    }

    /// The UUID is replaced, not accumulated: it identifies the latest kill.
    pub fn report_kill_uuid(&mut self, cgroup_abs_path: &str, kill_uuid: &str) {
        self.backend
            .setxattr(cgroup_abs_path, KILL_UUID_XATTR, kill_uuid);
    }

    pub async fn pause_after_kill(&self) {
        if self.post_action_delay_secs > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(self.post_action_delay_secs))
                .await;
        }
    }
}

impl Default for BaseKill {
    fn default() -> Self {
        Self::new()
    }
}
