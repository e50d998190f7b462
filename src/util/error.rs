use thiserror::Error;

#[derive(Error, Debug)]
pub enum OomdError {
    /// Parse or I/O failure on a cgroup or PSI control file. Call sites
    /// either elide the field or treat the cgroup as not applicable for
    /// the current tick.
    #[error("bad control file: {0}")]
    BadControlFile(String),

    #[error("invalid cgroup path: {0}")]
    InvalidCgroupPath(String),

    /// A monitored cgroup has no memory controller enabled. Unrecoverable.
    #[error("cgroup memory controller not enabled on {0}")]
    MissingController(String),

    /// Bad argument set at plugin construction. The daemon refuses to start.
    #[error("plugin {plugin}: {msg}")]
    PluginInit { plugin: String, msg: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OomdError {
    pub fn plugin_init(plugin: &str, msg: impl Into<String>) -> Self {
        Self::PluginInit {
            plugin: plugin.to_string(),
            msg: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OomdError>;
