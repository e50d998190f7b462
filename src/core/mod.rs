pub mod context;

pub use context::{ActionContext, CgroupContext, OomdContext, SystemContext};
