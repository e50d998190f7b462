pub mod fs;
pub mod path;
pub mod types;

pub use path::CgroupPath;
pub use types::{DeviceIOStat, IOStat, PressureType, ResourcePressure};
