use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureType {
    /// At least one task stalled on the resource.
    Some,
    /// All non-idle tasks stalled simultaneously.
    Full,
}

/// PSI rolling averages over the 10s/60s/300s windows, in percent, plus
/// the cumulative stall total where the kernel reports one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePressure {
    pub sec_10: f32,
    pub sec_60: f32,
    pub sec_600: f32,
    #[serde(skip)]
    pub total: Option<Duration>,
}

impl ResourcePressure {
    pub fn worst_window(&self) -> f32 {
        self.sec_10.max(self.sec_60).max(self.sec_600)
    }

    /// Marker value used when a kernel lacks the control file entirely.
    pub fn unavailable() -> Self {
        Self {
            sec_10: f32::NAN,
            sec_60: f32::NAN,
            sec_600: f32::NAN,
            total: None,
        }
    }
}

impl Default for ResourcePressure {
    fn default() -> Self {
        Self {
            sec_10: 0.0,
            sec_60: 0.0,
            sec_600: 0.0,
            total: None,
        }
    }
}

/// One line of io.stat: cumulative counters for a single block device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIOStat {
    pub dev_id: String,
    pub rbytes: i64,
    pub wbytes: i64,
    pub rios: i64,
    pub wios: i64,
    pub dbytes: i64,
    pub dios: i64,
}

pub type IOStat = Vec<DeviceIOStat>;
