use std::collections::HashMap;
use std::sync::OnceLock;

use crate::plugins::actions;
use crate::plugins::detectors;
use crate::plugins::interface::Plugin;

type Factory = fn() -> Box<dyn Plugin>;

/// Name → constructor table. Populated once at first use with every
/// built-in plugin; config compilation looks plugins up here.
pub struct PluginRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl PluginRegistry {
    fn add(&mut self, name: &'static str, factory: Factory) {
        self.factories.insert(name, factory);
    }

    /// Constructs a fresh, uninitialized plugin instance.
    pub fn create(&self, name: &str) -> Option<Box<dyn Plugin>> {
        self.factories.get(name).map(|f| f())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

pub fn registry() -> &'static PluginRegistry {
    static REGISTRY: OnceLock<PluginRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut reg = PluginRegistry {
            factories: HashMap::new(),
        };

        reg.add("pressure_above", || {
            Box::new(detectors::pressure_above::PressureAbove::new())
        });
        reg.add("pressure_rising_beyond", || {
            Box::new(detectors::pressure_rising_beyond::PressureRisingBeyond::new())
        });
        reg.add("memory_above", || {
            Box::new(detectors::memory_above::MemoryAbove::new())
        });
        reg.add("memory_reclaim", || {
            Box::new(detectors::memory_reclaim::MemoryReclaim::new())
        });
        reg.add("swap_free", || {
            Box::new(detectors::swap_free::SwapFree::new())
        });
        reg.add("exists", || Box::new(detectors::exists::Exists::new()));
        reg.add("nr_dying_descendants", || {
            Box::new(detectors::nr_dying_descendants::NrDyingDescendants::new())
        });
        reg.add("stop", || Box::new(detectors::stop::Stop::new()));

        reg.add("kill_by_memory_size_or_growth", || {
            Box::new(actions::kill_memory_growth::KillMemoryGrowth::new())
        });
        reg.add("kill_by_swap_usage", || {
            Box::new(actions::kill_swap_usage::KillSwapUsage::new())
        });
        reg.add("kill_by_pressure", || {
            Box::new(actions::kill_pressure::KillPressure::new())
        });
        reg.add("kill_by_io_cost", || {
            Box::new(actions::kill_io_cost::KillIOCost::new())
        });
        reg.add("senpai", || Box::new(actions::senpai::Senpai::new()));
        reg.add("adjust_cgroup", || {
            Box::new(actions::adjust_cgroup::AdjustCgroup::new())
        });

        reg
    })
}
