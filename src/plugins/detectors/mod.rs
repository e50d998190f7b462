pub mod exists;
pub mod memory_above;
pub mod memory_reclaim;
pub mod nr_dying_descendants;
pub mod pressure_above;
pub mod pressure_rising_beyond;
pub mod stop;
pub mod swap_free;
