//! Scheduler state: per-host device occupancy and topology.

mod error;
mod host_state;
mod scheduler_cache;

pub use error::CacheError;
pub use host_state::HostState;
pub use scheduler_cache::SchedulerCache;
