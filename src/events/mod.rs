//! Events module
//!
//! Scheduled maintenance: the periodic timers behind bucket refresh,
//! publish, republish and expire.

pub mod scheduler;

pub use scheduler::{callback, EventCallback, EventKind, EventScheduler};
