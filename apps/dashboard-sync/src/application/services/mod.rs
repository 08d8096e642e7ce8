//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `Deduplicator`: At most one fetch in flight per key
//! - `RevalidationScheduler`: Per-key interval timers
//! - `SyncEngine`: Subscriptions, cached resources, and mutations
//! - `DailyResource`: A cached resource keyed by today's date
//! - `SchedulerControl`: Guarded scheduler actions with status refresh

mod daily;
mod dedup;
mod engine;
mod revalidation;
mod scheduler_control;

pub use daily::DailyResource;
pub use dedup::{Deduplicator, SharedFetch};
pub use engine::{
    CachedResource, DEFAULT_LINGER, EngineConfig, ResourceState, ResourceView, Subscription,
    SyncEngine,
};
pub use revalidation::RevalidationScheduler;
pub use scheduler_control::{ACTION_FAILED_TEXT, ControlError, SchedulerControl};
