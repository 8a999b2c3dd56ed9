// ============================================================================
// Persisted telephony atoms
// ============================================================================
//
// Session trackers turn radio and call-stack callbacks into atoms, the storage
// keeps bounded per-category collections and saves them to disk, and the
// collector drains them on pull.

pub mod atoms;
pub mod collector;
pub mod core;
pub mod prelude;
pub mod stats;
pub mod storage;

pub use atoms::{AtomCategory, Dimensioned, Mergeable};
pub use collector::{AtomValue, MetricsCollector, PullOutcome, StatsEvent};
pub use core::{
    CategoryCapacities, Clock, CollectorConfig, ManualClock, MetricsError, Result, SharedClock,
    StorageConfig, SystemClock,
};
pub use stats::{
    Concludable, DataCallSessionStats, ImsStats, PhoneContext, ServiceStateSnapshot,
    ServiceStateStats, VoiceCallSessionStats,
};
pub use storage::PersistAtomsStorage;
