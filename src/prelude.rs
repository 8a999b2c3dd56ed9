//! Entry points grouped by role.
//!
//! `wiring` is what a process needs to stand up storage, trackers and the collector.
//! `records` exposes the atom types and the record store for code that inspects stored data.

pub mod wiring {
    pub use crate::{
        CollectorConfig, Concludable, DataCallSessionStats, ImsStats, MetricsCollector,
        PersistAtomsStorage, PhoneContext, ServiceStateSnapshot, ServiceStateStats,
        StorageConfig, SystemClock, VoiceCallSessionStats,
    };
}

pub mod records {
    pub use crate::atoms::*;
    pub use crate::storage::{EvictionPolicy, RecordStore, StoredRecord};
}
