pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{CategoryCapacities, CollectorConfig, StorageConfig, ATOMS_FILE_NAME};
pub use error::{MetricsError, Result};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Converts a duration to whole milliseconds, saturating at `i64::MAX`.
pub(crate) fn duration_millis(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
