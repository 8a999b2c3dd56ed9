//! Time sources for the storage and the trackers.
//!
//! Wall time (epoch millis, survives reboots, may jump when the user or NTP adjusts it) stamps
//! pulls and LRU ranking. Elapsed time (monotonic) measures session durations.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn wall_millis(&self) -> i64;

    /// Monotonic milliseconds since an arbitrary origin.
    fn elapsed_millis(&self) -> i64;
}

pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the host's real-time and monotonic clocks.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn elapsed_millis(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// Manually driven clock for deterministic tests and replays.
///
/// `advance` moves wall and elapsed time together; `set_wall_millis` only moves wall time,
/// which is how a user or NTP adjustment looks from the inside.
#[derive(Debug, Default)]
pub struct ManualClock {
    wall: AtomicI64,
    elapsed: AtomicI64,
}

impl ManualClock {
    pub fn new(wall_millis: i64) -> Self {
        Self {
            wall: AtomicI64::new(wall_millis),
            elapsed: AtomicI64::new(0),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.wall.fetch_add(millis, Ordering::SeqCst);
        self.elapsed.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set_wall_millis(&self, millis: i64) {
        self.wall.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn wall_millis(&self) -> i64 {
        self.wall.load(Ordering::SeqCst)
    }

    fn elapsed_millis(&self) -> i64 {
        self.elapsed.load(Ordering::SeqCst)
    }
}
