use super::{Dimensioned, Mergeable};
use serde::{Deserialize, Serialize};

/// Maximum number of handover failure causes kept per session.
pub const SIZE_LIMIT_HANDOVER_FAILURES: usize = 15;

/// One data call, possibly split across several pulls while it is ongoing.
///
/// `dimension` is a random tag drawn when the session starts. Partial snapshots of an ongoing
/// session share it, so storage can fold them into a single record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataCallSession {
    pub dimension: i32,
    pub is_multi_sim: bool,
    pub is_esim: bool,
    pub profile: i32,
    pub apn_type_bitmask: i32,
    pub carrier_id: i32,
    pub is_roaming: bool,
    pub rat_at_end: i32,
    pub oos_at_end: bool,
    pub rat_switch_count: i64,
    pub is_opportunistic: bool,
    pub ip_type: i32,
    pub setup_failed: bool,
    pub failure_cause: i32,
    pub suggested_retry_millis: i32,
    pub deactivate_reason: i32,
    pub duration_minutes: i64,
    pub ongoing: bool,
    pub band_at_end: i32,
    pub handover_failure_causes: Vec<i32>,
}

impl DataCallSession {
    /// Appends a handover failure cause, ignoring anything past the limit.
    pub fn record_handover_failure(&mut self, cause: i32) {
        if self.handover_failure_causes.len() < SIZE_LIMIT_HANDOVER_FAILURES {
            self.handover_failure_causes.push(cause);
        }
    }
}

impl Dimensioned for DataCallSession {
    fn same_dimensions(&self, other: &Self) -> bool {
        self.dimension == other.dimension
    }
}

impl Mergeable for DataCallSession {
    /// The newer snapshot wins for state; counters and durations accumulate.
    ///
    /// Handover failure causes of the newer snapshot come first, followed by the stored ones,
    /// up to the limit.
    fn merge(&mut self, newer: &Self) {
        let rat_switch_count = self.rat_switch_count + newer.rat_switch_count;
        let duration_minutes = self.duration_minutes + newer.duration_minutes;
        let stored_causes = std::mem::take(&mut self.handover_failure_causes);

        *self = newer.clone();
        self.rat_switch_count = rat_switch_count;
        self.duration_minutes = duration_minutes;
        self.handover_failure_causes.extend(stored_causes);
        self.handover_failure_causes
            .truncate(SIZE_LIMIT_HANDOVER_FAILURES);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_newer_state_and_sums_counters() {
        let mut stored = DataCallSession {
            dimension: 42,
            rat_at_end: 13,
            rat_switch_count: 2,
            duration_minutes: 30,
            ongoing: true,
            handover_failure_causes: vec![1, 2],
            ..Default::default()
        };
        let newer = DataCallSession {
            dimension: 42,
            rat_at_end: 20,
            rat_switch_count: 1,
            duration_minutes: 5,
            ongoing: false,
            deactivate_reason: 3,
            handover_failure_causes: vec![2, 3],
            ..Default::default()
        };

        stored.merge(&newer);
        assert_eq!(stored.rat_at_end, 20);
        assert_eq!(stored.rat_switch_count, 3);
        assert_eq!(stored.duration_minutes, 35);
        assert!(!stored.ongoing);
        assert_eq!(stored.deactivate_reason, 3);
        assert_eq!(stored.handover_failure_causes, vec![2, 3, 1, 2]);
    }

    #[test]
    fn test_handover_failures_are_capped() {
        let mut session = DataCallSession::default();
        for cause in 0..40 {
            session.record_handover_failure(cause);
        }
        assert_eq!(
            session.handover_failure_causes.len(),
            SIZE_LIMIT_HANDOVER_FAILURES
        );
    }
}
