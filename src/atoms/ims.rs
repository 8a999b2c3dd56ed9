use super::{Dimensioned, Mergeable};
use serde::{Deserialize, Serialize};

/// Time registered to IMS on one RAT, with the time each feature was capable and available.
///
/// Capable means the network and device could offer the feature; available means it was
/// actually enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImsRegistrationStats {
    pub carrier_id: i32,
    pub sim_slot_index: i32,
    pub rat: i32,
    pub registered_millis: i64,
    pub voice_capable_millis: i64,
    pub voice_available_millis: i64,
    pub sms_capable_millis: i64,
    pub sms_available_millis: i64,
    pub video_capable_millis: i64,
    pub video_available_millis: i64,
    pub ut_capable_millis: i64,
    pub ut_available_millis: i64,
}

impl ImsRegistrationStats {
    /// Returns a copy with every duration cleared, keeping the dimensions.
    pub fn with_zeroed_durations(&self) -> Self {
        Self {
            carrier_id: self.carrier_id,
            sim_slot_index: self.sim_slot_index,
            rat: self.rat,
            ..Default::default()
        }
    }
}

impl Dimensioned for ImsRegistrationStats {
    fn same_dimensions(&self, other: &Self) -> bool {
        self.carrier_id == other.carrier_id
            && self.sim_slot_index == other.sim_slot_index
            && self.rat == other.rat
    }
}

impl Mergeable for ImsRegistrationStats {
    fn merge(&mut self, newer: &Self) {
        self.registered_millis += newer.registered_millis;
        self.voice_capable_millis += newer.voice_capable_millis;
        self.voice_available_millis += newer.voice_available_millis;
        self.sms_capable_millis += newer.sms_capable_millis;
        self.sms_available_millis += newer.sms_available_millis;
        self.video_capable_millis += newer.video_capable_millis;
        self.video_available_millis += newer.video_available_millis;
        self.ut_capable_millis += newer.ut_capable_millis;
        self.ut_available_millis += newer.ut_available_millis;
    }
}

/// Count of IMS deregistrations (or failed registrations) with the same cause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImsRegistrationTermination {
    pub carrier_id: i32,
    pub is_multi_sim: bool,
    pub rat_at_end: i32,
    pub setup_failed: bool,
    pub reason_code: i32,
    pub extra_code: i32,
    pub extra_message: String,
    pub count: i64,
}

impl Dimensioned for ImsRegistrationTermination {
    fn same_dimensions(&self, other: &Self) -> bool {
        self.carrier_id == other.carrier_id
            && self.is_multi_sim == other.is_multi_sim
            && self.rat_at_end == other.rat_at_end
            && self.setup_failed == other.setup_failed
            && self.reason_code == other.reason_code
            && self.extra_code == other.extra_code
            && self.extra_message == other.extra_message
    }
}

impl Mergeable for ImsRegistrationTermination {
    fn merge(&mut self, newer: &Self) {
        self.count += newer.count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_merge_sums_every_duration() {
        let mut stored = ImsRegistrationStats {
            carrier_id: 1,
            rat: 13,
            registered_millis: 100,
            voice_capable_millis: 50,
            ut_available_millis: 7,
            ..Default::default()
        };
        let newer = ImsRegistrationStats {
            registered_millis: 10,
            voice_capable_millis: 5,
            ut_available_millis: 3,
            ..stored.with_zeroed_durations()
        };
        stored.merge(&newer);
        assert_eq!(stored.registered_millis, 110);
        assert_eq!(stored.voice_capable_millis, 55);
        assert_eq!(stored.ut_available_millis, 10);
    }

    #[test]
    fn test_termination_dimensions_include_message() {
        let a = ImsRegistrationTermination {
            reason_code: 1000,
            extra_message: "timeout".to_string(),
            count: 1,
            ..Default::default()
        };
        let b = ImsRegistrationTermination {
            extra_message: "rejected".to_string(),
            ..a.clone()
        };
        assert!(!a.same_dimensions(&b));
        assert!(a.same_dimensions(&a.clone()));
    }
}
