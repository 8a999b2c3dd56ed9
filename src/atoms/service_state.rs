use super::{Dimensioned, Mergeable};
use serde::{Deserialize, Serialize};

/// Time spent in one combination of voice/data RAT, roaming and SIM state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellularServiceState {
    pub voice_rat: i32,
    pub data_rat: i32,
    pub voice_roaming_type: i32,
    pub data_roaming_type: i32,
    pub is_endc: bool,
    pub sim_slot_index: i32,
    pub is_multi_sim: bool,
    pub carrier_id: i32,
    pub is_emergency_only: bool,
    pub total_time_millis: i64,
}

impl Dimensioned for CellularServiceState {
    fn same_dimensions(&self, other: &Self) -> bool {
        self.voice_rat == other.voice_rat
            && self.data_rat == other.data_rat
            && self.voice_roaming_type == other.voice_roaming_type
            && self.data_roaming_type == other.data_roaming_type
            && self.is_endc == other.is_endc
            && self.sim_slot_index == other.sim_slot_index
            && self.is_multi_sim == other.is_multi_sim
            && self.carrier_id == other.carrier_id
            && self.is_emergency_only == other.is_emergency_only
    }
}

impl Mergeable for CellularServiceState {
    fn merge(&mut self, newer: &Self) {
        self.total_time_millis += newer.total_time_millis;
    }
}

/// Number of data RAT transitions from `rat_from` to `rat_to`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellularDataServiceSwitch {
    pub rat_from: i32,
    pub rat_to: i32,
    pub sim_slot_index: i32,
    pub is_multi_sim: bool,
    pub carrier_id: i32,
    pub switch_count: i64,
}

impl Dimensioned for CellularDataServiceSwitch {
    fn same_dimensions(&self, other: &Self) -> bool {
        self.rat_from == other.rat_from
            && self.rat_to == other.rat_to
            && self.sim_slot_index == other.sim_slot_index
            && self.is_multi_sim == other.is_multi_sim
            && self.carrier_id == other.carrier_id
    }
}

impl Mergeable for CellularDataServiceSwitch {
    fn merge(&mut self, newer: &Self) {
        self.switch_count += newer.switch_count;
    }
}
