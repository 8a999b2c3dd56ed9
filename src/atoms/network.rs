use super::{Dimensioned, Mergeable};
use serde::{Deserialize, Serialize};

/// Requests for a network capability made while attached to a carrier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkRequests {
    pub carrier_id: i32,
    pub capability: i32,
    pub request_count: i64,
}

impl Dimensioned for NetworkRequests {
    fn same_dimensions(&self, other: &Self) -> bool {
        self.carrier_id == other.carrier_id && self.capability == other.capability
    }
}

impl Mergeable for NetworkRequests {
    fn merge(&mut self, newer: &Self) {
        self.request_count += newer.request_count;
    }
}

/// SIM identity that did not match any entry of the carrier-id table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierIdMismatch {
    pub mcc_mnc: String,
    pub gid1: String,
    pub spn: String,
    pub pnn: String,
}

impl Dimensioned for CarrierIdMismatch {
    fn same_dimensions(&self, other: &Self) -> bool {
        self.mcc_mnc == other.mcc_mnc
            && self.gid1 == other.gid1
            && self.spn == other.spn
            && self.pnn == other.pnn
    }
}
