use serde::{Deserialize, Serialize};

/// Reported atom categories with their stable pull identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AtomCategory {
    VoiceCallSession,
    VoiceCallRatUsage,
    IncomingSms,
    OutgoingSms,
    CarrierIdTableVersion,
    DataCallSession,
    CellularServiceState,
    CellularDataServiceSwitch,
    ImsRegistrationStats,
    ImsRegistrationTermination,
    NetworkRequests,
}

impl AtomCategory {
    pub const ALL: [AtomCategory; 11] = [
        AtomCategory::VoiceCallSession,
        AtomCategory::VoiceCallRatUsage,
        AtomCategory::IncomingSms,
        AtomCategory::OutgoingSms,
        AtomCategory::CarrierIdTableVersion,
        AtomCategory::DataCallSession,
        AtomCategory::CellularServiceState,
        AtomCategory::CellularDataServiceSwitch,
        AtomCategory::ImsRegistrationStats,
        AtomCategory::ImsRegistrationTermination,
        AtomCategory::NetworkRequests,
    ];

    pub fn id(self) -> i32 {
        match self {
            AtomCategory::VoiceCallSession => 10076,
            AtomCategory::VoiceCallRatUsage => 10077,
            AtomCategory::IncomingSms => 10086,
            AtomCategory::OutgoingSms => 10087,
            AtomCategory::CarrierIdTableVersion => 10088,
            AtomCategory::DataCallSession => 10089,
            AtomCategory::CellularServiceState => 10090,
            AtomCategory::CellularDataServiceSwitch => 10091,
            AtomCategory::ImsRegistrationStats => 10093,
            AtomCategory::ImsRegistrationTermination => 10094,
            AtomCategory::NetworkRequests => 10095,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.id() == id)
    }

    /// Whether pulls of this category are rate limited by a stored pull timestamp.
    ///
    /// The carrier-id table version is a single value and can be read at any time.
    pub fn has_pull_cooldown(self) -> bool {
        !matches!(self, AtomCategory::CarrierIdTableVersion)
    }

    pub fn name(self) -> &'static str {
        match self {
            AtomCategory::VoiceCallSession => "voice_call_session",
            AtomCategory::VoiceCallRatUsage => "voice_call_rat_usage",
            AtomCategory::IncomingSms => "incoming_sms",
            AtomCategory::OutgoingSms => "outgoing_sms",
            AtomCategory::CarrierIdTableVersion => "carrier_id_table_version",
            AtomCategory::DataCallSession => "data_call_session",
            AtomCategory::CellularServiceState => "cellular_service_state",
            AtomCategory::CellularDataServiceSwitch => "cellular_data_service_switch",
            AtomCategory::ImsRegistrationStats => "ims_registration_stats",
            AtomCategory::ImsRegistrationTermination => "ims_registration_termination",
            AtomCategory::NetworkRequests => "network_requests",
        }
    }
}

impl std::fmt::Display for AtomCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
