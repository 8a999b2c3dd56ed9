//! Per-domain session trackers.
//!
//! Trackers receive lifecycle callbacks from the radio and call stacks, keep in-flight session
//! state behind one mutex each, and hand finished atoms to [`PersistAtomsStorage`]. Callbacks
//! that reference an unknown session are logged and ignored.
//!
//! [`PersistAtomsStorage`]: crate::storage::PersistAtomsStorage

use crate::atoms::Bearer;

pub mod data_call;
pub mod ims;
pub mod rat_usage;
pub mod service_state;
pub mod voice_call;

pub use data_call::{DataCallSessionStats, DeactivateReason, data_fail_cause};
pub use ims::{ImsRegistrationTech, ImsStats, MmTelCapabilities, MmTelFeature, filter_extra_message};
pub use rat_usage::VoiceCallRatTracker;
pub use service_state::ServiceStateStats;
pub use voice_call::{CallConnection, CallState, SrvccState, VoiceCallSessionStats};

/// Network type codes. The taxonomy is owned by the radio stack; only the values the trackers
/// branch on are named here.
pub mod rat {
    pub const UNKNOWN: i32 = 0;
    pub const GPRS: i32 = 1;
    pub const UMTS: i32 = 3;
    pub const LTE: i32 = 13;
    pub const IWLAN: i32 = 18;
    pub const NR: i32 = 20;
}

/// Snapshot of the radio registration state, as reported by the service state tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStateSnapshot {
    /// RAT of the circuit-switched registration, `rat::UNKNOWN` when out of service.
    pub voice_rat: i32,
    /// RAT of the packet-switched registration, `rat::UNKNOWN` when out of service.
    pub data_rat: i32,
    pub voice_roaming_type: i32,
    pub data_roaming_type: i32,
    pub is_network_roaming: bool,
    pub is_endc: bool,
    pub is_emergency_only: bool,
    pub band: i32,
}

/// Read access to the phone the trackers observe.
///
/// Implementations answer from cached radio state and must not block.
pub trait PhoneContext: Send + Sync {
    fn phone_id(&self) -> i32;

    fn carrier_id(&self) -> i32;

    fn is_multi_sim(&self) -> bool;

    fn is_esim(&self) -> bool;

    /// `None` while the radio is off or the service state is not known yet.
    fn service_state(&self) -> Option<ServiceStateSnapshot>;

    /// Signal level (0 to 4) of the given RAT.
    fn signal_strength_level(&self, rat: i32) -> i32;

    fn is_opportunistic(&self) -> bool {
        false
    }

    /// RAT of the current IMS voice registration, `rat::UNKNOWN` if voice over IMS is not
    /// available.
    fn ims_voice_rat(&self) -> i32 {
        rat::UNKNOWN
    }
}

/// RAT carrying voice for a call on `bearer`.
///
/// Calls that may run over IMS use IWLAN while IMS voice is registered over WLAN, and the
/// packet-switched RAT while IMS voice is registered over cellular with PS service up.
/// Everything else uses the circuit-switched RAT.
pub fn voice_rat(
    phone: &dyn PhoneContext,
    service_state: Option<&ServiceStateSnapshot>,
    bearer: Bearer,
) -> i32 {
    let Some(service_state) = service_state else {
        return rat::UNKNOWN;
    };
    if bearer != Bearer::Cs {
        let ims_rat = phone.ims_voice_rat();
        if ims_rat == rat::IWLAN {
            return rat::IWLAN;
        }
        if ims_rat != rat::UNKNOWN && service_state.data_rat != rat::UNKNOWN {
            return service_state.data_rat;
        }
    }
    service_state.voice_rat
}

/// Reason attached to an IMS call or registration ending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImsReasonInfo {
    pub code: i32,
    pub extra_code: i32,
    pub extra_message: Option<String>,
}

impl ImsReasonInfo {
    pub fn new(code: i32, extra_code: i32, extra_message: Option<&str>) -> Self {
        Self {
            code,
            extra_code,
            extra_message: extra_message.map(str::to_string),
        }
    }
}

/// A tracker with open duration segments that must be closed before a pull.
pub trait Concludable: Send + Sync {
    /// Stores the time accumulated so far and starts a new segment, leaving sessions open.
    fn conclude(&self);
}
