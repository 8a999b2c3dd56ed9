use super::{Concludable, ImsReasonInfo, PhoneContext, rat};
use crate::atoms::{ImsRegistrationStats, ImsRegistrationTermination};
use crate::core::{SharedClock, lock_or_recover};
use crate::storage::PersistAtomsStorage;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Longest extra message kept from a reason info.
pub const MAX_EXTRA_MESSAGE_LENGTH: usize = 128;

lazy_static! {
    static ref REDACTIONS: Vec<(Regex, &'static str)> = vec![
        (
            Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
                .unwrap(),
            "<UUID_REDACTED>",
        ),
        (
            Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap(),
            "<IPV4_REDACTED>",
        ),
        (
            Regex::new(r"(?i)\b(?:[0-9a-f]{1,4}:){2,7}[0-9a-f]{1,4}\b").unwrap(),
            "<IPV6_REDACTED>",
        ),
        (Regex::new(r"\b[0-9]{14,16}\b").unwrap(), "<IMEI_REDACTED>"),
        (
            Regex::new(r"(?i)\b(?:0x)?[0-9a-f]{8,}\b").unwrap(),
            "<HEX_REDACTED>",
        ),
    ];
}

/// Strips identifiers from a free-form reason message and bounds its length.
pub fn filter_extra_message(message: Option<&str>) -> String {
    let Some(message) = message else {
        return String::new();
    };
    let mut filtered = message.to_string();
    for (pattern, replacement) in REDACTIONS.iter() {
        filtered = pattern.replace_all(&filtered, *replacement).into_owned();
    }
    filtered.chars().take(MAX_EXTRA_MESSAGE_LENGTH).collect()
}

/// Technology the IMS registration runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImsRegistrationTech {
    #[default]
    None,
    Lte,
    Iwlan,
    CrossSim,
    Nr,
}

impl ImsRegistrationTech {
    pub fn to_rat(self) -> i32 {
        match self {
            ImsRegistrationTech::Lte => rat::LTE,
            ImsRegistrationTech::Iwlan | ImsRegistrationTech::CrossSim => rat::IWLAN,
            ImsRegistrationTech::Nr => rat::NR,
            ImsRegistrationTech::None => rat::UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmTelFeature {
    Voice,
    Video,
    Ut,
    Sms,
}

impl MmTelFeature {
    fn bit(self) -> u8 {
        match self {
            MmTelFeature::Voice => 1,
            MmTelFeature::Video => 1 << 1,
            MmTelFeature::Ut => 1 << 2,
            MmTelFeature::Sms => 1 << 3,
        }
    }
}

/// Set of MMTEL features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MmTelCapabilities(u8);

impl MmTelCapabilities {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn of(features: &[MmTelFeature]) -> Self {
        Self(features.iter().fold(0, |bits, feature| bits | feature.bit()))
    }

    pub fn contains(self, feature: MmTelFeature) -> bool {
        self.0 & feature.bit() != 0
    }

    pub fn set(&mut self, feature: MmTelFeature, enabled: bool) {
        if enabled {
            self.0 |= feature.bit();
        } else {
            self.0 &= !feature.bit();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum RegistrationState {
    #[default]
    Unregistered,
    Registering,
    Registered,
}

struct ImsState {
    registration: RegistrationState,
    /// Dimensions of the current segment; durations are always zero.
    current: ImsRegistrationStats,
    available: MmTelCapabilities,
    wwan_capable: MmTelCapabilities,
    wlan_capable: MmTelCapabilities,
    segment_start_millis: i64,
}

/// Tracks IMS registration time, feature capability and availability, and deregistrations.
pub struct ImsStats {
    phone: Arc<dyn PhoneContext>,
    storage: Arc<PersistAtomsStorage>,
    clock: SharedClock,
    state: Mutex<ImsState>,
}

impl ImsStats {
    pub fn new(
        phone: Arc<dyn PhoneContext>,
        storage: Arc<PersistAtomsStorage>,
        clock: SharedClock,
    ) -> Self {
        let current = ImsRegistrationStats {
            carrier_id: phone.carrier_id(),
            sim_slot_index: phone.phone_id(),
            rat: rat::UNKNOWN,
            ..Default::default()
        };
        let segment_start_millis = clock.elapsed_millis();
        Self {
            phone,
            storage,
            clock,
            state: Mutex::new(ImsState {
                registration: RegistrationState::Unregistered,
                current,
                available: MmTelCapabilities::none(),
                wwan_capable: MmTelCapabilities::none(),
                wlan_capable: MmTelCapabilities::none(),
                segment_start_millis,
            }),
        }
    }

    /// Records whether `feature` is provisioned for the given technology.
    pub fn on_set_feature_response(&self, feature: MmTelFeature, tech: ImsRegistrationTech, enabled: bool) {
        let mut state = lock_or_recover(&self.state);
        let capable = match tech {
            ImsRegistrationTech::Lte | ImsRegistrationTech::Nr => &mut state.wwan_capable,
            ImsRegistrationTech::Iwlan | ImsRegistrationTech::CrossSim => &mut state.wlan_capable,
            ImsRegistrationTech::None => {
                debug!(?feature, "feature response without registration technology");
                return;
            }
        };
        let before = *capable;
        let mut after = before;
        after.set(feature, enabled);
        if before == after {
            return;
        }
        // Time so far is accounted under the previous capabilities.
        self.conclude_locked(&mut state);
        match tech {
            ImsRegistrationTech::Lte | ImsRegistrationTech::Nr => state.wwan_capable = after,
            _ => state.wlan_capable = after,
        }
    }

    pub fn on_ims_capabilities_changed(&self, tech: ImsRegistrationTech, available: MmTelCapabilities) {
        let mut state = lock_or_recover(&self.state);
        self.conclude_locked(&mut state);
        state.current.rat = tech.to_rat();
        state.available = available;
    }

    pub fn on_ims_registering(&self, tech: ImsRegistrationTech) {
        self.transition(tech, RegistrationState::Registering);
    }

    pub fn on_ims_registered(&self, tech: ImsRegistrationTech) {
        self.transition(tech, RegistrationState::Registered);
    }

    /// Stores the termination reason and resets to unregistered.
    ///
    /// Terminations before registration completed are recorded as setup failures.
    pub fn on_ims_unregistered(&self, reason: &ImsReasonInfo) {
        let mut state = lock_or_recover(&self.state);
        self.conclude_locked(&mut state);

        let termination = ImsRegistrationTermination {
            carrier_id: self.phone.carrier_id(),
            is_multi_sim: self.phone.is_multi_sim(),
            rat_at_end: self.rat_at_end(state.current.rat),
            setup_failed: state.registration != RegistrationState::Registered,
            reason_code: reason.code,
            extra_code: reason.extra_code,
            extra_message: filter_extra_message(reason.extra_message.as_deref()),
            count: 1,
        };
        self.storage.add_ims_registration_termination(termination);

        state.registration = RegistrationState::Unregistered;
        state.current.rat = rat::UNKNOWN;
        state.available = MmTelCapabilities::none();
    }

    /// RAT of IMS voice, `rat::UNKNOWN` unless registered with voice available.
    pub fn ims_voice_rat(&self) -> i32 {
        let state = lock_or_recover(&self.state);
        if state.registration != RegistrationState::Registered
            || !state.available.contains(MmTelFeature::Voice)
        {
            return rat::UNKNOWN;
        }
        state.current.rat
    }

    pub fn is_registered(&self) -> bool {
        lock_or_recover(&self.state).registration == RegistrationState::Registered
    }

    fn transition(&self, tech: ImsRegistrationTech, next: RegistrationState) {
        let mut state = lock_or_recover(&self.state);
        self.conclude_locked(&mut state);
        state.current.rat = tech.to_rat();
        state.registration = next;
    }

    fn rat_at_end(&self, last_rat: i32) -> i32 {
        if last_rat == rat::IWLAN {
            return last_rat;
        }
        self.phone
            .service_state()
            .map(|service_state| service_state.data_rat)
            .unwrap_or(rat::UNKNOWN)
    }

    fn conclude_locked(&self, state: &mut ImsState) {
        let now = self.clock.elapsed_millis();
        let duration = (now - state.segment_start_millis).max(0);
        state.segment_start_millis = now;

        // Carrier may have been unknown when tracking started.
        state.current.carrier_id = self.phone.carrier_id();

        let mut stats = state.current.with_zeroed_durations();
        if state.registration == RegistrationState::Registered {
            let capable = if stats.rat == rat::IWLAN {
                state.wlan_capable
            } else {
                state.wwan_capable
            };
            let available = state.available;
            let time_if = |caps: MmTelCapabilities, feature| {
                if caps.contains(feature) { duration } else { 0 }
            };

            stats.registered_millis = duration;
            stats.voice_capable_millis = time_if(capable, MmTelFeature::Voice);
            stats.voice_available_millis = time_if(available, MmTelFeature::Voice);
            stats.sms_capable_millis = time_if(capable, MmTelFeature::Sms);
            stats.sms_available_millis = time_if(available, MmTelFeature::Sms);
            stats.video_capable_millis = time_if(capable, MmTelFeature::Video);
            stats.video_available_millis = time_if(available, MmTelFeature::Video);
            stats.ut_capable_millis = time_if(capable, MmTelFeature::Ut);
            stats.ut_available_millis = time_if(available, MmTelFeature::Ut);
        }

        if stats.registered_millis > 0 {
            self.storage.add_ims_registration_stats(stats);
        }
    }
}

impl Concludable for ImsStats {
    fn conclude(&self) {
        let mut state = lock_or_recover(&self.state);
        self.conclude_locked(&mut state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_message_is_redacted() {
        let filtered = filter_extra_message(Some(
            "call 123e4567-e89b-12d3-a456-426614174000 from 192.168.1.20 imei 356938035643809",
        ));
        assert_eq!(
            filtered,
            "call <UUID_REDACTED> from <IPV4_REDACTED> imei <IMEI_REDACTED>"
        );
    }

    #[test]
    fn test_long_hex_identifiers_are_redacted() {
        assert_eq!(
            filter_extra_message(Some("id deadbeefcafebabe")),
            "id <HEX_REDACTED>"
        );
        assert_eq!(
            filter_extra_message(Some("token 0123456789abcdef")),
            "token <HEX_REDACTED>"
        );
        assert_eq!(
            filter_extra_message(Some("key 0xA1B2C3D4E5F6")),
            "key <HEX_REDACTED>"
        );
        assert_eq!(filter_extra_message(Some("code cafe")), "code cafe");
    }

    #[test]
    fn test_extra_message_is_truncated() {
        let long = "x".repeat(500);
        assert_eq!(filter_extra_message(Some(&long)).len(), MAX_EXTRA_MESSAGE_LENGTH);
        assert_eq!(filter_extra_message(None), "");
    }

    #[test]
    fn test_plain_message_is_kept() {
        assert_eq!(
            filter_extra_message(Some("SIP 503 Service Unavailable")),
            "SIP 503 Service Unavailable"
        );
    }

    #[test]
    fn test_capabilities_bits() {
        let mut caps = MmTelCapabilities::of(&[MmTelFeature::Voice, MmTelFeature::Sms]);
        assert!(caps.contains(MmTelFeature::Voice));
        assert!(!caps.contains(MmTelFeature::Video));
        caps.set(MmTelFeature::Voice, false);
        assert!(!caps.contains(MmTelFeature::Voice));
        assert!(caps.contains(MmTelFeature::Sms));
    }
}
