//! Emitted form of pulled atoms.
//!
//! Events carry named, typed fields in a fixed order per category. Durations are rounded to the
//! configured bucket and reported in seconds (minutes for data calls), so raw millisecond
//! timings never leave the crate.

use crate::atoms::{
    AtomCategory, CellularDataServiceSwitch, CellularServiceState, DataCallSession, ImsRegistrationStats,
    ImsRegistrationTermination, IncomingSms, NetworkRequests, OutgoingSms, VoiceCallRatUsage,
    VoiceCallSession,
};
use std::fmt;

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomValue {
    Int(i32),
    Long(i64),
    Bool(bool),
    Str(String),
    IntList(Vec<i32>),
}

impl AtomValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AtomValue::Int(v) => Some(i64::from(*v)),
            AtomValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AtomValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AtomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomValue::Int(v) => write!(f, "{}", v),
            AtomValue::Long(v) => write!(f, "{}", v),
            AtomValue::Bool(v) => write!(f, "{}", v),
            AtomValue::Str(v) => write!(f, "'{}'", v),
            AtomValue::IntList(values) => write!(f, "{:?}", values),
        }
    }
}

impl From<i32> for AtomValue {
    fn from(value: i32) -> Self {
        AtomValue::Int(value)
    }
}

impl From<i64> for AtomValue {
    fn from(value: i64) -> Self {
        AtomValue::Long(value)
    }
}

impl From<bool> for AtomValue {
    fn from(value: bool) -> Self {
        AtomValue::Bool(value)
    }
}

impl From<String> for AtomValue {
    fn from(value: String) -> Self {
        AtomValue::Str(value)
    }
}

impl From<Vec<i32>> for AtomValue {
    fn from(values: Vec<i32>) -> Self {
        AtomValue::IntList(values)
    }
}

/// One pulled atom, ready to hand to the metrics scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsEvent {
    pub category: AtomCategory,
    pub fields: Vec<(&'static str, AtomValue)>,
}

impl StatsEvent {
    pub fn new(category: AtomCategory) -> Self {
        Self {
            category,
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, name: &'static str, value: impl Into<AtomValue>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    pub fn field(&self, name: &str) -> Option<&AtomValue> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }
}

/// Rounds `value` to the nearest multiple of `bucket`; a zero bucket leaves it unchanged.
pub fn round(value: i64, bucket: i64) -> i64 {
    if bucket == 0 {
        value
    } else {
        ((value + bucket / 2) / bucket) * bucket
    }
}

/// Converts stored atoms into events, applying duration bucketing.
#[derive(Debug, Clone, Copy)]
pub struct EventEncoder {
    bucket_millis: i64,
}

impl EventEncoder {
    pub fn new(bucket_millis: i64) -> Self {
        Self { bucket_millis }
    }

    fn seconds(&self, millis: i64) -> i64 {
        round(millis, self.bucket_millis) / MILLIS_PER_SECOND
    }

    fn seconds_i32(&self, millis: i64) -> i32 {
        i32::try_from(self.seconds(millis)).unwrap_or(i32::MAX)
    }

    pub fn voice_call_session(&self, session: &VoiceCallSession) -> StatsEvent {
        StatsEvent::new(AtomCategory::VoiceCallSession)
            .with("bearer_at_start", session.bearer_at_start as i32)
            .with("bearer_at_end", session.bearer_at_end as i32)
            .with("direction", session.direction as i32)
            .with("setup_duration", session.setup_duration.as_i32())
            .with("setup_failed", session.setup_failed)
            .with("disconnect_reason_code", session.disconnect_reason_code)
            .with("disconnect_extra_code", session.disconnect_extra_code)
            .with("disconnect_extra_message", session.disconnect_extra_message.clone())
            .with("rat_at_start", session.rat_at_start)
            .with("rat_at_end", session.rat_at_end)
            .with("rat_switch_count", session.rat_switch_count)
            .with("codec_bitmask", session.codec_bitmask)
            .with("concurrent_call_count_at_start", session.concurrent_call_count_at_start)
            .with("concurrent_call_count_at_end", session.concurrent_call_count_at_end)
            .with("sim_slot_index", session.sim_slot_index)
            .with("is_multi_sim", session.is_multi_sim)
            .with("is_esim", session.is_esim)
            .with("carrier_id", session.carrier_id)
            .with("srvcc_completed", session.srvcc_completed)
            .with("srvcc_failure_count", session.srvcc_failure_count)
            .with("srvcc_cancellation_count", session.srvcc_cancellation_count)
            .with("rtt_enabled", session.rtt_enabled)
            .with("is_emergency", session.is_emergency)
            .with("is_roaming", session.is_roaming)
            .with("signal_strength_at_end", session.signal_strength_at_end)
            .with("band_at_end", session.band_at_end)
            .with("setup_duration_millis", session.setup_duration_millis)
            .with("main_codec_quality", session.main_codec_quality.as_i32())
            .with("video_enabled", session.video_enabled)
            .with("rat_at_connected", session.rat_at_connected)
            .with("is_multiparty", session.is_multiparty)
            .with("call_duration", session.call_duration.as_i32())
    }

    pub fn voice_call_rat_usage(&self, usage: &VoiceCallRatUsage) -> StatsEvent {
        StatsEvent::new(AtomCategory::VoiceCallRatUsage)
            .with("carrier_id", usage.carrier_id)
            .with("rat", usage.rat)
            .with("total_duration_seconds", self.seconds(usage.total_duration_millis))
            .with("call_count", usage.call_count)
    }

    pub fn incoming_sms(&self, sms: &IncomingSms) -> StatsEvent {
        StatsEvent::new(AtomCategory::IncomingSms)
            .with("sms_format", sms.sms_format)
            .with("sms_tech", sms.sms_tech)
            .with("rat", sms.rat)
            .with("sms_type", sms.sms_type)
            .with("total_parts", sms.total_parts)
            .with("received_parts", sms.received_parts)
            .with("blocked", sms.blocked)
            .with("error", sms.error)
            .with("is_roaming", sms.is_roaming)
            .with("sim_slot_index", sms.sim_slot_index)
            .with("is_multi_sim", sms.is_multi_sim)
            .with("is_esim", sms.is_esim)
            .with("carrier_id", sms.carrier_id)
            .with("message_id", sms.message_id)
    }

    pub fn outgoing_sms(&self, sms: &OutgoingSms) -> StatsEvent {
        StatsEvent::new(AtomCategory::OutgoingSms)
            .with("sms_format", sms.sms_format)
            .with("sms_tech", sms.sms_tech)
            .with("rat", sms.rat)
            .with("send_result", sms.send_result)
            .with("error_code", sms.error_code)
            .with("is_roaming", sms.is_roaming)
            .with("is_from_default_app", sms.is_from_default_app)
            .with("sim_slot_index", sms.sim_slot_index)
            .with("is_multi_sim", sms.is_multi_sim)
            .with("is_esim", sms.is_esim)
            .with("carrier_id", sms.carrier_id)
            .with("message_id", sms.message_id)
            .with("retry_id", sms.retry_id)
            .with("interval_millis", sms.interval_millis)
    }

    pub fn carrier_id_table_version(&self, version: i32) -> StatsEvent {
        StatsEvent::new(AtomCategory::CarrierIdTableVersion).with("table_version", version)
    }

    pub fn data_call_session(&self, session: &DataCallSession) -> StatsEvent {
        let bucket_minutes = self.bucket_millis / MILLIS_PER_MINUTE;
        StatsEvent::new(AtomCategory::DataCallSession)
            .with("dimension", session.dimension)
            .with("is_multi_sim", session.is_multi_sim)
            .with("is_esim", session.is_esim)
            // Profile is deprecated and always reported as 0.
            .with("profile", 0)
            .with("apn_type_bitmask", session.apn_type_bitmask)
            .with("carrier_id", session.carrier_id)
            .with("is_roaming", session.is_roaming)
            .with("rat_at_end", session.rat_at_end)
            .with("oos_at_end", session.oos_at_end)
            .with("rat_switch_count", session.rat_switch_count)
            .with("is_opportunistic", session.is_opportunistic)
            .with("ip_type", session.ip_type)
            .with("setup_failed", session.setup_failed)
            .with("failure_cause", session.failure_cause)
            .with("suggested_retry_millis", session.suggested_retry_millis)
            .with("deactivate_reason", session.deactivate_reason)
            .with("duration_minutes", round(session.duration_minutes, bucket_minutes))
            .with("ongoing", session.ongoing)
            .with("band_at_end", session.band_at_end)
            .with("handover_failure_causes", session.handover_failure_causes.clone())
    }

    pub fn cellular_service_state(&self, state: &CellularServiceState) -> StatsEvent {
        StatsEvent::new(AtomCategory::CellularServiceState)
            .with("voice_rat", state.voice_rat)
            .with("data_rat", state.data_rat)
            .with("voice_roaming_type", state.voice_roaming_type)
            .with("data_roaming_type", state.data_roaming_type)
            .with("is_endc", state.is_endc)
            .with("sim_slot_index", state.sim_slot_index)
            .with("is_multi_sim", state.is_multi_sim)
            .with("carrier_id", state.carrier_id)
            .with("total_time_seconds", self.seconds_i32(state.total_time_millis))
            .with("is_emergency_only", state.is_emergency_only)
    }

    pub fn cellular_data_service_switch(&self, switch: &CellularDataServiceSwitch) -> StatsEvent {
        StatsEvent::new(AtomCategory::CellularDataServiceSwitch)
            .with("rat_from", switch.rat_from)
            .with("rat_to", switch.rat_to)
            .with("sim_slot_index", switch.sim_slot_index)
            .with("is_multi_sim", switch.is_multi_sim)
            .with("carrier_id", switch.carrier_id)
            .with("switch_count", switch.switch_count)
    }

    pub fn ims_registration_stats(&self, stats: &ImsRegistrationStats) -> StatsEvent {
        StatsEvent::new(AtomCategory::ImsRegistrationStats)
            .with("carrier_id", stats.carrier_id)
            .with("sim_slot_index", stats.sim_slot_index)
            .with("rat", stats.rat)
            .with("registered_seconds", self.seconds_i32(stats.registered_millis))
            .with("voice_capable_seconds", self.seconds_i32(stats.voice_capable_millis))
            .with("voice_available_seconds", self.seconds_i32(stats.voice_available_millis))
            .with("sms_capable_seconds", self.seconds_i32(stats.sms_capable_millis))
            .with("sms_available_seconds", self.seconds_i32(stats.sms_available_millis))
            .with("video_capable_seconds", self.seconds_i32(stats.video_capable_millis))
            .with("video_available_seconds", self.seconds_i32(stats.video_available_millis))
            .with("ut_capable_seconds", self.seconds_i32(stats.ut_capable_millis))
            .with("ut_available_seconds", self.seconds_i32(stats.ut_available_millis))
    }

    pub fn ims_registration_termination(&self, termination: &ImsRegistrationTermination) -> StatsEvent {
        StatsEvent::new(AtomCategory::ImsRegistrationTermination)
            .with("carrier_id", termination.carrier_id)
            .with("is_multi_sim", termination.is_multi_sim)
            .with("rat_at_end", termination.rat_at_end)
            .with("setup_failed", termination.setup_failed)
            .with("reason_code", termination.reason_code)
            .with("extra_code", termination.extra_code)
            .with("extra_message", termination.extra_message.clone())
            .with("count", termination.count)
    }

    pub fn network_requests(&self, requests: &NetworkRequests) -> StatsEvent {
        StatsEvent::new(AtomCategory::NetworkRequests)
            .with("carrier_id", requests.carrier_id)
            .with("capability", requests.capability)
            .with("request_count", requests.request_count)
    }
}
