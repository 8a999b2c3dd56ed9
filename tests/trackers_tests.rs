//! End-to-end tracker scenarios, from radio callbacks to stored atoms.

mod common;

use common::{CARRIER_ID, FakePhone, config, in_service, manual_clock, open_storage};
use persist_atoms::atoms::{AudioCodec, Bearer, CallDirection, CodecQuality, SetupDuration};
use persist_atoms::stats::{
    CallConnection, CallState, Concludable, DataCallSessionStats, ImsReasonInfo,
    ImsRegistrationTech, ImsStats, MmTelCapabilities, MmTelFeature, ServiceStateSnapshot,
    ServiceStateStats, SrvccState, VoiceCallSessionStats, data_fail_cause, rat,
};
use persist_atoms::{AtomCategory, ManualClock, PersistAtomsStorage};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const HOUR: Duration = Duration::from_secs(60 * 60);
const MINUTE_MILLIS: i64 = 60_000;
const NORMAL_CLEARING: i32 = 16;

struct Harness {
    _dir: TempDir,
    clock: Arc<ManualClock>,
    phone: Arc<FakePhone>,
    storage: Arc<PersistAtomsStorage>,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let storage = open_storage(config(dir.path()), clock.clone());
        Self {
            _dir: dir,
            clock,
            phone: FakePhone::on_lte(),
            storage,
        }
    }

    fn voice(&self) -> VoiceCallSessionStats {
        VoiceCallSessionStats::new(self.phone.clone(), self.storage.clone(), self.clock.clone())
    }

    fn data_call(&self) -> DataCallSessionStats {
        DataCallSessionStats::with_rng(
            self.phone.clone(),
            self.storage.clone(),
            self.clock.clone(),
            StdRng::seed_from_u64(3),
        )
    }

    /// Moves past the pull cooldown so the next `get_*` drains.
    fn skip_cooldown(&self) {
        self.clock.advance(HOUR.as_millis() as i64 + 1);
    }
}

fn cs_call(id: i64, is_incoming: bool, state: CallState) -> CallConnection {
    CallConnection {
        id,
        bearer: Bearer::Cs,
        is_incoming,
        state,
        call_state: state,
        ..Default::default()
    }
}

fn ims_call(id: i64, state: CallState) -> CallConnection {
    CallConnection {
        id,
        bearer: Bearer::Ims,
        state,
        call_state: state,
        ..Default::default()
    }
}

fn disconnected(mut conn: CallConnection, duration_millis: i64) -> CallConnection {
    conn.state = CallState::Disconnected;
    conn.call_state = CallState::Disconnected;
    conn.disconnect_cause = NORMAL_CLEARING;
    conn.duration_millis = duration_millis;
    conn
}

#[test]
fn test_data_call_setup_failure_is_stored_immediately() {
    let h = Harness::new();
    let tracker = h.data_call();

    tracker.on_setup_data_call(17);
    assert!(tracker.has_ongoing_session());
    tracker.on_setup_data_call_response(rat::LTE, 17, 0, 33, Some(5_000));

    assert!(!tracker.has_ongoing_session());
    assert_eq!(h.storage.record_count(AtomCategory::DataCallSession), 1);

    h.skip_cooldown();
    let sessions = h.storage.get_data_call_sessions(HOUR).unwrap();
    let session = &sessions[0];
    assert!(session.setup_failed);
    assert!(!session.ongoing);
    assert_eq!(session.failure_cause, 33);
    assert_eq!(session.suggested_retry_millis, 5_000);
    assert_eq!(session.apn_type_bitmask, 17);
    assert_eq!(session.rat_at_end, rat::LTE);
    assert_eq!(session.carrier_id, CARRIER_ID);
}

#[test]
fn test_data_call_partial_snapshot_folds_into_final_record() {
    let h = Harness::new();
    let tracker = h.data_call();

    tracker.on_setup_data_call(1);
    tracker.on_setup_data_call_response(rat::LTE, 1, 0, data_fail_cause::NONE, None);
    assert!(tracker.has_ongoing_session());

    h.clock.advance(10 * MINUTE_MILLIS);
    tracker.on_drs_or_rat_changed(rat::NR);
    tracker.on_handover_failure(4);
    tracker.conclude();
    assert_eq!(h.storage.record_count(AtomCategory::DataCallSession), 1);

    h.clock.advance(5 * MINUTE_MILLIS);
    tracker.on_drs_or_rat_changed(rat::NR);
    tracker.on_drs_or_rat_changed(rat::LTE);
    tracker.on_handover_failure(9);
    tracker.set_deactivate_data_call_reason(1);
    tracker.on_data_call_disconnected(data_fail_cause::NONE);
    assert!(!tracker.has_ongoing_session());

    h.skip_cooldown();
    let sessions = h.storage.get_data_call_sessions(HOUR).unwrap();
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert!(!session.ongoing);
    assert_eq!(session.duration_minutes, 15);
    assert_eq!(session.rat_switch_count, 2);
    assert_eq!(session.rat_at_end, rat::LTE);
    assert_eq!(session.deactivate_reason, 1);
    assert_eq!(session.handover_failure_causes, vec![9, 4]);
}

#[test]
fn test_data_call_callbacks_without_session_are_ignored() {
    let h = Harness::new();
    let tracker = h.data_call();

    tracker.on_setup_data_call_response(rat::LTE, 1, 0, 33, None);
    tracker.on_data_call_disconnected(data_fail_cause::NONE);
    tracker.on_drs_or_rat_changed(rat::NR);
    tracker.conclude();

    assert_eq!(h.storage.record_count(AtomCategory::DataCallSession), 0);
}

#[test]
fn test_cs_mo_call_lifecycle() {
    let h = Harness::new();
    let voice = h.voice();
    let conn = cs_call(1, false, CallState::Dialing);

    voice.on_ril_dial(&conn);
    h.clock.advance(500);
    voice.on_ril_call_list_changed(&[cs_call(1, false, CallState::Alerting)]);
    voice.on_audio_codec_changed(&conn, 2);
    h.clock.advance(1_000);
    voice.on_ril_call_list_changed(&[cs_call(1, false, CallState::Active)]);
    h.clock.advance(MINUTE_MILLIS);
    voice.on_ril_call_list_changed(&[disconnected(cs_call(1, false, CallState::Active), 61_000)]);

    assert_eq!(voice.active_call_count(), 0);

    h.skip_cooldown();
    let calls = h.storage.get_voice_call_sessions(HOUR).unwrap();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.direction, CallDirection::Mo);
    assert_eq!(call.bearer_at_start, Bearer::Cs);
    assert!(!call.setup_failed);
    assert_eq!(call.setup_duration, SetupDuration::UltraFast);
    assert_eq!(call.setup_duration_millis, 500);
    assert_eq!(call.disconnect_reason_code, NORMAL_CLEARING);
    assert_eq!(call.rat_at_start, rat::LTE);
    assert_eq!(call.rat_at_connected, rat::LTE);
    assert_eq!(call.rat_at_end, rat::LTE);
    assert_eq!(call.rat_switch_count, 0);
    assert_eq!(call.codec_bitmask, AudioCodec::AmrWb.bit());
    assert_eq!(call.main_codec_quality, CodecQuality::Wideband);
    assert_eq!(call.signal_strength_at_end, 3);
    assert_eq!(call.band_at_end, 7);

    let usages = h.storage.get_voice_call_rat_usages(HOUR).unwrap();
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].rat, rat::LTE);
    assert_eq!(usages[0].call_count, 1);
    assert_eq!(usages[0].total_duration_millis, 61_500);
}

#[test]
fn test_mt_call_setup_starts_when_accepted() {
    let h = Harness::new();
    let voice = h.voice();

    voice.on_ril_call_list_changed(&[cs_call(2, true, CallState::Incoming)]);
    h.clock.advance(5_000);
    voice.on_ril_accept_call(&[cs_call(2, true, CallState::Incoming)]);
    h.clock.advance(300);
    voice.on_ril_call_list_changed(&[cs_call(2, true, CallState::Active)]);
    voice.on_ril_call_list_changed(&[disconnected(cs_call(2, true, CallState::Active), 1_000)]);

    h.skip_cooldown();
    let calls = h.storage.get_voice_call_sessions(HOUR).unwrap();
    let call = &calls[0];
    assert_eq!(call.direction, CallDirection::Mt);
    assert_eq!(call.setup_duration_millis, 300);
    assert_eq!(call.setup_duration, SetupDuration::ExtremelyFast);
    assert!(!call.setup_failed);
}

#[test]
fn test_call_dropped_during_setup_is_setup_failure() {
    let h = Harness::new();
    let voice = h.voice();

    voice.on_ril_dial(&cs_call(3, false, CallState::Dialing));
    h.clock.advance(3_000);
    voice.on_ril_call_list_changed(&[disconnected(cs_call(3, false, CallState::Dialing), 0)]);

    h.skip_cooldown();
    let calls = h.storage.get_voice_call_sessions(HOUR).unwrap();
    let call = &calls[0];
    assert!(call.setup_failed);
    assert_eq!(call.setup_duration_millis, 3_000);
    assert_eq!(call.setup_duration, SetupDuration::Slow);
    assert_eq!(call.main_codec_quality, CodecQuality::Unknown);
}

#[test]
fn test_srvcc_moves_ims_call_to_cs() {
    let h = Harness::new();
    h.phone.set_ims_voice_rat(rat::LTE);
    let voice = h.voice();

    voice.on_ims_dial(&ims_call(7, CallState::Dialing));
    h.clock.advance(800);
    voice.on_call_state_changed(&[ims_call(7, CallState::Active)]);

    h.phone.set_ims_voice_rat(rat::UNKNOWN);
    h.phone.set_service_state(Some(ServiceStateSnapshot {
        voice_rat: rat::UMTS,
        data_rat: rat::LTE,
        ..Default::default()
    }));
    voice.on_ril_srvcc_state_changed(SrvccState::Completed, Some(&[7]));
    assert_eq!(voice.active_call_count(), 1);

    h.clock.advance(20_000);
    let mut ended = disconnected(ims_call(7, CallState::Active), 20_800);
    ended.bearer = Bearer::Cs;
    voice.on_ril_call_list_changed(&[ended]);

    h.skip_cooldown();
    let calls = h.storage.get_voice_call_sessions(HOUR).unwrap();
    let call = &calls[0];
    assert_eq!(call.bearer_at_start, Bearer::Ims);
    assert_eq!(call.bearer_at_end, Bearer::Cs);
    assert!(call.srvcc_completed);
    assert_eq!(call.rat_at_start, rat::LTE);
    assert_eq!(call.rat_at_end, rat::UMTS);
    assert_eq!(call.rat_switch_count, 1);
}

#[test]
fn test_srvcc_failures_are_counted_without_explicit_list() {
    let h = Harness::new();
    let voice = h.voice();

    voice.on_ims_dial(&ims_call(8, CallState::Dialing));
    voice.on_ril_srvcc_state_changed(SrvccState::Failed, None);
    voice.on_ril_srvcc_state_changed(SrvccState::Canceled, None);
    voice.on_ims_call_terminated(None, &ImsReasonInfo::new(510, 0, None));

    h.skip_cooldown();
    let calls = h.storage.get_voice_call_sessions(HOUR).unwrap();
    let call = &calls[0];
    assert_eq!(call.srvcc_failure_count, 1);
    assert_eq!(call.srvcc_cancellation_count, 1);
    assert!(!call.srvcc_completed);
    assert_eq!(call.bearer_at_end, Bearer::Ims);
}

#[test]
fn test_ims_termination_redacts_reason() {
    let h = Harness::new();
    let voice = h.voice();

    voice.on_ims_call_received(&ims_call(9, CallState::Incoming));
    voice.on_ims_call_terminated(
        None,
        &ImsReasonInfo::new(510, 2, Some("busy at 10.0.0.1")),
    );

    h.skip_cooldown();
    let calls = h.storage.get_voice_call_sessions(HOUR).unwrap();
    assert_eq!(calls[0].disconnect_reason_code, 510);
    assert_eq!(calls[0].disconnect_extra_code, 2);
    assert_eq!(calls[0].disconnect_extra_message, "busy at <IPV4_REDACTED>");
}

#[test]
fn test_untracked_ims_termination_is_still_recorded() {
    let h = Harness::new();
    let voice = h.voice();

    voice.on_ims_call_start_failed(
        Some(&ims_call(10, CallState::Dialing)),
        &ImsReasonInfo::new(143, 0, None),
    );

    assert_eq!(voice.active_call_count(), 0);
    assert_eq!(h.storage.record_count(AtomCategory::VoiceCallSession), 1);
}

#[test]
fn test_events_for_unknown_calls_are_ignored() {
    let h = Harness::new();
    let voice = h.voice();
    let ghost = cs_call(99, false, CallState::Active);

    voice.on_audio_codec_changed(&ghost, 1);
    voice.on_rtt_started(&ghost);
    voice.on_video_state_change(&ghost, true);
    voice.on_call_state_changed(&[ghost]);
    voice.on_ims_call_terminated(None, &ImsReasonInfo::default());

    assert_eq!(voice.active_call_count(), 0);
    assert_eq!(h.storage.record_count(AtomCategory::VoiceCallSession), 0);
}

#[test]
fn test_service_state_segments_and_switches() {
    let h = Harness::new();
    let stats = ServiceStateStats::new(h.phone.clone(), h.storage.clone(), h.clock.clone());

    stats.on_service_state_changed(Some(&in_service(rat::LTE)));
    h.clock.advance(1_000);
    stats.on_service_state_changed(Some(&in_service(rat::NR)));
    h.clock.advance(500);
    stats.conclude();
    h.clock.advance(200);
    stats.on_service_state_changed(None);
    assert!(stats.current_state().is_none());

    h.skip_cooldown();
    let mut states = h.storage.get_cellular_service_states(HOUR).unwrap();
    states.sort_by_key(|state| state.data_rat);
    assert_eq!(states.len(), 2);
    assert_eq!((states[0].data_rat, states[0].total_time_millis), (rat::LTE, 1_000));
    assert_eq!((states[1].data_rat, states[1].total_time_millis), (rat::NR, 700));

    let switches = h.storage.get_cellular_data_service_switches(HOUR).unwrap();
    assert_eq!(switches.len(), 1);
    assert_eq!((switches[0].rat_from, switches[0].rat_to), (rat::LTE, rat::NR));
    assert_eq!(switches[0].switch_count, 1);
}

#[test]
fn test_ims_registration_time_and_termination() {
    let h = Harness::new();
    let ims = ImsStats::new(h.phone.clone(), h.storage.clone(), h.clock.clone());

    ims.on_set_feature_response(MmTelFeature::Voice, ImsRegistrationTech::Lte, true);
    ims.on_ims_registering(ImsRegistrationTech::Lte);
    ims.on_ims_registered(ImsRegistrationTech::Lte);
    ims.on_ims_capabilities_changed(
        ImsRegistrationTech::Lte,
        MmTelCapabilities::of(&[MmTelFeature::Voice, MmTelFeature::Sms]),
    );
    assert_eq!(ims.ims_voice_rat(), rat::LTE);

    h.clock.advance(10 * MINUTE_MILLIS);
    ims.on_ims_unregistered(&ImsReasonInfo::new(1_000, 0, Some("network detach")));
    assert!(!ims.is_registered());

    h.skip_cooldown();
    let stats = h.storage.get_ims_registration_stats(HOUR).unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].rat, rat::LTE);
    assert_eq!(stats[0].registered_millis, 10 * MINUTE_MILLIS);
    assert_eq!(stats[0].voice_capable_millis, 10 * MINUTE_MILLIS);
    assert_eq!(stats[0].voice_available_millis, 10 * MINUTE_MILLIS);
    assert_eq!(stats[0].sms_available_millis, 10 * MINUTE_MILLIS);
    assert_eq!(stats[0].sms_capable_millis, 0);
    assert_eq!(stats[0].video_available_millis, 0);

    let terminations = h.storage.get_ims_registration_terminations(HOUR).unwrap();
    assert_eq!(terminations.len(), 1);
    assert!(!terminations[0].setup_failed);
    assert_eq!(terminations[0].rat_at_end, rat::LTE);
    assert_eq!(terminations[0].extra_message, "network detach");
}

#[test]
fn test_ims_failed_registration_is_setup_failure() {
    let h = Harness::new();
    let ims = ImsStats::new(h.phone.clone(), h.storage.clone(), h.clock.clone());

    ims.on_ims_registering(ImsRegistrationTech::Iwlan);
    h.clock.advance(2_000);
    ims.on_ims_unregistered(&ImsReasonInfo::new(1_400, 0, None));

    assert_eq!(h.storage.record_count(AtomCategory::ImsRegistrationStats), 0);
    h.skip_cooldown();
    let terminations = h.storage.get_ims_registration_terminations(HOUR).unwrap();
    assert_eq!(terminations.len(), 1);
    assert!(terminations[0].setup_failed);
    assert_eq!(terminations[0].rat_at_end, rat::IWLAN);
    assert_eq!(terminations[0].count, 1);
}
