use super::ims::filter_extra_message;
use super::rat_usage::VoiceCallRatTracker;
use super::{ImsReasonInfo, PhoneContext, ServiceStateSnapshot, rat};
use crate::atoms::{
    AudioCodec, Bearer, CallDirection, CallDuration, CodecQuality, SetupDuration, VoiceCallSession,
};
use crate::core::{SharedClock, lock_or_recover};
use crate::storage::PersistAtomsStorage;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{Level, debug, event, warn};

/// Identifies a call connection.
///
/// The creation time of the connection is used, since it is carried over when an IMS call is
/// handed over to CS.
pub type ConnectionId = i64;

/// Disconnect cause of a connection that is still up.
pub const NOT_DISCONNECTED: i32 = 0;

/// Share of the call duration the main codec quality (or better) must cover, in percent.
const MAIN_CODEC_QUALITY_THRESHOLD: i64 = 70;

/// Concurrent calls above this count are unexpected and get logged.
const MAX_NORMAL_CONCURRENT_CALLS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallState {
    #[default]
    Idle,
    Active,
    Holding,
    Dialing,
    Alerting,
    Incoming,
    Waiting,
    Disconnected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrvccState {
    None,
    Started,
    Completed,
    Failed,
    Canceled,
}

/// What the call stack reports about one connection.
#[derive(Debug, Clone, Default)]
pub struct CallConnection {
    pub id: ConnectionId,
    pub bearer: Bearer,
    pub is_incoming: bool,
    pub is_emergency: bool,
    pub is_multiparty: bool,
    pub is_video: bool,
    pub has_rtt: bool,
    /// State of the connection itself.
    pub state: CallState,
    /// State of the call the connection belongs to.
    pub call_state: CallState,
    pub disconnect_cause: i32,
    pub precise_disconnect_cause: i32,
    pub vendor_disconnect_cause: Option<String>,
    /// Bearer-specific audio quality code of the codec in use.
    pub audio_quality: i32,
    /// Connected duration reported by the call stack.
    pub duration_millis: i64,
}

impl CallConnection {
    fn direction(&self) -> CallDirection {
        if self.is_incoming {
            CallDirection::Mt
        } else {
            CallDirection::Mo
        }
    }

    fn is_disconnected(&self) -> bool {
        self.disconnect_cause != NOT_DISCONNECTED
    }
}

struct CallSession {
    record: VoiceCallSession,
    /// Set while setup is in progress. MT calls start it when accepted.
    setup_begin_millis: Option<i64>,
    /// Codec changes as (elapsed millis, codec), oldest first.
    codec_usage: Vec<(i64, AudioCodec)>,
}

#[derive(Default)]
struct VoiceCallState {
    calls: BTreeMap<ConnectionId, CallSession>,
    rat_usage: VoiceCallRatTracker,
}

impl VoiceCallState {
    fn ims_connection_ids(&self) -> Vec<ConnectionId> {
        self.calls
            .iter()
            .filter(|(_, session)| session.record.bearer_at_end == Bearer::Ims)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Tracks the voice calls of one phone, from creation to disconnection.
pub struct VoiceCallSessionStats {
    phone: Arc<dyn PhoneContext>,
    storage: Arc<PersistAtomsStorage>,
    clock: SharedClock,
    state: Mutex<VoiceCallState>,
}

impl VoiceCallSessionStats {
    pub fn new(
        phone: Arc<dyn PhoneContext>,
        storage: Arc<PersistAtomsStorage>,
        clock: SharedClock,
    ) -> Self {
        Self {
            phone,
            storage,
            clock,
            state: Mutex::new(VoiceCallState::default()),
        }
    }

    /// Number of calls currently tracked.
    pub fn active_call_count(&self) -> usize {
        lock_or_recover(&self.state).calls.len()
    }

    /* CS calls */

    /// Restarts setup timing of ringing MT calls that were accepted.
    pub fn on_ril_accept_call(&self, connections: &[CallConnection]) {
        let mut state = lock_or_recover(&self.state);
        for conn in connections {
            self.accept_call(&mut state, conn);
        }
    }

    pub fn on_ril_dial(&self, conn: &CallConnection) {
        let mut state = lock_or_recover(&self.state);
        self.add_call(&mut state, conn);
    }

    /// Handles creation, state changes and termination of CS calls.
    ///
    /// The list may be partial, so calls missing from it are left alone.
    pub fn on_ril_call_list_changed(&self, connections: &[CallConnection]) {
        let mut state = lock_or_recover(&self.state);
        for conn in connections {
            if !state.calls.contains_key(&conn.id) {
                if conn.is_disconnected() {
                    debug!(connection_id = conn.id, "skipping already disconnected connection");
                    continue;
                }
                self.add_call(&mut state, conn);
                if let Some(session) = state.calls.get_mut(&conn.id) {
                    self.check_call_setup(session, conn);
                }
                continue;
            }

            if let Some(session) = state.calls.get_mut(&conn.id) {
                self.check_call_setup(session, conn);
                if conn.is_disconnected() {
                    let record = &mut session.record;
                    record.bearer_at_end = conn.bearer;
                    record.disconnect_reason_code = conn.disconnect_cause;
                    record.disconnect_extra_code = conn.precise_disconnect_cause;
                    record.disconnect_extra_message =
                        conn.vendor_disconnect_cause.clone().unwrap_or_default();
                    record.call_duration = CallDuration::classify(conn.duration_millis);
                }
            }
            if conn.is_disconnected() {
                self.finish_call(&mut state, conn.id);
            }
        }
    }

    /* IMS calls */

    pub fn on_ims_dial(&self, conn: &CallConnection) {
        self.on_ims_call_created(conn);
    }

    pub fn on_ims_call_received(&self, conn: &CallConnection) {
        self.on_ims_call_created(conn);
    }

    pub fn on_ims_accept_call(&self, connections: &[CallConnection]) {
        let mut state = lock_or_recover(&self.state);
        for conn in connections {
            self.accept_call(&mut state, conn);
        }
    }

    pub fn on_ims_call_start_failed(&self, conn: Option<&CallConnection>, reason: &ImsReasonInfo) {
        self.on_ims_call_terminated(conn, reason);
    }

    /// Ends an IMS call.
    ///
    /// Without a connection, the single tracked IMS call is ended, if there is exactly one. An
    /// untracked connection is tracked on the spot so its outcome is still recorded.
    pub fn on_ims_call_terminated(&self, conn: Option<&CallConnection>, reason: &ImsReasonInfo) {
        let mut state = lock_or_recover(&self.state);
        match conn {
            None => {
                let ims_ids = state.ims_connection_ids();
                if let [id] = ims_ids.as_slice() {
                    warn!(connection_id = id, "ending IMS call without connection");
                    self.finish_ims_call(&mut state, *id, reason, 0);
                } else {
                    warn!(
                        ims_calls = ims_ids.len(),
                        "IMS call terminated without connection, ignoring"
                    );
                }
            }
            Some(conn) => {
                if !state.calls.contains_key(&conn.id) {
                    warn!(connection_id = conn.id, "terminating untracked IMS connection");
                    self.add_call(&mut state, conn);
                }
                self.finish_ims_call(&mut state, conn.id, reason, conn.duration_millis);
            }
        }
    }

    pub fn on_rtt_started(&self, conn: &CallConnection) {
        let mut state = lock_or_recover(&self.state);
        Self::set_rtt_started(&mut state, conn);
    }

    /* general */

    pub fn on_audio_codec_changed(&self, conn: &CallConnection, audio_quality: i32) {
        let now = self.clock.elapsed_millis();
        let mut state = lock_or_recover(&self.state);
        let Some(session) = state.calls.get_mut(&conn.id) else {
            warn!(connection_id = conn.id, "audio codec changed on untracked connection");
            return;
        };
        let codec = AudioCodec::from_audio_quality(session.record.bearer_at_end, audio_quality);
        session.record.codec_bitmask |= codec.bit();
        session.codec_usage.push((now, codec));
    }

    pub fn on_video_state_change(&self, conn: &CallConnection, is_video: bool) {
        let mut state = lock_or_recover(&self.state);
        match state.calls.get_mut(&conn.id) {
            Some(session) => {
                if is_video {
                    session.record.video_enabled = true;
                }
            }
            None => warn!(connection_id = conn.id, "video state changed on untracked connection"),
        }
    }

    pub fn on_multiparty_change(&self, conn: &CallConnection, is_multiparty: bool) {
        let mut state = lock_or_recover(&self.state);
        match state.calls.get_mut(&conn.id) {
            Some(session) => {
                if is_multiparty {
                    session.record.is_multiparty = true;
                }
            }
            None => warn!(connection_id = conn.id, "multiparty changed on untracked connection"),
        }
    }

    /// Tracks setup progress of the connections of a call whose state changed.
    pub fn on_call_state_changed(&self, connections: &[CallConnection]) {
        let mut state = lock_or_recover(&self.state);
        for conn in connections {
            match state.calls.get_mut(&conn.id) {
                Some(session) => self.check_call_setup(session, conn),
                None => warn!(connection_id = conn.id, "call state changed on untracked connection"),
            }
        }
    }

    /// Applies an SRVCC transition to the handed-over calls.
    ///
    /// Without an explicit handover list, every tracked IMS call is assumed to be handed over.
    pub fn on_ril_srvcc_state_changed(
        &self,
        srvcc_state: SrvccState,
        handover_connections: Option<&[ConnectionId]>,
    ) {
        let mut state = lock_or_recover(&self.state);
        let ids = match handover_connections {
            Some(ids) => ids.to_vec(),
            None => {
                let ids = state.ims_connection_ids();
                warn!(ims_calls = ids.len(), "no handover connections, using tracked IMS calls");
                ids
            }
        };

        for id in ids {
            let Some(session) = state.calls.get_mut(&id) else {
                warn!(connection_id = id, "SRVCC on untracked connection");
                continue;
            };
            let record = &mut session.record;
            match srvcc_state {
                SrvccState::Completed => {
                    record.srvcc_completed = true;
                    record.bearer_at_end = Bearer::Cs;
                    // Bearer change may move the call to another RAT, e.g. IWLAN to UMTS.
                    let rat = self.voice_rat_of(self.phone.service_state().as_ref(), Bearer::Cs);
                    update_rat_at_end(record, rat);
                }
                SrvccState::Failed => record.srvcc_failure_count += 1,
                SrvccState::Canceled => record.srvcc_cancellation_count += 1,
                SrvccState::None | SrvccState::Started => {}
            }
        }
    }

    pub fn on_service_state_changed(&self, service_state: Option<&ServiceStateSnapshot>) {
        let mut state = lock_or_recover(&self.state);
        if !state.calls.is_empty() {
            self.update_rat_tracker(&mut state, service_state);
        }
    }

    fn voice_rat_of(&self, service_state: Option<&ServiceStateSnapshot>, bearer: Bearer) -> i32 {
        super::voice_rat(self.phone.as_ref(), service_state, bearer)
    }

    fn on_ims_call_created(&self, conn: &CallConnection) {
        let mut state = lock_or_recover(&self.state);
        self.add_call(&mut state, conn);
        if conn.has_rtt {
            Self::set_rtt_started(&mut state, conn);
        }
    }

    fn accept_call(&self, state: &mut VoiceCallState, conn: &CallConnection) {
        match state.calls.get_mut(&conn.id) {
            Some(session) => {
                debug!(connection_id = conn.id, "resetting setup info");
                session.setup_begin_millis = Some(self.clock.elapsed_millis());
            }
            None => warn!(connection_id = conn.id, "accepting untracked connection"),
        }
    }

    fn add_call(&self, state: &mut VoiceCallState, conn: &CallConnection) {
        if state.calls.contains_key(&conn.id) {
            warn!(connection_id = conn.id, "connection already tracked");
            return;
        }

        let service_state = self.phone.service_state();
        let rat = self.voice_rat_of(service_state.as_ref(), conn.bearer);
        let direction = conn.direction();
        let mut record = VoiceCallSession {
            bearer_at_start: conn.bearer,
            bearer_at_end: conn.bearer,
            direction,
            setup_failed: true,
            disconnect_reason_code: conn.disconnect_cause,
            disconnect_extra_code: conn.precise_disconnect_cause,
            disconnect_extra_message: conn.vendor_disconnect_cause.clone().unwrap_or_default(),
            rat_at_start: rat,
            rat_at_connected: rat::UNKNOWN,
            rat_at_end: rat,
            sim_slot_index: self.phone.phone_id(),
            is_multi_sim: self.phone.is_multi_sim(),
            is_esim: self.phone.is_esim(),
            carrier_id: self.phone.carrier_id(),
            is_emergency: conn.is_emergency,
            is_roaming: service_state
                .as_ref()
                .is_some_and(|state| state.is_network_roaming),
            is_multiparty: conn.is_multiparty,
            video_enabled: conn.is_video,
            concurrent_call_count_at_start: state.calls.len() as i32,
            ..Default::default()
        };

        // The codec may already be known when the call is created.
        let codec = AudioCodec::from_audio_quality(conn.bearer, conn.audio_quality);
        if codec != AudioCodec::Unknown {
            record.codec_bitmask = codec.bit();
        }

        if state.calls.len() > MAX_NORMAL_CONCURRENT_CALLS {
            event!(
                Level::WARN,
                concurrent_calls = state.calls.len(),
                "anomalous number of concurrent calls"
            );
        }

        // MT setup only begins once the call is accepted.
        let setup_begin_millis = match direction {
            CallDirection::Mt => None,
            _ => Some(self.clock.elapsed_millis()),
        };
        state.calls.insert(
            conn.id,
            CallSession {
                record,
                setup_begin_millis,
                codec_usage: Vec::new(),
            },
        );

        self.update_rat_tracker(state, service_state.as_ref());
    }

    fn check_call_setup(&self, session: &mut CallSession, conn: &CallConnection) {
        let now = self.clock.elapsed_millis();

        // MO setup ends on ALERTING, MT setup on ACTIVE.
        if let Some(begin) = session.setup_begin_millis {
            if matches!(conn.call_state, CallState::Active | CallState::Alerting) {
                set_setup_duration(&mut session.record, now - begin);
                session.setup_begin_millis = None;
            }
        }

        // Runs once, the first time the call becomes active.
        if session.record.setup_failed && conn.state == CallState::Active {
            session.record.setup_failed = false;
            session.record.rat_at_connected = self.voice_rat_of(
                self.phone.service_state().as_ref(),
                session.record.bearer_at_end,
            );
            // Codec quality only counts from the moment the call is connected.
            if let Some(&(_, last_codec)) = session.codec_usage.last() {
                session.codec_usage = vec![(now, last_codec)];
            }
        }
    }

    fn finish_ims_call(
        &self,
        state: &mut VoiceCallState,
        id: ConnectionId,
        reason: &ImsReasonInfo,
        duration_millis: i64,
    ) {
        if let Some(session) = state.calls.get_mut(&id) {
            let record = &mut session.record;
            record.bearer_at_end = Bearer::Ims;
            record.disconnect_reason_code = reason.code;
            record.disconnect_extra_code = reason.extra_code;
            record.disconnect_extra_message = filter_extra_message(reason.extra_message.as_deref());
            record.call_duration = CallDuration::classify(duration_millis);
        }
        self.finish_call(state, id);
    }

    fn finish_call(&self, state: &mut VoiceCallState, id: ConnectionId) {
        let Some(session) = state.calls.remove(&id) else {
            warn!(connection_id = id, "could not find call to finish");
            return;
        };
        let now = self.clock.elapsed_millis();
        let CallSession {
            mut record,
            setup_begin_millis,
            codec_usage,
        } = session;

        // Time it took to fail setup, except for MT calls that were never picked up.
        if record.setup_failed && record.setup_duration_millis == 0 {
            if let Some(begin) = setup_begin_millis {
                set_setup_duration(&mut record, now - begin);
            }
        }

        record.concurrent_call_count_at_end = state.calls.len() as i32;
        record.main_codec_quality = main_codec_quality(&codec_usage, now);

        // Carrier id may not have been known when the call started.
        if record.carrier_id <= 0 {
            record.carrier_id = self.phone.carrier_id();
        }

        let rat = self.voice_rat_of(self.phone.service_state().as_ref(), record.bearer_at_end);
        update_rat_at_end(&mut record, rat);
        record.signal_strength_at_end = self.phone.signal_strength_level(record.rat_at_end);

        self.storage.add_voice_call_session(record);

        if state.calls.is_empty() {
            state.rat_usage.conclude(now);
            self.storage
                .add_voice_call_rat_usage(state.rat_usage.to_atoms());
            state.rat_usage.clear();
        }
    }

    fn set_rtt_started(state: &mut VoiceCallState, conn: &CallConnection) {
        let Some(session) = state.calls.get_mut(&conn.id) else {
            warn!(connection_id = conn.id, "RTT started on untracked connection");
            return;
        };
        if session.record.bearer_at_start != conn.bearer || session.record.bearer_at_end != conn.bearer
        {
            debug!(connection_id = conn.id, "RTT started after bearer change");
        }
        session.record.rtt_enabled = true;
    }

    fn update_rat_tracker(
        &self,
        state: &mut VoiceCallState,
        service_state: Option<&ServiceStateSnapshot>,
    ) {
        let now = self.clock.elapsed_millis();
        let rat = self.voice_rat_of(service_state, Bearer::Unknown);
        let ids: Vec<ConnectionId> = state.calls.keys().copied().collect();
        state
            .rat_usage
            .add(self.phone.carrier_id(), rat, now, ids);

        let band = service_state.map(|s| s.band).unwrap_or_default();
        for session in state.calls.values_mut() {
            let rat = self.voice_rat_of(service_state, session.record.bearer_at_end);
            update_rat_at_end(&mut session.record, rat);
            session.record.band_at_end = if rat == rat::IWLAN { 0 } else { band };
        }
    }
}

fn set_setup_duration(record: &mut VoiceCallSession, duration_millis: i64) {
    record.setup_duration_millis = i32::try_from(duration_millis).unwrap_or(i32::MAX);
    record.setup_duration = SetupDuration::classify(duration_millis);
}

fn update_rat_at_end(record: &mut VoiceCallSession, rat: i32) {
    if record.rat_at_end != rat {
        record.rat_switch_count += 1;
        record.rat_at_end = rat;
    }
}

/// Dominant codec quality of a call.
///
/// Each codec counts from its timestamp until the next change, the last one until
/// `end_millis`. Scanning from the best quality down, the first quality at which the
/// accumulated time reaches 70% of the total wins. No codec time yields `Unknown`.
pub fn main_codec_quality(codec_usage: &[(i64, AudioCodec)], end_millis: i64) -> CodecQuality {
    let mut time_per_quality = [0i64; CodecQuality::COUNT];
    let mut total = 0i64;
    for (index, (start, codec)) in codec_usage.iter().enumerate() {
        let end = codec_usage
            .get(index + 1)
            .map(|(next_start, _)| *next_start)
            .unwrap_or(end_millis);
        let time = (end - start).max(0);
        time_per_quality[codec.quality().index()] += time;
        total += time;
    }
    if total == 0 {
        return CodecQuality::Unknown;
    }

    let threshold = total * MAIN_CODEC_QUALITY_THRESHOLD / 100;
    let mut time_at_or_above = 0i64;
    for quality in CodecQuality::ALL.iter().rev() {
        time_at_or_above += time_per_quality[quality.index()];
        if time_at_or_above >= threshold {
            return *quality;
        }
    }
    CodecQuality::Unknown
}
