use super::{Concludable, PhoneContext, rat};
use crate::atoms::DataCallSession;
use crate::core::{SharedClock, lock_or_recover};
use crate::storage::PersistAtomsStorage;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Data call failure causes the tracker branches on.
pub mod data_fail_cause {
    pub const NONE: i32 = 0;
}

/// Protocol of a data call whose IP type is not known yet.
pub const PROTOCOL_UNKNOWN: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeactivateReason {
    #[default]
    Unknown = 0,
    Normal = 1,
    RadioOff = 2,
    Handover = 3,
}

impl DeactivateReason {
    /// Maps the deactivation reason passed to the data service.
    pub fn from_data_service_reason(reason: i32) -> Self {
        match reason {
            1 => DeactivateReason::Normal,
            2 => DeactivateReason::RadioOff,
            3 => DeactivateReason::Handover,
            _ => DeactivateReason::Unknown,
        }
    }
}

struct DataCallState {
    session: Option<DataCallSession>,
    /// Minute-granular start of the current duration segment.
    start_minutes: i64,
    rng: StdRng,
}

/// Tracks one data call, from setup request to disconnection.
///
/// Ongoing calls are stored as partial snapshots on [`Concludable::conclude`]; the snapshots
/// and the final record share a random `dimension` so storage folds them together.
pub struct DataCallSessionStats {
    phone: Arc<dyn PhoneContext>,
    storage: Arc<PersistAtomsStorage>,
    clock: SharedClock,
    state: Mutex<DataCallState>,
}

impl DataCallSessionStats {
    pub fn new(
        phone: Arc<dyn PhoneContext>,
        storage: Arc<PersistAtomsStorage>,
        clock: SharedClock,
    ) -> Self {
        Self::with_rng(phone, storage, clock, StdRng::from_entropy())
    }

    pub fn with_rng(
        phone: Arc<dyn PhoneContext>,
        storage: Arc<PersistAtomsStorage>,
        clock: SharedClock,
        rng: StdRng,
    ) -> Self {
        Self {
            phone,
            storage,
            clock,
            state: Mutex::new(DataCallState {
                session: None,
                start_minutes: 0,
                rng,
            }),
        }
    }

    pub fn has_ongoing_session(&self) -> bool {
        lock_or_recover(&self.state).session.is_some()
    }

    /// Starts a session for a data call about to be set up.
    pub fn on_setup_data_call(&self, apn_type_bitmask: i32) {
        let now_minutes = self.now_minutes();
        let mut state = lock_or_recover(&self.state);
        if state.session.is_some() {
            warn!("data call setup while a session is ongoing, replacing it");
        }
        let service_state = self.phone.service_state();
        let session = DataCallSession {
            dimension: state.rng.next_u32() as i32,
            is_multi_sim: self.phone.is_multi_sim(),
            is_esim: self.phone.is_esim(),
            apn_type_bitmask,
            carrier_id: self.phone.carrier_id(),
            is_roaming: service_state
                .as_ref()
                .is_some_and(|service_state| service_state.is_network_roaming),
            rat_at_end: rat::UNKNOWN,
            is_opportunistic: self.phone.is_opportunistic(),
            ip_type: PROTOCOL_UNKNOWN,
            failure_cause: data_fail_cause::NONE,
            deactivate_reason: DeactivateReason::Unknown as i32,
            ongoing: true,
            ..Default::default()
        };
        state.session = Some(session);
        state.start_minutes = now_minutes;
    }

    /// Completes setup. A failed setup is stored right away and ends the session.
    pub fn on_setup_data_call_response(
        &self,
        current_rat: i32,
        apn_type_bitmask: i32,
        protocol: i32,
        failure_cause: i32,
        suggested_retry_millis: Option<i64>,
    ) {
        let mut state = lock_or_recover(&self.state);
        let Some(session) = state.session.as_mut() else {
            warn!("setup response without a data call session");
            return;
        };

        if current_rat != rat::UNKNOWN {
            session.rat_at_end = current_rat;
            session.band_at_end = self.band_for(current_rat);
        }
        // Keep the APN types given at setup, if any.
        if session.apn_type_bitmask == 0 {
            session.apn_type_bitmask = apn_type_bitmask;
        }
        session.ip_type = protocol;
        session.failure_cause = failure_cause;
        if let Some(retry) = suggested_retry_millis {
            session.suggested_retry_millis =
                retry.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        }

        if failure_cause != data_fail_cause::NONE {
            session.setup_failed = true;
            self.end_session(&mut state);
        }
    }

    pub fn set_deactivate_data_call_reason(&self, data_service_reason: i32) {
        let mut state = lock_or_recover(&self.state);
        match state.session.as_mut() {
            Some(session) => {
                session.deactivate_reason =
                    DeactivateReason::from_data_service_reason(data_service_reason) as i32;
            }
            None => debug!("deactivate reason without a data call session"),
        }
    }

    pub fn on_data_call_disconnected(&self, failure_cause: i32) {
        let now_minutes = self.now_minutes();
        let mut state = lock_or_recover(&self.state);
        let start_minutes = state.start_minutes;
        let Some(session) = state.session.as_mut() else {
            warn!("disconnect without a data call session");
            return;
        };
        session.failure_cause = failure_cause;
        session.duration_minutes = now_minutes - start_minutes;
        self.end_session(&mut state);
    }

    pub fn on_handover_failure(&self, failure_cause: i32) {
        let mut state = lock_or_recover(&self.state);
        if let Some(session) = state.session.as_mut() {
            session.record_handover_failure(failure_cause);
        }
    }

    /// Counts a RAT switch when the data RAT changes; the band is refreshed either way.
    pub fn on_drs_or_rat_changed(&self, current_rat: i32) {
        if current_rat == rat::UNKNOWN {
            return;
        }
        let mut state = lock_or_recover(&self.state);
        let Some(session) = state.session.as_mut() else {
            return;
        };
        if session.rat_at_end != current_rat {
            session.rat_switch_count += 1;
            session.rat_at_end = current_rat;
        }
        session.band_at_end = self.band_for(current_rat);
    }

    fn end_session(&self, state: &mut DataCallState) {
        let Some(mut session) = state.session.take() else {
            return;
        };
        session.ongoing = false;
        session.oos_at_end = self.is_out_of_service();
        self.storage.add_data_call_session(session);
    }

    fn band_for(&self, current_rat: i32) -> i32 {
        if current_rat == rat::IWLAN {
            return 0;
        }
        self.phone
            .service_state()
            .map(|service_state| service_state.band)
            .unwrap_or_default()
    }

    fn is_out_of_service(&self) -> bool {
        self.phone
            .service_state()
            .is_some_and(|service_state| service_state.data_rat == rat::UNKNOWN)
    }

    fn now_minutes(&self) -> i64 {
        self.clock.elapsed_millis() / MILLIS_PER_MINUTE
    }
}

impl Concludable for DataCallSessionStats {
    /// Stores the session so far and restarts duration, RAT switch and handover failure
    /// accounting, leaving the session open.
    fn conclude(&self) {
        let now_minutes = self.now_minutes();
        let mut state = lock_or_recover(&self.state);
        let start_minutes = state.start_minutes;
        let Some(session) = state.session.as_mut() else {
            return;
        };
        let mut snapshot = session.clone();
        snapshot.duration_minutes = now_minutes - start_minutes;
        session.rat_switch_count = 0;
        session.handover_failure_causes.clear();
        state.start_minutes = now_minutes;
        self.storage.add_data_call_session(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deactivate_reason_mapping() {
        assert_eq!(
            DeactivateReason::from_data_service_reason(1),
            DeactivateReason::Normal
        );
        assert_eq!(
            DeactivateReason::from_data_service_reason(2),
            DeactivateReason::RadioOff
        );
        assert_eq!(
            DeactivateReason::from_data_service_reason(99),
            DeactivateReason::Unknown
        );
    }
}
