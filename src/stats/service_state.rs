use super::{Concludable, PhoneContext, ServiceStateSnapshot, rat, voice_rat};
use crate::atoms::{Bearer, CellularDataServiceSwitch, CellularServiceState};
use crate::core::{SharedClock, lock_or_recover};
use crate::storage::PersistAtomsStorage;
use std::sync::{Arc, Mutex};

struct Segment {
    /// `None` while the radio is off; that time is not reported.
    state: Option<CellularServiceState>,
    since_millis: i64,
}

/// Tracks time spent in each service state and data RAT switches of one phone.
pub struct ServiceStateStats {
    phone: Arc<dyn PhoneContext>,
    storage: Arc<PersistAtomsStorage>,
    clock: SharedClock,
    last: Mutex<Segment>,
}

impl ServiceStateStats {
    pub fn new(
        phone: Arc<dyn PhoneContext>,
        storage: Arc<PersistAtomsStorage>,
        clock: SharedClock,
    ) -> Self {
        let since_millis = clock.elapsed_millis();
        Self {
            phone,
            storage,
            clock,
            last: Mutex::new(Segment {
                state: None,
                since_millis,
            }),
        }
    }

    /// Closes the current segment and opens one for `service_state`.
    ///
    /// `None` means the radio is off (e.g. airplane mode).
    pub fn on_service_state_changed(&self, service_state: Option<&ServiceStateSnapshot>) {
        let now = self.clock.elapsed_millis();
        let next = service_state.map(|snapshot| self.state_of(snapshot));
        let mut last = lock_or_recover(&self.last);
        let switch = data_service_switch(last.state.as_ref(), next.as_ref());
        let previous = std::mem::replace(
            &mut *last,
            Segment {
                state: next,
                since_millis: now,
            },
        );
        self.add_segment(previous, now, switch);
    }

    /// The state currently being timed, without its duration.
    pub fn current_state(&self) -> Option<CellularServiceState> {
        lock_or_recover(&self.last).state.clone()
    }

    fn state_of(&self, snapshot: &ServiceStateSnapshot) -> CellularServiceState {
        CellularServiceState {
            voice_rat: voice_rat(self.phone.as_ref(), Some(snapshot), Bearer::Unknown),
            data_rat: snapshot.data_rat,
            voice_roaming_type: snapshot.voice_roaming_type,
            data_roaming_type: snapshot.data_roaming_type,
            is_endc: snapshot.is_endc,
            sim_slot_index: self.phone.phone_id(),
            is_multi_sim: self.phone.is_multi_sim(),
            carrier_id: self.phone.carrier_id(),
            is_emergency_only: snapshot.is_emergency_only,
            total_time_millis: 0,
        }
    }

    fn add_segment(
        &self,
        segment: Segment,
        now_millis: i64,
        switch: Option<CellularDataServiceSwitch>,
    ) {
        let Some(mut state) = segment.state else {
            return;
        };
        state.total_time_millis = (now_millis - segment.since_millis).max(0);
        self.storage
            .add_cellular_service_state_and_switch(state, switch);
    }
}

impl Concludable for ServiceStateStats {
    fn conclude(&self) {
        let now = self.clock.elapsed_millis();
        let mut last = lock_or_recover(&self.last);
        let next = Segment {
            state: last.state.clone(),
            since_millis: now,
        };
        let previous = std::mem::replace(&mut *last, next);
        self.add_segment(previous, now, None);
    }
}

/// A switch is only counted between two in-service data RATs of the same SIM and carrier.
fn data_service_switch(
    previous: Option<&CellularServiceState>,
    next: Option<&CellularServiceState>,
) -> Option<CellularDataServiceSwitch> {
    let (previous, next) = (previous?, next?);
    if previous.data_rat == rat::UNKNOWN || next.data_rat == rat::UNKNOWN {
        return None;
    }
    if previous.sim_slot_index != next.sim_slot_index
        || previous.is_multi_sim != next.is_multi_sim
        || previous.carrier_id != next.carrier_id
    {
        return None;
    }
    if previous.data_rat == next.data_rat {
        return None;
    }
    Some(CellularDataServiceSwitch {
        rat_from: previous.data_rat,
        rat_to: next.data_rat,
        sim_slot_index: next.sim_slot_index,
        is_multi_sim: next.is_multi_sim,
        carrier_id: next.carrier_id,
        switch_count: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_service(data_rat: i32) -> CellularServiceState {
        CellularServiceState {
            voice_rat: data_rat,
            data_rat,
            carrier_id: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_switch_between_in_service_rats() {
        let switch = data_service_switch(Some(&in_service(rat::LTE)), Some(&in_service(rat::NR)));
        let switch = switch.unwrap();
        assert_eq!((switch.rat_from, switch.rat_to), (rat::LTE, rat::NR));
        assert_eq!(switch.switch_count, 1);
    }

    #[test]
    fn test_no_switch_out_of_service_or_unchanged() {
        assert!(data_service_switch(None, Some(&in_service(rat::LTE))).is_none());
        assert!(
            data_service_switch(Some(&in_service(rat::UNKNOWN)), Some(&in_service(rat::LTE)))
                .is_none()
        );
        assert!(
            data_service_switch(Some(&in_service(rat::LTE)), Some(&in_service(rat::LTE)))
                .is_none()
        );
    }

    #[test]
    fn test_no_switch_across_carriers() {
        let mut next = in_service(rat::NR);
        next.carrier_id = 2;
        assert!(data_service_switch(Some(&in_service(rat::LTE)), Some(&next)).is_none());
    }
}
