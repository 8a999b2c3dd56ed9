//! Pull coordinator.
//!
//! The metrics scheduler pulls one category at a time by id. Each pull concludes the trackers
//! registered for that category, drains the category from storage subject to the cooldown, and
//! encodes the drained atoms as [`StatsEvent`]s.

pub mod event;

pub use event::{AtomValue, EventEncoder, StatsEvent, round};

use crate::atoms::AtomCategory;
use crate::core::{CollectorConfig, duration_millis, lock_or_recover};
use crate::stats::Concludable;
use crate::storage::PersistAtomsStorage;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, error, warn};

/// Result of a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The category was drained; the list may be empty.
    Success(Vec<StatsEvent>),
    /// Nothing was drained: pulled too recently, storage not ready, or unknown category.
    Skip,
}

impl PullOutcome {
    pub fn is_skip(&self) -> bool {
        matches!(self, PullOutcome::Skip)
    }

    pub fn events(&self) -> &[StatsEvent] {
        match self {
            PullOutcome::Success(events) => events,
            PullOutcome::Skip => &[],
        }
    }
}

pub struct MetricsCollector {
    storage: OnceLock<Arc<PersistAtomsStorage>>,
    config: CollectorConfig,
    trackers: Mutex<BTreeMap<AtomCategory, Vec<Arc<dyn Concludable>>>>,
}

impl MetricsCollector {
    /// Creates a collector whose storage is attached later; pulls skip until then.
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            storage: OnceLock::new(),
            config,
            trackers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_storage(storage: Arc<PersistAtomsStorage>, config: CollectorConfig) -> Self {
        let collector = Self::new(config);
        collector.attach_storage(storage);
        collector
    }

    /// Attaches the backing storage. Returns `false` if one was already attached.
    pub fn attach_storage(&self, storage: Arc<PersistAtomsStorage>) -> bool {
        if self.storage.set(storage).is_err() {
            warn!("storage already attached to the metrics collector");
            return false;
        }
        true
    }

    pub fn storage(&self) -> Option<&Arc<PersistAtomsStorage>> {
        self.storage.get()
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Categories the collector answers pulls for.
    pub fn registered_categories(&self) -> Vec<AtomCategory> {
        AtomCategory::ALL.to_vec()
    }

    /// Registers a tracker to be concluded before every pull of `category`.
    pub fn register_tracker(&self, category: AtomCategory, tracker: Arc<dyn Concludable>) {
        lock_or_recover(&self.trackers)
            .entry(category)
            .or_default()
            .push(tracker);
    }

    pub fn unregister_tracker(&self, category: AtomCategory, tracker: &Arc<dyn Concludable>) {
        let mut trackers = lock_or_recover(&self.trackers);
        if let Some(registered) = trackers.get_mut(&category) {
            registered.retain(|candidate| !Arc::ptr_eq(candidate, tracker));
            if registered.is_empty() {
                trackers.remove(&category);
            }
        }
    }

    pub fn tracker_count(&self, category: AtomCategory) -> usize {
        lock_or_recover(&self.trackers)
            .get(&category)
            .map_or(0, Vec::len)
    }

    /// Pulls the category with the given atom id.
    pub fn on_pull(&self, atom_id: i32) -> PullOutcome {
        match AtomCategory::from_id(atom_id) {
            Some(category) => self.pull(category),
            None => {
                error!(atom_id, "unexpected atom id");
                PullOutcome::Skip
            }
        }
    }

    pub fn pull(&self, category: AtomCategory) -> PullOutcome {
        let Some(storage) = self.storage.get() else {
            debug!(%category, "pull before storage is ready");
            return PullOutcome::Skip;
        };

        self.conclude_trackers(category);

        let cooldown = self.config.min_cooldown;
        let encoder = EventEncoder::new(duration_millis(self.config.duration_bucket));
        let events: Option<Vec<StatsEvent>> = match category {
            AtomCategory::VoiceCallSession => storage
                .get_voice_call_sessions(cooldown)
                .map(|sessions| sessions.iter().map(|s| encoder.voice_call_session(s)).collect()),
            AtomCategory::VoiceCallRatUsage => storage
                .get_voice_call_rat_usages(cooldown)
                .map(|usages| self.rat_usage_events(&encoder, usages)),
            AtomCategory::IncomingSms => storage
                .get_incoming_sms(cooldown)
                .map(|sms| sms.iter().map(|s| encoder.incoming_sms(s)).collect()),
            AtomCategory::OutgoingSms => storage
                .get_outgoing_sms(cooldown)
                .map(|sms| sms.iter().map(|s| encoder.outgoing_sms(s)).collect()),
            AtomCategory::CarrierIdTableVersion => Some(vec![
                encoder.carrier_id_table_version(storage.carrier_id_table_version()),
            ]),
            AtomCategory::DataCallSession => storage
                .get_data_call_sessions(cooldown)
                .map(|sessions| sessions.iter().map(|s| encoder.data_call_session(s)).collect()),
            AtomCategory::CellularServiceState => storage
                .get_cellular_service_states(cooldown)
                .map(|states| states.iter().map(|s| encoder.cellular_service_state(s)).collect()),
            AtomCategory::CellularDataServiceSwitch => storage
                .get_cellular_data_service_switches(cooldown)
                .map(|switches| {
                    switches
                        .iter()
                        .map(|s| encoder.cellular_data_service_switch(s))
                        .collect()
                }),
            AtomCategory::ImsRegistrationStats => storage
                .get_ims_registration_stats(cooldown)
                .map(|stats| stats.iter().map(|s| encoder.ims_registration_stats(s)).collect()),
            AtomCategory::ImsRegistrationTermination => storage
                .get_ims_registration_terminations(cooldown)
                .map(|terminations| {
                    terminations
                        .iter()
                        .map(|t| encoder.ims_registration_termination(t))
                        .collect()
                }),
            AtomCategory::NetworkRequests => storage
                .get_network_requests(cooldown)
                .map(|requests| requests.iter().map(|r| encoder.network_requests(r)).collect()),
        };

        match events {
            Some(events) => {
                debug!(%category, count = events.len(), "pulled");
                PullOutcome::Success(events)
            }
            None => {
                warn!(%category, "pull too frequent, skipping");
                PullOutcome::Skip
            }
        }
    }

    /// Drops sparse buckets and orders the rest by carrier, then RAT.
    fn rat_usage_events(
        &self,
        encoder: &EventEncoder,
        mut usages: Vec<crate::atoms::VoiceCallRatUsage>,
    ) -> Vec<StatsEvent> {
        let total = usages.len();
        let min_calls = i64::try_from(self.config.min_calls_per_bucket).unwrap_or(i64::MAX);
        usages.retain(|usage| usage.call_count >= min_calls);
        usages.sort_by_key(|usage| usage.sort_key());
        debug!(pulled = usages.len(), total, "voice call RAT usage filtered");
        usages
            .iter()
            .map(|usage| encoder.voice_call_rat_usage(usage))
            .collect()
    }

    fn conclude_trackers(&self, category: AtomCategory) {
        // Trackers call back into storage; conclude them without holding the registry lock.
        let trackers = lock_or_recover(&self.trackers)
            .get(&category)
            .cloned()
            .unwrap_or_default();
        for tracker in trackers {
            tracker.conclude();
        }
    }
}
