use super::flush::FlushScheduler;
use super::image::{AtomsFile, PersistAtomsImage};
use crate::atoms::{
    AtomCategory, CarrierIdMismatch, CellularDataServiceSwitch, CellularServiceState,
    DataCallSession, ImsRegistrationStats, ImsRegistrationTermination, IncomingSms,
    NetworkRequests, OutgoingSms, VoiceCallRatUsage, VoiceCallSession,
};
use crate::core::{
    MetricsError, Result, SharedClock, StorageConfig, duration_millis, lock_or_recover,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{Level, event};

struct AtomsState {
    image: PersistAtomsImage,
    rng: StdRng,
}

/// Process-wide cache of atoms, persisted to a single file.
///
/// All operations lock one mutex. Updates schedule a save after
/// [`StorageConfig::update_flush_delay`], pulls after the shorter
/// [`StorageConfig::pull_flush_delay`]; each request replaces the pending one.
pub struct PersistAtomsStorage {
    state: Arc<Mutex<AtomsState>>,
    file: Arc<AtomsFile>,
    /// Held across encode and write so saves land on disk in the order they were encoded.
    write_lock: Arc<Mutex<()>>,
    flusher: Option<FlushScheduler>,
    config: StorageConfig,
    clock: SharedClock,
}

impl PersistAtomsStorage {
    /// Loads the atoms file (or starts empty) and starts the flush worker.
    pub fn open(config: StorageConfig, clock: SharedClock) -> Result<Self> {
        Self::open_with_rng(config, clock, StdRng::from_entropy())
    }

    /// Same as [`PersistAtomsStorage::open`] with a caller-provided random source for record
    /// placement.
    pub fn open_with_rng(config: StorageConfig, clock: SharedClock, rng: StdRng) -> Result<Self> {
        config.validate()?;

        let file = Arc::new(AtomsFile::new(&config.path));
        let image = load_image(&file, &config, clock.wall_millis());
        let state = Arc::new(Mutex::new(AtomsState { image, rng }));
        let write_lock = Arc::new(Mutex::new(()));

        let flusher = if config.save_immediately {
            None
        } else {
            let state = state.clone();
            let file = file.clone();
            let write_lock = write_lock.clone();
            Some(FlushScheduler::spawn(move || {
                if let Err(err) = write_state(&state, &file, &write_lock) {
                    event!(Level::ERROR, error = %err, "failed to save atoms");
                }
            })?)
        };

        Ok(Self {
            state,
            file,
            write_lock,
            flusher,
            config,
            clock,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn add_voice_call_session(&self, session: VoiceCallSession) {
        self.update(|image, now, rng| {
            image.voice_call_sessions.insert(session, now, rng);
            true
        });
    }

    /// Merges per-RAT usage by (carrier, RAT).
    pub fn add_voice_call_rat_usage(&self, usages: Vec<VoiceCallRatUsage>) {
        if usages.is_empty() {
            return;
        }
        self.update(|image, now, rng| {
            for usage in usages {
                image.voice_call_rat_usages.upsert(usage, now, rng);
            }
            true
        });
    }

    pub fn add_incoming_sms(&self, sms: IncomingSms) {
        self.update(|image, now, rng| {
            image.incoming_sms.insert(sms, now, rng);
            true
        });
    }

    /// Stores an SMS send attempt, bumping its `retry_id` past any stored attempt of the same
    /// message.
    pub fn add_outgoing_sms(&self, mut sms: OutgoingSms) {
        self.update(|image, now, rng| {
            let previous_retry = image
                .outgoing_sms
                .iter()
                .filter(|stored| stored.message_id == sms.message_id)
                .map(|stored| stored.retry_id)
                .filter(|retry_id| *retry_id >= sms.retry_id)
                .max();
            if let Some(retry_id) = previous_retry {
                sms.retry_id = retry_id + 1;
            }
            image.outgoing_sms.insert(sms, now, rng);
            true
        });
    }

    /// Adds service state dwell time, and a data RAT switch if one happened.
    pub fn add_cellular_service_state_and_switch(
        &self,
        state: CellularServiceState,
        switch: Option<CellularDataServiceSwitch>,
    ) {
        self.update(|image, now, rng| {
            image.cellular_service_states.upsert(state, now, rng);
            if let Some(switch) = switch {
                image.cellular_data_service_switches.upsert(switch, now, rng);
            }
            true
        });
    }

    /// Adds a data call session, folding it into a stored snapshot of the same session.
    pub fn add_data_call_session(&self, session: DataCallSession) {
        self.update(|image, now, rng| {
            image.data_call_sessions.upsert(session, now, rng);
            true
        });
    }

    pub fn add_ims_registration_stats(&self, stats: ImsRegistrationStats) {
        self.update(|image, now, rng| {
            image.ims_registration_stats.upsert(stats, now, rng);
            true
        });
    }

    pub fn add_ims_registration_termination(&self, termination: ImsRegistrationTermination) {
        self.update(|image, now, rng| {
            image.ims_registration_terminations.upsert(termination, now, rng);
            true
        });
    }

    pub fn add_network_requests(&self, requests: NetworkRequests) {
        self.update(|image, now, rng| {
            image.network_requests.upsert(requests, now, rng);
            true
        });
    }

    /// Records a carrier-id mismatch once.
    ///
    /// Returns false if the same mismatch is already stored; the caller should then not report
    /// it again.
    pub fn add_carrier_id_mismatch(&self, mismatch: CarrierIdMismatch) -> bool {
        self.update(|image, now, rng| {
            if image.carrier_id_mismatches.contains(&mismatch) {
                return false;
            }
            image.carrier_id_mismatches.insert(mismatch, now, rng);
            true
        })
    }

    /// Stores `version` if it is newer than the stored carrier-id table version.
    pub fn set_carrier_id_table_version(&self, version: i32) -> bool {
        self.update(|image, _, _| {
            if image.carrier_id_table_version >= version {
                return false;
            }
            image.carrier_id_table_version = version;
            true
        })
    }

    pub fn carrier_id_table_version(&self) -> i32 {
        lock_or_recover(&self.state).image.carrier_id_table_version
    }

    pub fn get_voice_call_sessions(&self, min_interval: Duration) -> Option<Vec<VoiceCallSession>> {
        self.pull(AtomCategory::VoiceCallSession, min_interval, |image| {
            image.voice_call_sessions.drain_all()
        })
    }

    pub fn get_voice_call_rat_usages(
        &self,
        min_interval: Duration,
    ) -> Option<Vec<VoiceCallRatUsage>> {
        self.pull(AtomCategory::VoiceCallRatUsage, min_interval, |image| {
            image.voice_call_rat_usages.drain_all()
        })
    }

    pub fn get_incoming_sms(&self, min_interval: Duration) -> Option<Vec<IncomingSms>> {
        self.pull(AtomCategory::IncomingSms, min_interval, |image| {
            image.incoming_sms.drain_all()
        })
    }

    pub fn get_outgoing_sms(&self, min_interval: Duration) -> Option<Vec<OutgoingSms>> {
        self.pull(AtomCategory::OutgoingSms, min_interval, |image| {
            image.outgoing_sms.drain_all()
        })
    }

    pub fn get_data_call_sessions(&self, min_interval: Duration) -> Option<Vec<DataCallSession>> {
        self.pull(AtomCategory::DataCallSession, min_interval, |image| {
            image.data_call_sessions.drain_all()
        })
    }

    pub fn get_cellular_service_states(
        &self,
        min_interval: Duration,
    ) -> Option<Vec<CellularServiceState>> {
        self.pull(AtomCategory::CellularServiceState, min_interval, |image| {
            image.cellular_service_states.drain_all()
        })
    }

    pub fn get_cellular_data_service_switches(
        &self,
        min_interval: Duration,
    ) -> Option<Vec<CellularDataServiceSwitch>> {
        self.pull(AtomCategory::CellularDataServiceSwitch, min_interval, |image| {
            image.cellular_data_service_switches.drain_all()
        })
    }

    pub fn get_ims_registration_stats(
        &self,
        min_interval: Duration,
    ) -> Option<Vec<ImsRegistrationStats>> {
        self.pull(AtomCategory::ImsRegistrationStats, min_interval, |image| {
            image.ims_registration_stats.drain_all()
        })
    }

    pub fn get_ims_registration_terminations(
        &self,
        min_interval: Duration,
    ) -> Option<Vec<ImsRegistrationTermination>> {
        self.pull(AtomCategory::ImsRegistrationTermination, min_interval, |image| {
            image.ims_registration_terminations.drain_all()
        })
    }

    pub fn get_network_requests(&self, min_interval: Duration) -> Option<Vec<NetworkRequests>> {
        self.pull(AtomCategory::NetworkRequests, min_interval, |image| {
            image.network_requests.drain_all()
        })
    }

    /// Number of records currently held for `category`.
    pub fn record_count(&self, category: AtomCategory) -> usize {
        lock_or_recover(&self.state).image.record_count(category)
    }

    pub fn pull_timestamp(&self, category: AtomCategory) -> Option<i64> {
        lock_or_recover(&self.state).image.pull_timestamp(category)
    }

    /// Saves the current state synchronously, bypassing the flush worker.
    pub fn flush_now(&self) -> Result<()> {
        write_state(&self.state, &self.file, &self.write_lock)
    }

    /// Applies `apply` under the lock and schedules a save if it reports a change.
    fn update<F>(&self, apply: F) -> bool
    where
        F: FnOnce(&mut PersistAtomsImage, i64, &mut StdRng) -> bool,
    {
        let changed = {
            let mut state = lock_or_recover(&self.state);
            let now = self.clock.wall_millis();
            let AtomsState { image, rng } = &mut *state;
            apply(image, now, rng)
        };
        if changed {
            self.schedule_flush(self.config.update_flush_delay);
        }
        changed
    }

    fn pull<T, F>(&self, category: AtomCategory, min_interval: Duration, drain: F) -> Option<Vec<T>>
    where
        F: FnOnce(&mut PersistAtomsImage) -> Vec<T>,
    {
        let records = {
            let mut state = lock_or_recover(&self.state);
            let now = self.clock.wall_millis();
            let last_pull = state.image.pull_timestamp(category).unwrap_or(0);
            if now.saturating_sub(last_pull) <= duration_millis(min_interval) {
                event!(
                    Level::DEBUG,
                    category = %category,
                    last_pull,
                    now,
                    "pull too soon, skipping"
                );
                return None;
            }
            state.image.pull_timestamps.insert(category, now);
            drain(&mut state.image)
        };
        self.schedule_flush(self.config.pull_flush_delay);
        Some(records)
    }

    fn schedule_flush(&self, delay: Duration) {
        match &self.flusher {
            Some(flusher) => flusher.schedule(delay),
            None => {
                if let Err(err) = self.flush_now() {
                    event!(Level::ERROR, error = %err, "failed to save atoms");
                }
            }
        }
    }
}

fn load_image(file: &AtomsFile, config: &StorageConfig, now_millis: i64) -> PersistAtomsImage {
    let fresh = || PersistAtomsImage::fresh(&config.build_fingerprint, now_millis);
    let mut image = match file.load() {
        Ok(Some(image)) if image.build_fingerprint == config.build_fingerprint => image,
        Ok(Some(image)) => {
            event!(
                Level::INFO,
                stored = %image.build_fingerprint,
                running = %config.build_fingerprint,
                "build changed, discarding stored atoms"
            );
            fresh()
        }
        Ok(None) => {
            event!(Level::DEBUG, path = ?file.path(), "no stored atoms, starting empty");
            fresh()
        }
        Err(err) => {
            event!(Level::ERROR, error = %err, path = ?file.path(), "unreadable atoms file, starting empty");
            fresh()
        }
    };

    let dropped = image.configure(&config.capacities);
    if dropped > 0 {
        event!(Level::DEBUG, dropped, "truncated stored atoms to configured capacities");
    }
    image.sanitize_pull_timestamps(now_millis);
    image
}

/// Encodes under the state lock and writes after releasing it, all under `write_lock`.
fn write_state(state: &Mutex<AtomsState>, file: &AtomsFile, write_lock: &Mutex<()>) -> Result<()> {
    let _writer = lock_or_recover(write_lock);
    let bytes = {
        let state = lock_or_recover(state);
        AtomsFile::encode(&state.image)?
    };
    file.write_bytes(&bytes).map_err(|err| match err {
        MetricsError::IoError(msg) => {
            MetricsError::IoError(format!("{}: {}", file.path().display(), msg))
        }
        other => other,
    })
}
