use super::record_store::RecordStore;
use super::reservoir::EvictionPolicy;
use crate::atoms::{
    AtomCategory, CarrierIdMismatch, CellularDataServiceSwitch, CellularServiceState,
    DataCallSession, ImsRegistrationStats, ImsRegistrationTermination, IncomingSms,
    NetworkRequests, OutgoingSms, VoiceCallRatUsage, VoiceCallSession,
};
use crate::core::{CategoryCapacities, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Carrier-id table version of an image that never received one.
pub const UNKNOWN_CARRIER_ID_TABLE_VERSION: i32 = -1;

/// Everything persisted between process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistAtomsImage {
    pub build_fingerprint: String,
    pub carrier_id_table_version: i32,
    pub voice_call_sessions: RecordStore<VoiceCallSession>,
    pub voice_call_rat_usages: RecordStore<VoiceCallRatUsage>,
    pub incoming_sms: RecordStore<IncomingSms>,
    pub outgoing_sms: RecordStore<OutgoingSms>,
    pub data_call_sessions: RecordStore<DataCallSession>,
    pub cellular_service_states: RecordStore<CellularServiceState>,
    pub cellular_data_service_switches: RecordStore<CellularDataServiceSwitch>,
    pub ims_registration_stats: RecordStore<ImsRegistrationStats>,
    pub ims_registration_terminations: RecordStore<ImsRegistrationTermination>,
    pub network_requests: RecordStore<NetworkRequests>,
    pub carrier_id_mismatches: RecordStore<CarrierIdMismatch>,
    /// Wall time of the last successful pull, per category.
    pub pull_timestamps: BTreeMap<AtomCategory, i64>,
}

impl Default for PersistAtomsImage {
    fn default() -> Self {
        Self {
            build_fingerprint: String::new(),
            carrier_id_table_version: UNKNOWN_CARRIER_ID_TABLE_VERSION,
            voice_call_sessions: RecordStore::default(),
            voice_call_rat_usages: RecordStore::default(),
            incoming_sms: RecordStore::default(),
            outgoing_sms: RecordStore::default(),
            data_call_sessions: RecordStore::default(),
            cellular_service_states: RecordStore::default(),
            cellular_data_service_switches: RecordStore::default(),
            ims_registration_stats: RecordStore::default(),
            ims_registration_terminations: RecordStore::default(),
            network_requests: RecordStore::default(),
            carrier_id_mismatches: RecordStore::default(),
            pull_timestamps: BTreeMap::new(),
        }
    }
}

impl PersistAtomsImage {
    /// An empty image for `build_fingerprint` whose pull timestamps all start at `now_millis`.
    pub fn fresh(build_fingerprint: &str, now_millis: i64) -> Self {
        let mut image = Self {
            build_fingerprint: build_fingerprint.to_string(),
            ..Self::default()
        };
        image.sanitize_pull_timestamps(now_millis);
        image
    }

    /// Applies capacities and eviction policies to every store.
    ///
    /// Returns the number of records dropped because a store held more than its capacity.
    pub fn configure(&mut self, capacities: &CategoryCapacities) -> usize {
        use EvictionPolicy::*;

        self.voice_call_sessions
            .configure(capacities.voice_call_sessions, RandomPlacement)
            + self
                .voice_call_rat_usages
                .configure(capacities.voice_call_rat_usages, LeastRecentlyUsed)
            + self.incoming_sms.configure(capacities.sms, RandomPlacement)
            + self.outgoing_sms.configure(capacities.sms, RandomPlacement)
            + self
                .data_call_sessions
                .configure(capacities.data_call_sessions, RandomPlacement)
            + self
                .cellular_service_states
                .configure(capacities.cellular_service_states, LeastRecentlyUsed)
            + self.cellular_data_service_switches.configure(
                capacities.cellular_data_service_switches,
                LeastRecentlyUsed,
            )
            + self
                .ims_registration_stats
                .configure(capacities.ims_registration_stats, LeastRecentlyUsed)
            + self.ims_registration_terminations.configure(
                capacities.ims_registration_terminations,
                LeastRecentlyUsed,
            )
            + self
                .network_requests
                .configure(capacities.network_requests, LeastRecentlyUsed)
            + self
                .carrier_id_mismatches
                .configure(capacities.carrier_id_mismatches, OldestFirst)
    }

    /// Resets missing or non-positive pull timestamps to `now_millis`, so a category
    /// accumulates for a full interval before its first pull.
    pub fn sanitize_pull_timestamps(&mut self, now_millis: i64) {
        for category in AtomCategory::ALL
            .into_iter()
            .filter(|category| category.has_pull_cooldown())
        {
            let timestamp = self.pull_timestamps.entry(category).or_insert(0);
            if *timestamp <= 0 {
                *timestamp = now_millis;
            }
        }
    }

    pub fn pull_timestamp(&self, category: AtomCategory) -> Option<i64> {
        self.pull_timestamps.get(&category).copied()
    }

    pub fn record_count(&self, category: AtomCategory) -> usize {
        match category {
            AtomCategory::VoiceCallSession => self.voice_call_sessions.len(),
            AtomCategory::VoiceCallRatUsage => self.voice_call_rat_usages.len(),
            AtomCategory::IncomingSms => self.incoming_sms.len(),
            AtomCategory::OutgoingSms => self.outgoing_sms.len(),
            AtomCategory::CarrierIdTableVersion => 0,
            AtomCategory::DataCallSession => self.data_call_sessions.len(),
            AtomCategory::CellularServiceState => self.cellular_service_states.len(),
            AtomCategory::CellularDataServiceSwitch => self.cellular_data_service_switches.len(),
            AtomCategory::ImsRegistrationStats => self.ims_registration_stats.len(),
            AtomCategory::ImsRegistrationTermination => self.ims_registration_terminations.len(),
            AtomCategory::NetworkRequests => self.network_requests.len(),
        }
    }
}

/// The on-disk atoms file.
pub struct AtomsFile {
    path: PathBuf,
}

impl AtomsFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encode(image: &PersistAtomsImage) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(image)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<PersistAtomsImage> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Reads the image. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<PersistAtomsImage>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Self::decode(&bytes).map(Some)
    }

    pub fn save(&self, image: &PersistAtomsImage) -> Result<()> {
        let bytes = Self::encode(image)?;
        self.write_bytes(&bytes)
    }

    /// Writes to a temporary file next to the target and renames it into place, so readers
    /// see either the previous image or the new one.
    pub fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}
