#![allow(dead_code)]

use persist_atoms::stats::{PhoneContext, ServiceStateSnapshot, rat};
use persist_atoms::{ManualClock, PersistAtomsStorage, StorageConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

pub const START_WALL_MILLIS: i64 = 1_700_000_000_000;
pub const CARRIER_ID: i32 = 1_187;

pub struct FakePhone {
    carrier_id: AtomicI32,
    ims_voice_rat: AtomicI32,
    service_state: Mutex<Option<ServiceStateSnapshot>>,
}

impl FakePhone {
    pub fn on_lte() -> Arc<Self> {
        Arc::new(Self {
            carrier_id: AtomicI32::new(CARRIER_ID),
            ims_voice_rat: AtomicI32::new(rat::UNKNOWN),
            service_state: Mutex::new(Some(in_service(rat::LTE))),
        })
    }

    pub fn set_service_state(&self, service_state: Option<ServiceStateSnapshot>) {
        *self.service_state.lock().unwrap() = service_state;
    }

    pub fn set_ims_voice_rat(&self, rat: i32) {
        self.ims_voice_rat.store(rat, Ordering::SeqCst);
    }

    pub fn set_carrier_id(&self, carrier_id: i32) {
        self.carrier_id.store(carrier_id, Ordering::SeqCst);
    }
}

impl PhoneContext for FakePhone {
    fn phone_id(&self) -> i32 {
        0
    }

    fn carrier_id(&self) -> i32 {
        self.carrier_id.load(Ordering::SeqCst)
    }

    fn is_multi_sim(&self) -> bool {
        false
    }

    fn is_esim(&self) -> bool {
        false
    }

    fn service_state(&self) -> Option<ServiceStateSnapshot> {
        self.service_state.lock().unwrap().clone()
    }

    fn signal_strength_level(&self, _rat: i32) -> i32 {
        3
    }

    fn ims_voice_rat(&self) -> i32 {
        self.ims_voice_rat.load(Ordering::SeqCst)
    }
}

pub fn in_service(data_rat: i32) -> ServiceStateSnapshot {
    ServiceStateSnapshot {
        voice_rat: data_rat,
        data_rat,
        band: 7,
        ..Default::default()
    }
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(START_WALL_MILLIS))
}

pub fn config(dir: &Path) -> StorageConfig {
    StorageConfig::new(dir, "build-1").save_immediately(true)
}

pub fn open_storage(config: StorageConfig, clock: Arc<ManualClock>) -> Arc<PersistAtomsStorage> {
    Arc::new(PersistAtomsStorage::open_with_rng(config, clock, StdRng::seed_from_u64(42)).unwrap())
}
