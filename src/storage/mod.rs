pub mod atoms_storage;
pub mod flush;
pub mod image;
pub mod record_store;
pub mod reservoir;

pub use atoms_storage::PersistAtomsStorage;
pub use flush::FlushScheduler;
pub use image::{AtomsFile, PersistAtomsImage, UNKNOWN_CARRIER_ID_TABLE_VERSION};
pub use record_store::{RecordStore, StoredRecord};
pub use reservoir::{EvictionPolicy, Slot};
