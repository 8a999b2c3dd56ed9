//! Aggregate records ("atoms") collected between pulls.
//!
//! Every atom is a flat set of fields. Dimension fields identify an atom inside its category,
//! measure fields accumulate when two atoms with the same dimensions are merged, and outcome
//! fields are fixed once set.

pub mod category;
pub mod data_call;
pub mod ims;
pub mod network;
pub mod service_state;
pub mod sms;
pub mod voice;

pub use category::AtomCategory;
pub use data_call::{DataCallSession, SIZE_LIMIT_HANDOVER_FAILURES};
pub use ims::{ImsRegistrationStats, ImsRegistrationTermination};
pub use network::{CarrierIdMismatch, NetworkRequests};
pub use service_state::{CellularDataServiceSwitch, CellularServiceState};
pub use sms::{IncomingSms, OutgoingSms};
pub use voice::{
    AudioCodec, Bearer, CallDirection, CallDuration, CodecQuality, SetupDuration,
    VoiceCallRatUsage, VoiceCallSession,
};

/// An atom whose identity is a subset of its fields.
pub trait Dimensioned {
    /// Returns true if both atoms carry the same dimension fields.
    fn same_dimensions(&self, other: &Self) -> bool;
}

/// An atom that folds into an existing atom with the same dimensions.
pub trait Mergeable: Dimensioned {
    /// Merges `newer` into `self`. Callers guarantee `self.same_dimensions(newer)`.
    fn merge(&mut self, newer: &Self);
}
