use super::voice_call::ConnectionId;
use crate::atoms::VoiceCallRatUsage;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

#[derive(Debug, Default, Clone)]
struct UsageEntry {
    duration_millis: i64,
    call_ids: BTreeSet<ConnectionId>,
}

/// Time spent on each (carrier, RAT) while calls were ongoing.
///
/// Usage belongs to the phone rather than to a call: concurrent calls on the same RAT count
/// the time once, but each distinct call is counted on every RAT it used.
#[derive(Debug, Default)]
pub struct VoiceCallRatTracker {
    usages: BTreeMap<(i32, i32), UsageEntry>,
    current: Option<(i32, i32)>,
    current_since_millis: i64,
}

impl VoiceCallRatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the current segment at `now_millis` and opens one on (`carrier_id`, `rat`) for
    /// the given calls.
    pub fn add<I>(&mut self, carrier_id: i32, rat: i32, now_millis: i64, calls: I)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        self.close_segment(now_millis);

        let key = (carrier_id, rat);
        self.usages.entry(key).or_default().call_ids.extend(calls);
        self.current = Some(key);
        self.current_since_millis = now_millis;
    }

    /// Closes the current segment at `now_millis` and keeps tracking the same key.
    pub fn conclude(&mut self, now_millis: i64) {
        self.close_segment(now_millis);
        self.current_since_millis = now_millis;
    }

    pub fn is_empty(&self) -> bool {
        self.usages.is_empty()
    }

    pub fn clear(&mut self) {
        self.usages.clear();
        self.current = None;
        self.current_since_millis = 0;
    }

    pub fn to_atoms(&self) -> Vec<VoiceCallRatUsage> {
        self.usages
            .iter()
            .map(|(&(carrier_id, rat), entry)| VoiceCallRatUsage {
                carrier_id,
                rat,
                total_duration_millis: entry.duration_millis,
                call_count: entry.call_ids.len() as i64,
            })
            .collect()
    }

    fn close_segment(&mut self, now_millis: i64) {
        let Some(key) = self.current else {
            return;
        };
        let mut duration = now_millis - self.current_since_millis;
        if duration < 0 {
            warn!(duration, "negative voice RAT segment, clamping to zero");
            duration = 0;
        }
        self.usages.entry(key).or_default().duration_millis += duration;
    }
}
