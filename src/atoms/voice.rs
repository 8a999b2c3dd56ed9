use super::{Dimensioned, Mergeable};
use serde::{Deserialize, Serialize};

/// Bearer carrying a voice call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Bearer {
    #[default]
    Unknown,
    /// Circuit switched (GSM/CDMA).
    Cs,
    /// Packet switched over IMS.
    Ims,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CallDirection {
    #[default]
    Unknown,
    /// Mobile originated.
    Mo,
    /// Mobile terminated.
    Mt,
}

/// Call setup duration buckets, ordered from fastest to slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum SetupDuration {
    #[default]
    Unknown,
    ExtremelyFast,
    UltraFast,
    VeryFast,
    Fast,
    Normal,
    Slow,
    VerySlow,
    UltraSlow,
    ExtremelySlow,
}

impl SetupDuration {
    /// Exclusive upper bounds in milliseconds, ascending. Anything at or above the last bound
    /// is `ExtremelySlow`.
    const LADDER: [(i64, SetupDuration); 9] = [
        (0, SetupDuration::Unknown),
        (400, SetupDuration::ExtremelyFast),
        (700, SetupDuration::UltraFast),
        (1_000, SetupDuration::VeryFast),
        (1_500, SetupDuration::Fast),
        (2_500, SetupDuration::Normal),
        (4_000, SetupDuration::Slow),
        (6_000, SetupDuration::VerySlow),
        (10_000, SetupDuration::UltraSlow),
    ];

    pub fn classify(duration_millis: i64) -> Self {
        Self::LADDER
            .iter()
            .find(|(upper_bound, _)| duration_millis < *upper_bound)
            .map(|(_, bucket)| *bucket)
            .unwrap_or(SetupDuration::ExtremelySlow)
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Connected call duration buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum CallDuration {
    #[default]
    Unknown,
    LessThanOneMinute,
    LessThanFiveMinutes,
    LessThanTenMinutes,
    LessThanThirtyMinutes,
    LessThanOneHour,
    MoreThanOneHour,
}

impl CallDuration {
    const LADDER: [(i64, CallDuration); 5] = [
        (60_000, CallDuration::LessThanOneMinute),
        (300_000, CallDuration::LessThanFiveMinutes),
        (600_000, CallDuration::LessThanTenMinutes),
        (1_800_000, CallDuration::LessThanThirtyMinutes),
        (3_600_000, CallDuration::LessThanOneHour),
    ];

    pub fn classify(duration_millis: i64) -> Self {
        if duration_millis <= 0 {
            return CallDuration::Unknown;
        }
        Self::LADDER
            .iter()
            .find(|(upper_bound, _)| duration_millis < *upper_bound)
            .map(|(_, bucket)| *bucket)
            .unwrap_or(CallDuration::MoreThanOneHour)
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Audio quality buckets, from unknown to fullband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum CodecQuality {
    #[default]
    Unknown = 0,
    Narrowband = 1,
    Wideband = 2,
    SuperWideband = 3,
    Fullband = 4,
}

impl CodecQuality {
    pub const COUNT: usize = 5;

    pub const ALL: [CodecQuality; Self::COUNT] = [
        CodecQuality::Unknown,
        CodecQuality::Narrowband,
        CodecQuality::Wideband,
        CodecQuality::SuperWideband,
        CodecQuality::Fullband,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Audio codecs. The discriminant is the bit position in `VoiceCallSession::codec_bitmask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AudioCodec {
    #[default]
    Unknown = 0,
    Amr = 1,
    AmrWb = 2,
    Qcelp13k = 3,
    Evrc = 4,
    EvrcB = 5,
    EvrcWb = 6,
    EvrcNw = 7,
    GsmEfr = 8,
    GsmFr = 9,
    GsmHr = 10,
    G711u = 11,
    G723 = 12,
    G711a = 13,
    G722 = 14,
    G711ab = 15,
    G729 = 16,
    EvsNb = 17,
    EvsWb = 18,
    EvsSwb = 19,
    EvsFb = 20,
}

impl AudioCodec {
    /// Maps a bearer-specific audio quality report to a codec.
    ///
    /// CS and IMS stacks number their audio qualities differently; anything unrecognised, or
    /// reported on an unknown bearer, maps to `Unknown`.
    pub fn from_audio_quality(bearer: Bearer, audio_quality: i32) -> Self {
        match bearer {
            Bearer::Cs => match audio_quality {
                1 => AudioCodec::Amr,
                2 => AudioCodec::AmrWb,
                3 => AudioCodec::GsmEfr,
                4 => AudioCodec::GsmFr,
                5 => AudioCodec::GsmHr,
                6 => AudioCodec::Evrc,
                7 => AudioCodec::EvrcB,
                8 => AudioCodec::EvrcWb,
                9 => AudioCodec::EvrcNw,
                _ => AudioCodec::Unknown,
            },
            Bearer::Ims => match audio_quality {
                1 => AudioCodec::Amr,
                2 => AudioCodec::AmrWb,
                3 => AudioCodec::Qcelp13k,
                4 => AudioCodec::Evrc,
                5 => AudioCodec::EvrcB,
                6 => AudioCodec::EvrcWb,
                7 => AudioCodec::EvrcNw,
                8 => AudioCodec::GsmEfr,
                9 => AudioCodec::GsmFr,
                10 => AudioCodec::GsmHr,
                11 => AudioCodec::G711u,
                12 => AudioCodec::G723,
                13 => AudioCodec::G711a,
                14 => AudioCodec::G722,
                15 => AudioCodec::G711ab,
                16 => AudioCodec::G729,
                17 => AudioCodec::EvsNb,
                18 => AudioCodec::EvsWb,
                19 => AudioCodec::EvsSwb,
                20 => AudioCodec::EvsFb,
                _ => AudioCodec::Unknown,
            },
            Bearer::Unknown => AudioCodec::Unknown,
        }
    }

    pub fn quality(self) -> CodecQuality {
        match self {
            AudioCodec::Amr
            | AudioCodec::Qcelp13k
            | AudioCodec::Evrc
            | AudioCodec::EvrcB
            | AudioCodec::EvrcNw
            | AudioCodec::GsmEfr
            | AudioCodec::GsmFr
            | AudioCodec::GsmHr
            | AudioCodec::G711u
            | AudioCodec::G723
            | AudioCodec::G711a
            | AudioCodec::G722
            | AudioCodec::G711ab
            | AudioCodec::G729
            | AudioCodec::EvsNb => CodecQuality::Narrowband,
            AudioCodec::AmrWb | AudioCodec::EvsWb | AudioCodec::EvrcWb => CodecQuality::Wideband,
            AudioCodec::EvsSwb => CodecQuality::SuperWideband,
            AudioCodec::EvsFb => CodecQuality::Fullband,
            AudioCodec::Unknown => CodecQuality::Unknown,
        }
    }

    pub fn bit(self) -> i64 {
        1i64 << (self as u32)
    }
}

/// One finished voice call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceCallSession {
    pub bearer_at_start: Bearer,
    pub bearer_at_end: Bearer,
    pub direction: CallDirection,
    pub setup_duration: SetupDuration,
    pub setup_duration_millis: i32,
    pub setup_failed: bool,
    pub disconnect_reason_code: i32,
    pub disconnect_extra_code: i32,
    pub disconnect_extra_message: String,
    pub rat_at_start: i32,
    pub rat_at_connected: i32,
    pub rat_at_end: i32,
    pub rat_switch_count: i64,
    pub band_at_end: i32,
    pub codec_bitmask: i64,
    pub main_codec_quality: CodecQuality,
    pub concurrent_call_count_at_start: i32,
    pub concurrent_call_count_at_end: i32,
    pub sim_slot_index: i32,
    pub is_multi_sim: bool,
    pub is_esim: bool,
    pub carrier_id: i32,
    pub srvcc_completed: bool,
    pub srvcc_failure_count: i64,
    pub srvcc_cancellation_count: i64,
    pub rtt_enabled: bool,
    pub is_emergency: bool,
    pub is_roaming: bool,
    pub signal_strength_at_end: i32,
    pub video_enabled: bool,
    pub is_multiparty: bool,
    pub call_duration: CallDuration,
}

/// Time spent and calls made on one RAT of one carrier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceCallRatUsage {
    pub carrier_id: i32,
    pub rat: i32,
    pub total_duration_millis: i64,
    pub call_count: i64,
}

impl VoiceCallRatUsage {
    /// Composite key used to order reported usages by carrier, then RAT.
    pub fn sort_key(&self) -> i64 {
        (i64::from(self.carrier_id) << 32) | i64::from(self.rat as u32)
    }
}

impl Dimensioned for VoiceCallRatUsage {
    fn same_dimensions(&self, other: &Self) -> bool {
        self.carrier_id == other.carrier_id && self.rat == other.rat
    }
}

impl Mergeable for VoiceCallRatUsage {
    fn merge(&mut self, newer: &Self) {
        self.total_duration_millis += newer.total_duration_millis;
        self.call_count += newer.call_count;
    }
}
