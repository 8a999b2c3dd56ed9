use serde::{Deserialize, Serialize};

/// One received SMS (or one part of a multipart message).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncomingSms {
    pub sms_format: i32,
    pub sms_tech: i32,
    pub rat: i32,
    pub sms_type: i32,
    pub total_parts: i32,
    pub received_parts: i32,
    pub blocked: bool,
    pub error: i32,
    pub is_roaming: bool,
    pub sim_slot_index: i32,
    pub is_multi_sim: bool,
    pub is_esim: bool,
    pub carrier_id: i32,
    pub message_id: i64,
}

/// One send attempt of an SMS.
///
/// Retries of a message share `message_id`; `retry_id` counts the attempts of that message
/// that were recorded before this one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSms {
    pub sms_format: i32,
    pub sms_tech: i32,
    pub rat: i32,
    pub send_result: i32,
    pub error_code: i32,
    pub is_roaming: bool,
    pub is_from_default_app: bool,
    pub sim_slot_index: i32,
    pub is_multi_sim: bool,
    pub is_esim: bool,
    pub carrier_id: i32,
    pub message_id: i64,
    pub retry_id: i32,
    pub interval_millis: i64,
}
