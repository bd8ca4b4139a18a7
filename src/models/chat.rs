//! Support chat between a user and the platform admin. The ledger stores the
//! messages; the gateway relays them, so these fields stay snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sender_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub receiver_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub receiver_email: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub sender_email: String,
    pub receiver_email: String,
    pub message: String,
}
