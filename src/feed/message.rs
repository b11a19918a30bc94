use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::relay::ModCert;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Approved,
    Pending,
    Rejected,
}

impl MessageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub signature: String,
    pub content: String,
    pub author_public_key: String,
    pub author_alias: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub community_id: String,
    pub status: MessageStatus,
    pub moderation_note: Vec<ModCert>,
    pub avatar_svg: String,
}

impl Message {
    /// `None` for timestamps chrono cannot represent.
    pub fn local_time(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.timestamp).single()
    }
}
