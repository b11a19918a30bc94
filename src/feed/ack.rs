use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::MessageStatus;
use crate::error::RelayError;

static SIGN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Sign:\s*(\S+)").expect("valid sign regex"));
static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Time:\s*(\d+)").expect("valid time regex"));

const SENT_MARKER: &str = "Sent";
const REJECTED_MARKER: &str = "rejected";
const TIMEOUT_MARKER: &str = "timeout";

/// Outcome of a send as read from the node's acknowledgment text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgment {
    pub status: MessageStatus,
    pub signature: Option<String>,
    pub timestamp: Option<i64>,
}

impl Acknowledgment {
    /// First match wins: sent, rejected, timeout without a signature, any
    /// signature. Text matching none of these counts as rejected.
    pub fn parse(text: &str) -> Self {
        let signature = SIGN_RE.captures(text).map(|c| c[1].to_string());
        let timestamp = TIME_RE.captures(text).and_then(|c| c[1].parse().ok());

        let status = if text.contains(SENT_MARKER) {
            MessageStatus::Approved
        } else if text.contains(REJECTED_MARKER) {
            MessageStatus::Rejected
        } else if text.contains(TIMEOUT_MARKER) && signature.is_none() {
            MessageStatus::Pending
        } else if signature.is_some() {
            MessageStatus::Approved
        } else {
            warn!("{}", RelayError::SendAmbiguous(text.to_string()));
            MessageStatus::Rejected
        };

        Self {
            status,
            signature,
            timestamp,
        }
    }
}
