use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub use connector::{ConnectionState, RelayConnector, DEFAULT_CONNECT_ATTEMPTS};
pub use directory::CsvRelayDirectory;
pub use http::HttpRelayNode;
pub use identity::{short_key, Identity, LocalIdentityResolver};
pub use resolver::AddressResolver;

mod connector;
mod directory;
mod http;
mod identity;
mod resolver;

#[cfg(test)]
pub mod testing;

/// A multiaddr-shaped relay address. Only strings starting with `/` survive
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RelayAddress(String);

impl RelayAddress {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with('/') {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RelayAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    Online,
    Other(String),
}

impl RelayStatus {
    pub fn from_report(report: &str) -> Self {
        match report.trim() {
            "online" => Self::Online,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Moderation certificate attached to a message by the moderators that saw it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModCert {
    #[serde(default)]
    pub sign: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawMessageBody {
    pub content: String,
    #[serde(deserialize_with = "deserialize_millis")]
    pub ts: i64,
}

/// One record of a message page as the node returns it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawMessageRecord {
    pub public_key: String,
    pub msg: RawMessageBody,
    pub sign: String,
    #[serde(default)]
    pub mod_certs: Vec<ModCert>,
}

/// What the node hands back for a submitted message. Older nodes answer with
/// the collected certificates instead of a text acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SubmitReply {
    Ack(String),
    Certs(Vec<ModCert>),
}

/// Timestamps arrive either as JSON numbers or as decimal strings.
fn deserialize_millis<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Number(i64),
        Text(String),
    }

    match Millis::deserialize(deserializer)? {
        Millis::Number(n) => Ok(n),
        Millis::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// The node the client talks to for connectivity, history and sending.
#[async_trait]
pub trait RelayNode: Send + Sync {
    async fn connection_status(&self) -> Result<RelayStatus>;
    async fn connect(&self, addresses: &[RelayAddress]) -> Result<()>;
    async fn fetch_message_page(&self, anchor: DateTime<Utc>) -> Result<Vec<RawMessageRecord>>;
    async fn submit(&self, content: &str) -> Result<SubmitReply>;
    async fn public_key(&self) -> Result<String>;
}

/// Directory of candidate relay addresses.
#[async_trait]
pub trait RelayDirectory: Send + Sync {
    async fn relay_addresses(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_alias(&self, public_key: &str) -> Result<String>;
    async fn resolve_avatar(&self, public_key: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_address_requires_leading_slash() {
        assert!(RelayAddress::parse("/ip4/10.0.0.1/tcp/4001/p2p/12D3KooW").is_some());
        assert!(RelayAddress::parse("  /dns4/relay.example/tcp/443 ").is_some());
        assert!(RelayAddress::parse("ip4/10.0.0.1").is_none());
        assert!(RelayAddress::parse("").is_none());
    }

    #[test]
    fn status_report_only_online_is_online() {
        assert!(RelayStatus::from_report("online").is_online());
        assert!(!RelayStatus::from_report("offline").is_online());
        assert!(!RelayStatus::from_report("Online!").is_online());
    }

    #[test]
    fn message_page_keeps_large_timestamps() {
        let page = r#"[
            {"public_key":"pk1","msg":{"content":"hi","ts":9007199254740993},"sign":"s1","mod_certs":[{"sign":"m","public_key":"mk","status":"1"}]},
            {"public_key":"pk2","msg":{"content":"yo","ts":"9223372036854775000"},"sign":"s2"}
        ]"#;
        let records: Vec<RawMessageRecord> = serde_json::from_str(page).unwrap();
        assert_eq!(records[0].msg.ts, 9_007_199_254_740_993);
        assert_eq!(records[0].mod_certs.len(), 1);
        assert_eq!(records[1].msg.ts, 9_223_372_036_854_775_000);
        assert!(records[1].mod_certs.is_empty());
    }

    #[test]
    fn submit_reply_accepts_text_or_certs() {
        let ack: SubmitReply = serde_json::from_str(r#""Sent. Sign: abc Time: 1""#).unwrap();
        assert_eq!(ack, SubmitReply::Ack("Sent. Sign: abc Time: 1".into()));

        let certs: SubmitReply =
            serde_json::from_str(r#"[{"sign":"x","public_key":"y","status":"0"}]"#).unwrap();
        match certs {
            SubmitReply::Certs(certs) => assert_eq!(certs[0].status, "0"),
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
