//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{
    IdentityResolver, RawMessageBody, RawMessageRecord, RelayAddress, RelayDirectory, RelayNode,
    RelayStatus, SubmitReply,
};

pub fn record(sign: &str, ts: i64) -> RawMessageRecord {
    RawMessageRecord {
        public_key: format!("pk-{}", sign),
        msg: RawMessageBody {
            content: format!("message {}", sign),
            ts,
        },
        sign: sign.to_string(),
        mod_certs: Vec::new(),
    }
}

/// How the fake node answers page requests.
pub enum PageSource {
    /// Pops scripted pages in order; an empty queue yields empty pages.
    Scripted(VecDeque<Result<Vec<RawMessageRecord>>>),
    /// Every call returns one never-seen record.
    Endless,
}

pub struct FakeNode {
    statuses: Mutex<VecDeque<RelayStatus>>,
    online_after_connects: Option<usize>,
    pages: Mutex<PageSource>,
    reply: Mutex<Option<Result<SubmitReply>>>,
    pub status_calls: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub anchors: Mutex<Vec<DateTime<Utc>>>,
    pub last_addresses: Mutex<Vec<RelayAddress>>,
}

impl FakeNode {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            online_after_connects: None,
            pages: Mutex::new(PageSource::Scripted(VecDeque::new())),
            reply: Mutex::new(None),
            status_calls: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            anchors: Mutex::new(Vec::new()),
            last_addresses: Mutex::new(Vec::new()),
        }
    }

    /// Statuses reported in order; once drained the node reports "offline"
    /// unless `online_after_connects` says otherwise.
    pub fn with_statuses(self, statuses: &[&str]) -> Self {
        *self.statuses.lock() = statuses.iter().map(|s| RelayStatus::from_report(s)).collect();
        self
    }

    /// Reports online once `connect` has been called `n` times.
    pub fn online_after_connects(mut self, n: usize) -> Self {
        self.online_after_connects = Some(n);
        self
    }

    pub fn with_pages(self, pages: Vec<Result<Vec<RawMessageRecord>>>) -> Self {
        *self.pages.lock() = PageSource::Scripted(pages.into());
        self
    }

    pub fn endless(self) -> Self {
        *self.pages.lock() = PageSource::Endless;
        self
    }

    pub fn with_reply(self, reply: Result<SubmitReply>) -> Self {
        *self.reply.lock() = Some(reply);
        self
    }

    pub fn connects(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayNode for FakeNode {
    async fn connection_status(&self) -> Result<RelayStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.statuses.lock().pop_front() {
            return Ok(status);
        }
        match self.online_after_connects {
            Some(n) if self.connects() >= n => Ok(RelayStatus::Online),
            _ => Ok(RelayStatus::Other("offline".into())),
        }
    }

    async fn connect(&self, addresses: &[RelayAddress]) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_addresses.lock() = addresses.to_vec();
        Err(anyhow!("dial failed"))
    }

    async fn fetch_message_page(&self, anchor: DateTime<Utc>) -> Result<Vec<RawMessageRecord>> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.anchors.lock().push(anchor);
        match &mut *self.pages.lock() {
            PageSource::Scripted(queue) => queue.pop_front().unwrap_or_else(|| Ok(Vec::new())),
            PageSource::Endless => Ok(vec![record(&format!("endless-{}", call), call as i64)]),
        }
    }

    async fn submit(&self, _content: &str) -> Result<SubmitReply> {
        self.reply
            .lock()
            .take()
            .unwrap_or_else(|| Err(anyhow!("no reply scripted")))
    }

    async fn public_key(&self) -> Result<String> {
        Ok("pk-self".to_string())
    }
}

pub struct FakeDirectory(pub Result<Vec<String>, String>);

#[async_trait]
impl RelayDirectory for FakeDirectory {
    async fn relay_addresses(&self) -> Result<Vec<String>> {
        self.0.clone().map_err(|e| anyhow!(e))
    }
}

/// Resolves `alias-<key>` / `<svg key>`; fails for keys listed in `broken`.
pub struct FakeIdentity {
    pub broken: Vec<String>,
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self { broken: Vec::new() }
    }
}

#[async_trait]
impl IdentityResolver for FakeIdentity {
    async fn resolve_alias(&self, public_key: &str) -> Result<String> {
        if self.broken.iter().any(|k| k == public_key) {
            return Err(anyhow!("alias lookup failed"));
        }
        Ok(format!("alias-{}", public_key))
    }

    async fn resolve_avatar(&self, public_key: &str) -> Result<String> {
        if self.broken.iter().any(|k| k == public_key) {
            return Err(anyhow!("avatar lookup failed"));
        }
        Ok(format!("<svg {}>", public_key))
    }
}
