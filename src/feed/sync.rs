use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Acknowledgment, FeedHandle, Message, MessageCache, MessageStatus};
use crate::error::RelayError;
use crate::relay::{
    short_key, Identity, IdentityResolver, RawMessageRecord, RelayNode, SubmitReply,
};

/// Sole writer of the message cache.
pub struct MessageSyncEngine {
    node: Arc<dyn RelayNode>,
    identities: Arc<dyn IdentityResolver>,
    cache: Arc<RwLock<MessageCache>>,
    merge_lock: Mutex<()>,
    community_id: String,
    author: Identity,
}

impl MessageSyncEngine {
    pub fn new(
        node: Arc<dyn RelayNode>,
        identities: Arc<dyn IdentityResolver>,
        author: Identity,
        community_id: impl Into<String>,
    ) -> Self {
        Self {
            node,
            identities,
            cache: Arc::new(RwLock::new(MessageCache::new())),
            merge_lock: Mutex::new(()),
            community_id: community_id.into(),
            author,
        }
    }

    pub fn feed(&self) -> FeedHandle {
        FeedHandle::new(self.cache.clone())
    }

    pub fn community_id(&self) -> &str {
        &self.community_id
    }

    pub fn author(&self) -> &Identity {
        &self.author
    }

    /// One page of messages at `anchor`. A failed fetch hands back what the
    /// cache already holds.
    pub async fn fetch_window(&self, anchor: DateTime<Utc>) -> Vec<Message> {
        let records = match self.node.fetch_message_page(anchor).await {
            Ok(records) => records,
            Err(e) => {
                warn!("{}", RelayError::fetch_failed(&e));
                return self.cache.read().all();
            }
        };

        let mut messages = Vec::with_capacity(records.len());
        for record in records {
            messages.push(self.enrich(record).await);
        }
        debug!(anchor = %anchor, count = messages.len(), "fetched message window");
        messages
    }

    /// Fetch a window and merge it. `replace` clears the cache first (full
    /// reload); otherwise the merge is additive.
    pub async fn fetch_and_merge(&self, anchor: DateTime<Utc>, replace: bool) -> Vec<Message> {
        let _guard = self.merge_lock.lock().await;

        if replace {
            self.cache.write().clear();
        }

        let fetched = self.fetch_window(anchor).await;
        {
            let mut cache = self.cache.write();
            for message in &fetched {
                cache.upsert(message.clone());
            }
        }
        debug!(replace, cached = self.cache.read().len(), "merged message window");
        fetched
    }

    /// Switch the active feed partition and reload it from scratch.
    pub async fn switch_community(&mut self, community_id: &str) -> Vec<Message> {
        info!(from = %self.community_id, to = %community_id, "switching community");
        self.community_id = community_id.to_string();
        self.fetch_and_merge(Utc::now(), true).await
    }

    /// Submit and build the local echo straight from the acknowledgment.
    /// Echoes carrying a signature go into the cache; unsigned ones are only
    /// returned.
    pub async fn send(&self, content: &str) -> Message {
        let (ack_text, certs) = match self.node.submit(content).await {
            Ok(SubmitReply::Ack(text)) => (text, Vec::new()),
            Ok(SubmitReply::Certs(certs)) => (String::new(), certs),
            Err(e) => {
                warn!("send failed: {:#}", e);
                (String::new(), Vec::new())
            }
        };

        let ack = Acknowledgment::parse(&ack_text);
        let message = Message {
            signature: ack.signature.unwrap_or_default(),
            content: content.to_string(),
            author_public_key: self.author.public_key.clone(),
            author_alias: self.author.alias.clone(),
            timestamp: ack
                .timestamp
                .unwrap_or_else(|| Utc::now().timestamp_millis()),
            community_id: self.community_id.clone(),
            status: ack.status,
            moderation_note: certs,
            avatar_svg: self.author.avatar_svg.clone(),
        };
        info!(status = message.status.label(), signature = %message.signature, "message sent");

        if !message.signature.is_empty() {
            let _guard = self.merge_lock.lock().await;
            self.cache.write().upsert(message.clone());
        }
        message
    }

    async fn enrich(&self, record: RawMessageRecord) -> Message {
        let author_alias = match self.identities.resolve_alias(&record.public_key).await {
            Ok(alias) => alias,
            Err(e) => {
                debug!("alias lookup failed for {}: {:#}", record.public_key, e);
                short_key(&record.public_key)
            }
        };
        let avatar_svg = self
            .identities
            .resolve_avatar(&record.public_key)
            .await
            .unwrap_or_default();

        Message {
            signature: record.sign,
            content: record.msg.content,
            author_public_key: record.public_key,
            author_alias,
            timestamp: record.msg.ts,
            community_id: self.community_id.clone(),
            status: MessageStatus::Approved,
            moderation_note: record.mod_certs,
            avatar_svg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::{record, FakeIdentity, FakeNode};
    use crate::relay::ModCert;
    use anyhow::anyhow;

    fn author() -> Identity {
        Identity {
            public_key: "pk-self".into(),
            alias: "me".into(),
            avatar_svg: "<svg me>".into(),
        }
    }

    fn engine(node: FakeNode) -> (MessageSyncEngine, Arc<FakeNode>) {
        let node = Arc::new(node);
        let engine = MessageSyncEngine::new(node.clone(), Arc::new(FakeIdentity::new()), author(), "1");
        (engine, node)
    }

    #[tokio::test]
    async fn window_is_enriched_with_identity() {
        let (engine, _) = engine(FakeNode::new().with_pages(vec![Ok(vec![record("a", 5)])]));

        let window = engine.fetch_window(Utc::now()).await;
        assert_eq!(window.len(), 1);
        let message = &window[0];
        assert_eq!(message.signature, "a");
        assert_eq!(message.author_alias, "alias-pk-a");
        assert_eq!(message.avatar_svg, "<svg pk-a>");
        assert_eq!(message.community_id, "1");
        assert_eq!(message.status, MessageStatus::Approved);
    }

    #[tokio::test]
    async fn identity_failures_fall_back_to_short_key() {
        let node = Arc::new(FakeNode::new().with_pages(vec![Ok(vec![record("b", 1)])]));
        let identities = FakeIdentity { broken: vec!["pk-b".into()] };
        let engine = MessageSyncEngine::new(node, Arc::new(identities), author(), "1");

        let window = engine.fetch_window(Utc::now()).await;
        assert_eq!(window[0].author_alias, "anonpk-b");
        assert!(window[0].avatar_svg.is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_returns_cached_snapshot() {
        let (engine, _) = engine(FakeNode::new().with_pages(vec![
            Ok(vec![record("a", 1), record("b", 2)]),
            Err(anyhow!("relay went away")),
        ]));

        engine.fetch_and_merge(Utc::now(), true).await;
        let fallback = engine.fetch_window(Utc::now()).await;
        assert_eq!(fallback.len(), 2);
        assert_eq!(engine.feed().len(), 2);
    }

    #[tokio::test]
    async fn overlapping_merges_keep_the_union() {
        let (engine, _) = engine(FakeNode::new().with_pages(vec![
            Ok(vec![record("a", 1), record("b", 2), record("c", 3)]),
            Ok(vec![record("b", 2), record("c", 3), record("d", 4)]),
        ]));
        let t = Utc::now();

        engine.fetch_and_merge(t, true).await;
        engine.fetch_and_merge(t, false).await;
        assert_eq!(engine.feed().len(), 4);
    }

    #[tokio::test]
    async fn replace_drops_previous_contents() {
        let (mut engine, _) = engine(FakeNode::new().with_pages(vec![
            Ok(vec![record("a", 1), record("b", 2)]),
            Ok(vec![record("z", 9)]),
        ]));

        engine.fetch_and_merge(Utc::now(), false).await;
        engine.switch_community("2").await;

        let snapshot = engine.feed().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].signature, "z");
        assert_eq!(snapshot[0].community_id, "2");
    }

    #[tokio::test]
    async fn reload_with_failing_fetch_leaves_cache_empty() {
        let (engine, _) = engine(FakeNode::new().with_pages(vec![
            Ok(vec![record("a", 1)]),
            Err(anyhow!("down")),
        ]));

        engine.fetch_and_merge(Utc::now(), false).await;
        let fetched = engine.fetch_and_merge(Utc::now(), true).await;
        assert!(fetched.is_empty());
        assert_eq!(engine.feed().len(), 0);
    }

    #[tokio::test]
    async fn send_parses_signature_and_time() {
        let (engine, _) = engine(
            FakeNode::new().with_reply(Ok(SubmitReply::Ack("Sent. Sign: abc123 Time: 999".into()))),
        );

        let message = engine.send("hello").await;
        assert_eq!(message.status, MessageStatus::Approved);
        assert_eq!(message.signature, "abc123");
        assert_eq!(message.timestamp, 999);
        assert_eq!(message.content, "hello");
        assert_eq!(message.author_alias, "me");
        assert_eq!(engine.feed().snapshot(), vec![message]);
    }

    #[tokio::test]
    async fn pending_echo_stays_out_of_cache() {
        let (engine, _) =
            engine(FakeNode::new().with_reply(Ok(SubmitReply::Ack("moderation timeout".into()))));

        let before = Utc::now().timestamp_millis();
        let message = engine.send("hello").await;
        assert_eq!(message.status, MessageStatus::Pending);
        assert!(message.signature.is_empty());
        assert!(message.timestamp >= before);
        assert_eq!(engine.feed().len(), 0);
    }

    #[tokio::test]
    async fn transport_failure_is_a_rejected_echo() {
        let (engine, _) = engine(FakeNode::new().with_reply(Err(anyhow!("connection reset"))));

        let message = engine.send("hello").await;
        assert_eq!(message.status, MessageStatus::Rejected);
    }

    #[tokio::test]
    async fn certificate_reply_is_attached_to_echo() {
        let cert = ModCert {
            sign: "m1".into(),
            public_key: "mod".into(),
            status: "0".into(),
        };
        let (engine, _) =
            engine(FakeNode::new().with_reply(Ok(SubmitReply::Certs(vec![cert.clone()]))));

        let message = engine.send("spam").await;
        assert_eq!(message.status, MessageStatus::Rejected);
        assert_eq!(message.moderation_note, vec![cert]);
    }
}
