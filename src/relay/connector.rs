use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{RelayAddress, RelayNode};
use crate::error::RelayError;

pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionResult {
    pub connected: bool,
    pub attempts: u32,
}

impl ConnectionResult {
    pub fn error(&self) -> Option<RelayError> {
        if self.connected {
            None
        } else {
            Some(RelayError::ConnectionExhausted {
                attempts: self.attempts,
            })
        }
    }
}

/// Where a single attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Probe,
    Dial,
    Recheck,
    Backoff,
    Finished { connected: bool },
}

pub struct RelayConnector {
    node: Arc<dyn RelayNode>,
    max_attempts: u32,
    retry_delay: Duration,
    state: ConnectionState,
}

impl RelayConnector {
    pub fn new(node: Arc<dyn RelayNode>) -> Self {
        Self {
            node,
            max_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Drive the connection until the node reports online or the attempt
    /// budget runs out. Status is probed both before and after each dial
    /// since background discovery can bring the node online on its own.
    pub async fn ensure_connected(&mut self, addresses: &[RelayAddress]) -> ConnectionResult {
        self.state = ConnectionState::Connecting;
        info!(addresses = addresses.len(), "connecting to relay");

        let mut attempt: u32 = 0;
        let mut phase = Phase::Probe;

        let connected = loop {
            phase = match phase {
                Phase::Probe => {
                    attempt += 1;
                    if self.is_online().await {
                        Phase::Finished { connected: true }
                    } else {
                        Phase::Dial
                    }
                }
                Phase::Dial => {
                    debug!(attempt, "dialing relay");
                    if let Err(e) = self.node.connect(addresses).await {
                        debug!(attempt, "connect call failed: {:#}", e);
                    }
                    Phase::Recheck
                }
                Phase::Recheck => {
                    if self.is_online().await {
                        Phase::Finished { connected: true }
                    } else if attempt >= self.max_attempts {
                        Phase::Finished { connected: false }
                    } else {
                        Phase::Backoff
                    }
                }
                Phase::Backoff => {
                    tokio::time::sleep(self.retry_delay).await;
                    Phase::Probe
                }
                Phase::Finished { connected } => break connected,
            };
        };

        let result = ConnectionResult {
            connected,
            attempts: attempt,
        };
        match result.error() {
            None => {
                self.state = ConnectionState::Connected;
                info!(attempts = attempt, "relay online");
            }
            Some(err) => {
                self.state = ConnectionState::Failed;
                warn!("{}", err);
            }
        }
        result
    }

    async fn is_online(&self) -> bool {
        match self.node.connection_status().await {
            Ok(status) => status.is_online(),
            Err(e) => {
                debug!("status probe failed: {:#}", e);
                false
            }
        }
    }
}
