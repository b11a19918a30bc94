use std::sync::Arc;

use tracing::{debug, warn};

use super::{RelayAddress, RelayDirectory};
use crate::error::RelayError;

/// Turns the directory's raw listing into usable relay addresses.
pub struct AddressResolver {
    directory: Arc<dyn RelayDirectory>,
}

impl AddressResolver {
    pub fn new(directory: Arc<dyn RelayDirectory>) -> Self {
        Self { directory }
    }

    /// An empty result means "no known addresses", never a fatal condition.
    pub async fn resolve(&self) -> Vec<RelayAddress> {
        let raw = match self.directory.relay_addresses().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{}", RelayError::address_unavailable(&e));
                return Vec::new();
            }
        };

        let total = raw.len();
        let valid: Vec<RelayAddress> = raw.iter().filter_map(|a| RelayAddress::parse(a)).collect();
        debug!(total, valid = valid.len(), "resolved relay addresses");
        valid
    }
}
