use thiserror::Error;

/// Failures the client recovers from locally. None of these propagate out of
/// the sync core; they are logged and turned into in-band results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("relay directory unavailable: {0}")]
    AddressUnavailable(String),

    #[error("could not connect to relay after {attempts} attempts")]
    ConnectionExhausted { attempts: u32 },

    #[error("message page fetch failed: {0}")]
    FetchFailed(String),

    #[error("acknowledgment matched no known outcome: {0:?}")]
    SendAmbiguous(String),
}

impl RelayError {
    pub fn address_unavailable(err: &anyhow::Error) -> Self {
        Self::AddressUnavailable(format!("{:#}", err))
    }

    pub fn fetch_failed(err: &anyhow::Error) -> Self {
        Self::FetchFailed(format!("{:#}", err))
    }
}
