use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{RawMessageRecord, RelayAddress, RelayNode, RelayStatus, SubmitReply};

#[derive(Serialize)]
struct ConnectRequest<'a> {
    addrs: &'a [RelayAddress],
}

#[derive(Serialize)]
struct SendRequest<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Deserialize)]
struct ConnectResponse {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct PublicKeyResponse {
    public_key: String,
}

/// Talks to the local node daemon's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRelayNode {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRelayNode {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RelayNode for HttpRelayNode {
    async fn connection_status(&self) -> Result<RelayStatus> {
        let response: StatusResponse = self
            .client
            .get(self.endpoint("/status"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(RelayStatus::from_report(&response.status))
    }

    async fn connect(&self, addresses: &[RelayAddress]) -> Result<()> {
        let response: ConnectResponse = self
            .client
            .post(self.endpoint("/connect"))
            .json(&ConnectRequest { addrs: addresses })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.error {
            Some(err) if !err.is_empty() => anyhow::bail!("node refused connect: {}", err),
            _ => Ok(()),
        }
    }

    async fn fetch_message_page(&self, anchor: DateTime<Utc>) -> Result<Vec<RawMessageRecord>> {
        let records = self
            .client
            .get(self.endpoint("/messages"))
            .query(&[("before", anchor.timestamp_millis())])
            .send()
            .await?
            .error_for_status()?
            .json::<Option<Vec<RawMessageRecord>>>()
            .await
            .context("decoding message page")?;
        Ok(records.unwrap_or_default())
    }

    async fn submit(&self, content: &str) -> Result<SubmitReply> {
        let reply: SubmitReply = self
            .client
            .post(self.endpoint("/send"))
            .json(&SendRequest { content })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding send reply")?;
        Ok(reply)
    }

    async fn public_key(&self) -> Result<String> {
        let response: PublicKeyResponse = self
            .client
            .get(self.endpoint("/pubkey"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.public_key)
    }
}
