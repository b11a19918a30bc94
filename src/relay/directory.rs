use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

use super::RelayDirectory;

/// Relay addresses published as a CSV sheet, first column holding the
/// address. The last good copy is kept on disk for when the sheet is
/// unreachable.
#[derive(Debug, Clone)]
pub struct CsvRelayDirectory {
    url: String,
    cache_path: PathBuf,
}

impl CsvRelayDirectory {
    const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
    const CSV_HEADER: &'static str = "Relay Address";

    pub fn new(url: impl Into<String>) -> Self {
        let cache_dir = dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(|| PathBuf::from(".cache"));

        Self {
            url: url.into(),
            cache_path: cache_dir.join("librx").join("relays.csv"),
        }
    }

    pub fn with_cache_path(mut self, cache_path: impl Into<PathBuf>) -> Self {
        self.cache_path = cache_path.into();
        self
    }

    async fn fetch_from_remote(&self) -> Result<Vec<String>> {
        let client = reqwest::Client::builder()
            .timeout(Self::FETCH_TIMEOUT)
            .build()?;

        let response = client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("fetching relay sheet {}", self.url))?;
        let csv_content = response.text().await?;

        parse_csv(&csv_content)
    }

    async fn load_from_cache(&self) -> Result<Vec<String>> {
        let content = fs::read_to_string(&self.cache_path)
            .await
            .with_context(|| format!("reading {}", self.cache_path.display()))?;
        parse_csv(&content)
    }

    async fn save_to_cache(&self, addresses: &[String]) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([Self::CSV_HEADER])?;
        for address in addresses {
            writer.write_record([address])?;
        }
        let bytes = writer.into_inner().context("flushing relay csv")?;

        fs::write(&self.cache_path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl RelayDirectory for CsvRelayDirectory {
    async fn relay_addresses(&self) -> Result<Vec<String>> {
        match self.fetch_from_remote().await {
            Ok(addresses) => {
                if let Err(e) = self.save_to_cache(&addresses).await {
                    warn!("failed to save relay cache: {:#}", e);
                }
                Ok(addresses)
            }
            Err(remote_err) => {
                warn!("failed to fetch relay sheet: {:#}", remote_err);
                let cached = self.load_from_cache().await.map_err(|_| remote_err)?;
                debug!(count = cached.len(), "using cached relay addresses");
                Ok(cached)
            }
        }
    }
}

fn parse_csv(content: &str) -> Result<Vec<String>> {
    let mut addresses = Vec::new();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    for result in reader.records() {
        let record = result?;
        if let Some(first) = record.get(0) {
            let address = first.trim();
            if !address.is_empty() {
                addresses.push(address.to_string());
            }
        }
    }

    Ok(addresses)
}
