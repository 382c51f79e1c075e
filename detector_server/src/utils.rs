//! Utility functions
//!
use std::path::Path;

use anyhow::{Context, Result};
use reqwest::Client;

/// Download a file from a URL to a given filepath.
///
/// The content is written next to the target first and moved in place once complete, so an
/// interrupted download never leaves a truncated file behind.
pub async fn download_file(client: &Client, url: &str, filepath: impl AsRef<Path>) -> Result<()> {
    let filepath = filepath.as_ref();
    log::info!("Downloading {} to {}", url, filepath.display());

    let resp = client
        .get(url)
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .with_context(|| format!("failed to fetch {url}"))?;
    let content = resp.bytes().await?;

    let partial = filepath.with_extension("part");
    tokio::fs::write(&partial, &content)
        .await
        .with_context(|| format!("failed to write {}", partial.display()))?;
    tokio::fs::rename(&partial, filepath).await?;

    Ok(())
}
