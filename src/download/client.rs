//! HTTP client wrapper for index fetches and file downloads.
//!
//! This module provides the `HttpClient` struct which performs plain GET
//! requests with timeout configuration, status checking and streaming writes.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client for fetching index pages and downloading files.
///
/// This client is designed to be created once and shared by every worker,
/// taking advantage of connection pooling. Cloning is cheap.
///
/// Response bodies are stored exactly as served: transparent content
/// decompression is not enabled, so `.gz` files stay compressed on disk.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes (for large files)
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend or resolver
    /// cannot be initialized.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;
        Ok(Self { client })
    }

    /// Fetches an index page and returns its body as text.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the URL is invalid, the request fails, the
    /// server answers with a non-success status, or the body cannot be read.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_listing(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.send_get(url).await?;
        let body = response
            .text()
            .await
            .map_err(|e| DownloadError::network(url, e))?;
        debug!(bytes = body.len(), "fetched listing");
        Ok(body)
    }

    /// Downloads `url` into the file at `path`, returning the number of bytes written.
    ///
    /// An existing file is overwritten. The file is only created after the
    /// server answered with a success status, and a partially written file is
    /// removed if streaming fails. Parent directories are never created; the
    /// caller must have created them beforehand.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns an error status (4xx, 5xx)
    /// - Creating or writing the file fails
    #[instrument(skip(self), fields(url = %url, path = %path.display()))]
    pub async fn download_file(&self, url: &str, path: &Path) -> Result<u64, DownloadError> {
        let response = self.send_get(url).await?;

        let mut file = File::create(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        let result = stream_to_file(&mut file, response, url, path).await;
        if result.is_err() {
            drop(file);
            debug!("cleaning up partial file after error");
            let _ = tokio::fs::remove_file(path).await;
        }
        result
    }

    async fn send_get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

/// Streams response body to file, returning bytes written.
///
/// This is extracted to enable cleanup on error in the caller.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    // Ensure all data is flushed to disk
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_builds_with_defaults() {
        assert!(HttpClient::new().is_ok());
        assert!(HttpClient::with_timeouts(1, 1).is_ok());
    }

    #[tokio::test]
    async fn test_download_file_rejects_invalid_url() {
        let client = HttpClient::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.txt");

        let result = client.download_file("not a url", &path).await;

        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_fetch_listing_rejects_invalid_url() {
        let client = HttpClient::new().unwrap();
        let result = client.fetch_listing("::::").await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }
}
