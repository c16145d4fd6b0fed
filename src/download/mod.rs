use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::info;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Retrieves remote mod archives and documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` to `dest`, creating parent directories as needed.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;

    /// Fetch `url` as text.
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// [`Fetcher`] backed by [`HttpClient`], bounded by a per-request timeout.
pub struct HttpFetcher {
    runtime: Arc<dyn Runtime>,
    http_client: HttpClient,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(runtime: Arc<dyn Runtime>, http_client: HttpClient, timeout: Duration) -> Self {
        Self {
            runtime,
            http_client,
            timeout,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[tracing::instrument(skip(self, dest))]
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading {}...", url);

        if let Some(parent) = dest.parent() {
            self.runtime.create_dir_all(parent)?;
        }

        let download = self.http_client.download_file(url, || {
            self.runtime
                .create_file(dest)
                .with_context(|| format!("Failed to create download file at {:?}", dest))
        });
        let bytes = tokio::time::timeout(self.timeout, download)
            .await
            .map_err(|_| anyhow!("Download of {} timed out after {:?}", url, self.timeout))??;

        info!("Downloaded {} bytes to {:?}", bytes, dest);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_text(&self, url: &str) -> Result<String> {
        tokio::time::timeout(self.timeout, self.http_client.get_text(url))
            .await
            .map_err(|_| anyhow!("Request to {} timed out after {:?}", url, self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use reqwest::Client;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn http_client() -> HttpClient {
        HttpClient::new(Client::new()).with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_fetch_writes_file() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/codegen.qmod")
            .with_status(200)
            .with_body("archive bytes")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("Temp/Downloads/codegen");
        let fetcher = HttpFetcher::new(Arc::new(RealRuntime), http_client(), Duration::from_secs(10));

        fetcher
            .fetch(&format!("{}/codegen.qmod", server.url()), &dest)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "archive bytes");
    }

    #[tokio::test]
    async fn test_fetch_not_found_creates_no_file() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing.qmod")
            .with_status(404)
            .create_async()
            .await;

        // Only the parent directory may be touched
        let mut runtime = MockRuntime::new();
        runtime
            .expect_create_dir_all()
            .with(mockall::predicate::eq(PathBuf::from("/downloads")))
            .returning(|_| Ok(()));

        let fetcher = HttpFetcher::new(Arc::new(runtime), http_client(), Duration::from_secs(10));
        let result = fetcher
            .fetch(
                &format!("{}/missing.qmod", server.url()),
                Path::new("/downloads/missing"),
            )
            .await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/index.json")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(
            Arc::new(MockRuntime::new()),
            http_client(),
            Duration::from_secs(10),
        );
        let text = fetcher
            .fetch_text(&format!("{}/index.json", server.url()))
            .await
            .unwrap();

        assert_eq!(text, "{}");
    }
}
