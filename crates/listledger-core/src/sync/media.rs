//! Best-effort download of photo attachments.

use std::path::{Path, PathBuf};

/// Abstract media fetch capability so the sync engine can be exercised
/// without touching the network.
pub trait MediaDownloader {
    /// Downloads `url` into the cache and returns the local path, or
    /// `None` when the download fails. Failures never abort a sync.
    fn download(
        &self,
        url: &str,
        post_id: &str,
        media_key: &str,
    ) -> impl std::future::Future<Output = Option<String>> + Send;
}

/// Downloads photos over HTTP into a flat cache directory.
///
/// Cached files are named `{post_id}_{media_key}.jpg` so retention can
/// reconcile files back to database rows by path alone.
pub struct HttpFetcher {
    http: reqwest::Client,
    media_dir: PathBuf,
}

impl HttpFetcher {
    /// Creates a fetcher that writes into `media_dir`.
    #[must_use]
    pub fn new(media_dir: &Path) -> Self {
        Self {
            http: reqwest::Client::new(),
            media_dir: media_dir.to_path_buf(),
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, crate::Error> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl MediaDownloader for HttpFetcher {
    async fn download(&self, url: &str, post_id: &str, media_key: &str) -> Option<String> {
        let target = self.media_dir.join(format!("{post_id}_{media_key}.jpg"));
        if target.exists() {
            return Some(target.to_string_lossy().into_owned());
        }

        let bytes = match self.fetch_bytes(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(url, error = %e, "media download failed");
                return None;
            }
        };
        if let Err(e) = std::fs::create_dir_all(&self.media_dir) {
            tracing::warn!(dir = %self.media_dir.display(), error = %e, "cannot create media cache");
            return None;
        }
        if let Err(e) = std::fs::write(&target, bytes) {
            tracing::warn!(path = %target.display(), error = %e, "cannot write cached media");
            return None;
        }
        Some(target.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_download_writes_named_file() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = stream.read(&mut buf).await.unwrap();
            stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nJPEG",
                )
                .await
                .unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(dir.path());
        let path = fetcher
            .download(&format!("http://{addr}/img.jpg"), "42", "3_1")
            .await
            .unwrap();

        assert!(path.ends_with("42_3_1.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"JPEG");
    }

    #[tokio::test]
    async fn test_existing_file_is_reused_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("42_3_1.jpg");
        std::fs::write(&cached, b"old").unwrap();

        // Unroutable URL: the fetcher must not need it.
        let fetcher = HttpFetcher::new(dir.path());
        let path = fetcher
            .download("http://127.0.0.1:1/img.jpg", "42", "3_1")
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_failed_download_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(dir.path());
        assert!(
            fetcher
                .download("http://127.0.0.1:1/img.jpg", "42", "3_1")
                .await
                .is_none()
        );
    }
}
