use std::sync::Arc;

use listledger_oauth::TokenStore;
use url::Url;

use super::{classify_http_failure, FeedPage, ListFeed};
use crate::error::{Error, Result};

/// Expansions requested on every page so authors and media arrive inline.
const EXPANSIONS: &str = "author_id,attachments.media_keys";
const TWEET_FIELDS: &str = "created_at,text,attachments,author_id";
const USER_FIELDS: &str = "name,username";
const MEDIA_FIELDS: &str = "media_key,type,url,preview_image_url";

/// Hard cap on request attempts for one page, including the retry that
/// follows a token refresh.
const MAX_ATTEMPTS: u32 = 2;

/// Authenticated HTTP client for the paginated list endpoint.
///
/// A `401` triggers one single-flight token refresh through the shared
/// [`TokenStore`] followed by one retry with the replacement token;
/// a second `401` surfaces as [`Error::AuthRequired`].
pub struct FeedClient {
    base_url: Url,
    http: reqwest::Client,
    tokens: Arc<TokenStore>,
}

impl FeedClient {
    /// Creates a client against `base_url` (trailing slash expected, e.g.
    /// `https://api.x.com/`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `base_url` does not parse.
    pub fn new(base_url: &str, tokens: Arc<TokenStore>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid API base URL {base_url:?}: {e}")))?;
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
            tokens,
        })
    }

    fn page_url(
        &self,
        list_id: &str,
        page_size: u32,
        pagination_token: Option<&str>,
    ) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("2/lists/{list_id}/tweets"))
            .map_err(|e| Error::Config(format!("invalid list id {list_id:?}: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("max_results", &page_size.to_string())
                .append_pair("expansions", EXPANSIONS)
                .append_pair("tweet.fields", TWEET_FIELDS)
                .append_pair("user.fields", USER_FIELDS)
                .append_pair("media.fields", MEDIA_FIELDS);
            if let Some(token) = pagination_token {
                query.append_pair("pagination_token", token);
            }
        }
        Ok(url)
    }

    async fn fetch_once(&self, url: Url, access_token: &str) -> Result<reqwest::Response> {
        Ok(self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?)
    }
}

impl ListFeed for FeedClient {
    async fn fetch_page(
        &self,
        list_id: &str,
        page_size: u32,
        pagination_token: Option<&str>,
    ) -> Result<FeedPage> {
        let url = self.page_url(list_id, page_size, pagination_token)?;
        let mut access_token = self.tokens.current_access_token();
        if access_token.trim().is_empty() {
            return Err(Error::AuthRequired("no access token; log in first".into()));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = self.fetch_once(url.clone(), &access_token).await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response.json::<FeedPage>().await?);
            }

            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 && attempt < MAX_ATTEMPTS {
                tracing::debug!(attempt, "feed request rejected, refreshing token");
                access_token = self.tokens.refresh(&access_token).await?;
                continue;
            }
            if let Some(message) = classify_http_failure(status.as_u16(), &body) {
                return Err(Error::AuthRequired(message));
            }
            tracing::warn!(%status, body = %body, "feed page request failed");
            return Err(Error::Feed(format!("feed request failed with {status}")));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use listledger_oauth::{MemoryStore, TokenStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::feed::ListFeed;

    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    async fn write_response(stream: &mut tokio::net::TcpStream, status: &str, body: &str) {
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
    }

    fn store_at(token_url: &str, access: &str, refresh: &str) -> Arc<TokenStore> {
        Arc::new(TokenStore::new(
            "client-1",
            Url::parse(token_url).unwrap(),
            Arc::new(MemoryStore::new()),
            access,
            refresh,
        ))
    }

    #[tokio::test]
    async fn test_fetch_page_sends_bearer_and_params() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            write_response(&mut stream, "200 OK", r"{}").await;
            request
        });

        let client = FeedClient::new(
            &format!("http://{addr}/"),
            store_at("http://127.0.0.1:1/token", "tok-a", ""),
        )
        .unwrap();
        let page = client.fetch_page("42", 50, Some("cursor-1")).await.unwrap();
        assert!(page.data.is_none());

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /2/lists/42/tweets?"));
        assert!(request.contains("max_results=50"));
        assert!(request.contains("pagination_token=cursor-1"));
        assert!(request.contains("expansions=author_id%2Cattachments.media_keys"));
        // Header names go out lowercase.
        assert!(request.to_lowercase().contains("authorization: bearer tok-a"));
    }

    #[tokio::test]
    async fn test_401_refreshes_once_and_retries() {
        // Feed endpoint: first request 401, second succeeds.
        let feed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let feed_addr = feed.local_addr().unwrap();
        let feed_task = tokio::spawn(async move {
            let (mut stream, _) = feed.accept().await.unwrap();
            let first = read_request(&mut stream).await;
            write_response(&mut stream, "401 Unauthorized", r#"{"title":"Unauthorized"}"#).await;
            let (mut stream, _) = feed.accept().await.unwrap();
            let second = read_request(&mut stream).await;
            write_response(&mut stream, "200 OK", r#"{"data":[]}"#).await;
            (first, second)
        });

        // Token endpoint: serves exactly one refresh.
        let token = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let token_addr = token.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = token.accept().await.unwrap();
            let _ = read_request(&mut stream).await;
            write_response(
                &mut stream,
                "200 OK",
                r#"{"access_token":"tok-b","refresh_token":"ref-b"}"#,
            )
            .await;
        });

        let tokens = store_at(&format!("http://{token_addr}/token"), "tok-a", "ref-a");
        let client = FeedClient::new(&format!("http://{feed_addr}/"), tokens.clone()).unwrap();
        client.fetch_page("42", 25, None).await.unwrap();

        let (first, second) = feed_task.await.unwrap();
        assert!(first.contains("Bearer tok-a"));
        assert!(second.contains("Bearer tok-b"));
        assert_eq!(tokens.current_access_token(), "tok-b");
    }

    #[tokio::test]
    async fn test_second_401_surfaces_auth_required() {
        let feed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let feed_addr = feed.local_addr().unwrap();
        tokio::spawn(async move {
            for _ in 0..2 {
                let (mut stream, _) = feed.accept().await.unwrap();
                let _ = read_request(&mut stream).await;
                write_response(&mut stream, "401 Unauthorized", "{}").await;
            }
        });
        let token = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let token_addr = token.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = token.accept().await.unwrap();
            let _ = read_request(&mut stream).await;
            write_response(
                &mut stream,
                "200 OK",
                r#"{"access_token":"tok-b","refresh_token":"ref-b"}"#,
            )
            .await;
        });

        let tokens = store_at(&format!("http://{token_addr}/token"), "tok-a", "ref-a");
        let client = FeedClient::new(&format!("http://{feed_addr}/"), tokens).unwrap();
        let err = client.fetch_page("42", 25, None).await.unwrap_err();
        assert!(matches!(err, Error::AuthRequired(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_transient_not_auth_or_config() {
        let feed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let feed_addr = feed.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = feed.accept().await.unwrap();
            let _ = read_request(&mut stream).await;
            write_response(&mut stream, "500 Internal Server Error", "oops").await;
        });

        let client = FeedClient::new(
            &format!("http://{feed_addr}/"),
            store_at("http://127.0.0.1:1/token", "tok-a", "ref-a"),
        )
        .unwrap();
        let err = client.fetch_page("42", 25, None).await.unwrap_err();
        assert!(matches!(err, Error::Feed(_)));
    }

    #[tokio::test]
    async fn test_missing_access_token_fails_fast() {
        let client = FeedClient::new(
            "http://127.0.0.1:1/",
            store_at("http://127.0.0.1:1/token", "", ""),
        )
        .unwrap();
        let err = client.fetch_page("42", 25, None).await.unwrap_err();
        assert!(matches!(err, Error::AuthRequired(_)));
    }
}
