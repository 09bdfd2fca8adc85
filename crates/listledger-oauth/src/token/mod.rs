//! `OAuth2` token types and lifecycle management.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::store::KeyValueStore;

/// Key-value store key for the persisted access token.
pub const KEY_ACCESS_TOKEN: &str = "access_token";

/// Key-value store key for the persisted refresh token.
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";

/// An access/refresh token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Access token string.
    pub access_token: String,
    /// Refresh token for obtaining new access tokens (may be empty).
    pub refresh_token: String,
}

/// Token response from the `OAuth2` server.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    #[serde(default)]
    pub access_token: String,
    /// Refresh token (absent means the prior one stays valid).
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Error response from the `OAuth2` server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Converts to an [`Error`].
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::oauth_error(self.error, self.error_description)
    }
}

#[derive(Clone)]
struct TokenPair {
    access: String,
    refresh: String,
}

/// Holds the current token pair, persists it through the injected
/// key-value store, and serializes refresh attempts.
///
/// Refresh is idempotent under races: callers hand back the token that
/// just failed, and if it no longer matches the cached one another
/// caller already refreshed, so the cached token is returned without a
/// network call. At most one token-endpoint request is in flight per
/// stale-token generation.
pub struct TokenStore {
    client_id: String,
    token_url: Url,
    http_client: reqwest::Client,
    store: Arc<dyn KeyValueStore>,
    tokens: RwLock<TokenPair>,
    refresh_gate: Mutex<()>,
}

impl TokenStore {
    /// Creates a store seeded from configuration values. Tokens already
    /// persisted in `store` supersede the seeds, so a process restart
    /// never re-triggers login.
    pub fn new(
        client_id: impl Into<String>,
        token_url: Url,
        store: Arc<dyn KeyValueStore>,
        seed_access: &str,
        seed_refresh: &str,
    ) -> Self {
        let access = store
            .get(KEY_ACCESS_TOKEN)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| seed_access.to_string());
        let refresh = store
            .get(KEY_REFRESH_TOKEN)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| seed_refresh.to_string());

        Self {
            client_id: client_id.into(),
            token_url,
            http_client: reqwest::Client::new(),
            store,
            tokens: RwLock::new(TokenPair { access, refresh }),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Non-blocking read of the cached access token.
    #[must_use]
    pub fn current_access_token(&self) -> String {
        self.tokens
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .access
            .clone()
    }

    /// Whether any non-blank access token is available.
    #[must_use]
    pub fn has_access_token(&self) -> bool {
        !self.current_access_token().trim().is_empty()
    }

    /// Atomically replaces both tokens and writes them through to the
    /// key-value store. Shared by refresh and the authorization-code
    /// exchange path.
    ///
    /// # Errors
    ///
    /// Returns an error if the write-through fails.
    pub fn store_tokens(&self, access: &str, refresh: &str) -> Result<()> {
        {
            let mut tokens = self
                .tokens
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            tokens.access = access.to_string();
            tokens.refresh = refresh.to_string();
        }
        self.store.set(KEY_ACCESS_TOKEN, access)?;
        self.store.set(KEY_REFRESH_TOKEN, refresh)?;
        Ok(())
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// `used_token` is the access token the caller saw fail (typically
    /// with a 401). Concurrent callers are serialized; late arrivals for
    /// an already-replaced token get the current one back without a
    /// network call.
    ///
    /// # Errors
    ///
    /// Fails without mutating state when no refresh token or client id is
    /// configured, or when the token endpoint rejects the request or
    /// returns no usable `access_token`.
    pub async fn refresh(&self, used_token: &str) -> Result<String> {
        let _gate = self.refresh_gate.lock().await;

        let snapshot = self
            .tokens
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        if used_token != snapshot.access {
            debug!("token already refreshed by a concurrent caller");
            return Ok(snapshot.access);
        }
        if snapshot.refresh.trim().is_empty() {
            return Err(Error::NoRefreshToken);
        }
        if self.client_id.trim().is_empty() {
            return Err(Error::InvalidConfig("client_id is not set".into()));
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", snapshot.refresh.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        let response = self
            .http_client
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, "token refresh rejected");
            return Err(parse_error_body(status.as_u16(), &body));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        let access = parsed.access_token.trim().to_string();
        if access.is_empty() {
            return Err(Error::InvalidResponse(
                "refresh response carried no access_token".into(),
            ));
        }
        let refresh = parsed
            .refresh_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or(snapshot.refresh);

        self.store_tokens(&access, &refresh)?;
        debug!("access token refreshed");
        Ok(access)
    }
}

/// Maps a non-2xx token-endpoint body to an [`Error`], preferring the
/// structured `OAuth2` error shape when the body parses as one.
pub(crate) fn parse_error_body(status: u16, body: &str) -> Error {
    serde_json::from_str::<ErrorResponse>(body).map_or_else(
        |_| Error::oauth_error(format!("http_{status}"), body.chars().take(300).collect::<String>()),
        ErrorResponse::into_error,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP fixture that answers every POST with `body` and
    /// counts the requests it served.
    async fn spawn_token_endpoint(
        body: &'static str,
        status_line: &'static str,
        hits: Arc<AtomicUsize>,
    ) -> Url {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = vec![0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        Url::parse(&format!("http://{addr}/token")).unwrap()
    }

    fn store_with(access: &str, refresh: &str) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY_ACCESS_TOKEN, access).unwrap();
        store.set(KEY_REFRESH_TOKEN, refresh).unwrap();
        store
    }

    #[tokio::test]
    async fn test_refresh_replaces_and_persists_tokens() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = spawn_token_endpoint(
            r#"{"access_token":"new-access","refresh_token":"new-refresh"}"#,
            "HTTP/1.1 200 OK",
            Arc::clone(&hits),
        )
        .await;
        let store = store_with("stale", "r1");
        let tokens = TokenStore::new("client", url, store.clone(), "", "");

        let fresh = tokens.refresh("stale").await.unwrap();

        assert_eq!(fresh, "new-access");
        assert_eq!(tokens.current_access_token(), "new-access");
        assert_eq!(store.get(KEY_ACCESS_TOKEN).as_deref(), Some("new-access"));
        assert_eq!(store.get(KEY_REFRESH_TOKEN).as_deref(), Some("new-refresh"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_keeps_prior_refresh_token_when_absent() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = spawn_token_endpoint(
            r#"{"access_token":"new-access"}"#,
            "HTTP/1.1 200 OK",
            Arc::clone(&hits),
        )
        .await;
        let store = store_with("stale", "keep-me");
        let tokens = TokenStore::new("client", url, store.clone(), "", "");

        tokens.refresh("stale").await.unwrap();

        assert_eq!(store.get(KEY_REFRESH_TOKEN).as_deref(), Some("keep-me"));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_single_flight() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = spawn_token_endpoint(
            r#"{"access_token":"new-access","refresh_token":"new-refresh"}"#,
            "HTTP/1.1 200 OK",
            Arc::clone(&hits),
        )
        .await;
        let tokens = Arc::new(TokenStore::new(
            "client",
            url,
            store_with("stale", "r1"),
            "",
            "",
        ));

        let a = tokio::spawn({
            let tokens = Arc::clone(&tokens);
            async move { tokens.refresh("stale").await }
        });
        let b = tokio::spawn({
            let tokens = Arc::clone(&tokens);
            async move { tokens.refresh("stale").await }
        });

        let first = a.await.unwrap().unwrap();
        let second = b.await.unwrap().unwrap();

        assert_eq!(first, "new-access");
        assert_eq!(second, "new-access");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_leaves_state_untouched() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = spawn_token_endpoint(
            r#"{"error":"invalid_grant","error_description":"revoked"}"#,
            "HTTP/1.1 400 Bad Request",
            Arc::clone(&hits),
        )
        .await;
        let store = store_with("stale", "r1");
        let tokens = TokenStore::new("client", url, store.clone(), "", "");

        let result = tokens.refresh("stale").await;

        assert!(matches!(result, Err(Error::OAuth { .. })));
        assert_eq!(tokens.current_access_token(), "stale");
        assert_eq!(store.get(KEY_REFRESH_TOKEN).as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails_fast() {
        let url = Url::parse("http://127.0.0.1:9/token").unwrap();
        let tokens = TokenStore::new("client", url, Arc::new(MemoryStore::new()), "seed", "");

        let result = tokens.refresh("seed").await;
        assert!(matches!(result, Err(Error::NoRefreshToken)));
    }

    #[tokio::test]
    async fn test_persisted_tokens_supersede_config_seeds() {
        let url = Url::parse("http://127.0.0.1:9/token").unwrap();
        let store = store_with("persisted-access", "persisted-refresh");
        let tokens = TokenStore::new("client", url, store, "seed-access", "seed-refresh");

        assert_eq!(tokens.current_access_token(), "persisted-access");
    }
}
