//! Authorization-code-with-PKCE login flow.
//!
//! Drives `NEEDS_LOGIN → WAITING_CALLBACK → EXCHANGING → READY`, with
//! `BLOCKED(reason)` absorbing any validation or network failure. The
//! state/verifier pair is persisted transiently so the flow survives a
//! process death during the external-browser detour.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use super::loopback::{self, CallbackParams};
use super::pkce::{PkceChallenge, generate_state};
use super::OAuthClient;
use crate::error::{Error, Result};
use crate::store::KeyValueStore;
use crate::token::{Token, TokenStore};

/// Key-value store key for the in-flight CSRF state.
const KEY_OAUTH_STATE: &str = "oauth_state";

/// Key-value store key for the in-flight PKCE verifier.
const KEY_OAUTH_VERIFIER: &str = "oauth_verifier";

/// Where the login flow currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPhase {
    /// No usable credentials; a login must be started.
    NeedsLogin,
    /// Browser opened; waiting for the loopback redirect.
    WaitingCallback,
    /// Callback validated; exchanging the code for tokens.
    Exchanging,
    /// Credentials stored; the client can sync.
    Ready,
    /// Absorbing failure state with a user-facing reason.
    Blocked(String),
}

/// Orchestrates one authorization-code-with-PKCE login.
pub struct LoginFlow {
    client: OAuthClient,
    tokens: Arc<TokenStore>,
    store: Arc<dyn KeyValueStore>,
    scopes: String,
    phase: RwLock<AuthPhase>,
}

/// A login attempt whose authorize URL has been built and whose
/// state/verifier are persisted. Holds the loopback coordinates parsed
/// from the redirect URI.
pub struct PendingLogin<'a> {
    flow: &'a LoginFlow,
    authorize_url: Url,
    host: String,
    port: u16,
    path: String,
}

impl LoginFlow {
    /// Creates a flow. `store` receives the transient state/verifier;
    /// exchanged credentials go through `tokens`.
    pub fn new(
        client: OAuthClient,
        tokens: Arc<TokenStore>,
        store: Arc<dyn KeyValueStore>,
        scopes: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            store,
            scopes: scopes.into(),
            phase: RwLock::new(AuthPhase::NeedsLogin),
        }
    }

    /// Current phase of the flow.
    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        self.phase
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn set_phase(&self, phase: AuthPhase) {
        *self
            .phase
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = phase;
    }

    fn block(&self, reason: impl Into<String>) -> String {
        let reason = reason.into();
        warn!(%reason, "login flow blocked");
        self.set_phase(AuthPhase::Blocked(reason.clone()));
        reason
    }

    /// Starts a login attempt: validates the redirect URI, generates and
    /// persists state/verifier, and builds the authorize URL for the
    /// external browser.
    ///
    /// # Errors
    ///
    /// Returns an error (and enters `Blocked`) when the redirect URI is
    /// not a loopback URI or the transient state cannot be persisted.
    pub fn begin(&self) -> Result<PendingLogin<'_>> {
        let (host, port, path) = match parse_loopback_redirect(&self.client.redirect_uri) {
            Ok(parts) => parts,
            Err(e) => {
                self.block(e.to_string());
                return Err(e);
            }
        };

        let state = generate_state();
        let pkce = PkceChallenge::generate();
        self.store.set(KEY_OAUTH_STATE, &state)?;
        self.store.set(KEY_OAUTH_VERIFIER, pkce.verifier())?;

        let mut authorize_url = self.client.provider.auth_url.clone();
        authorize_url
            .query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client.client_id)
            .append_pair("redirect_uri", &self.client.redirect_uri)
            .append_pair("scope", &self.scopes)
            .append_pair("state", &state)
            .append_pair("code_challenge", pkce.challenge())
            .append_pair("code_challenge_method", pkce.method());

        info!(host, port, path, "login attempt started");
        self.set_phase(AuthPhase::WaitingCallback);
        Ok(PendingLogin {
            flow: self,
            authorize_url,
            host,
            port,
            path,
        })
    }

    /// Validates a callback payload and exchanges the code for tokens.
    ///
    /// The payload may come from the loopback listener or from an
    /// externally delivered deep link; both converge here. The expected
    /// state and verifier are read back from the key-value store, so the
    /// exchange also works after a process restart mid-flow.
    ///
    /// # Errors
    ///
    /// Any validation or exchange failure transitions to `Blocked` and is
    /// returned; the token endpoint is never called on a state mismatch.
    pub async fn complete(&self, callback: CallbackParams) -> Result<Token> {
        if let Some(error) = callback.error.filter(|e| !e.is_empty()) {
            self.block(format!("authorization server reported: {error}"));
            return Err(Error::oauth_error(error, "reported in callback"));
        }

        let expected_state = self.store.get(KEY_OAUTH_STATE).unwrap_or_default();
        let verifier = self.store.get(KEY_OAUTH_VERIFIER).unwrap_or_default();
        if callback.code.trim().is_empty() || verifier.is_empty() {
            let reason = self.block("callback carried no authorization code");
            return Err(Error::CallbackRejected(reason));
        }
        if callback.state.is_empty()
            || expected_state.is_empty()
            || callback.state != expected_state
        {
            self.block("callback state did not match this login attempt");
            return Err(Error::StateMismatch);
        }

        self.set_phase(AuthPhase::Exchanging);
        let token = match self.client.exchange_code(&callback.code, &verifier).await {
            Ok(token) => token,
            Err(e) => {
                self.block(format!("token exchange failed: {e}"));
                return Err(e);
            }
        };

        self.tokens
            .store_tokens(&token.access_token, &token.refresh_token)?;
        self.store.remove(KEY_OAUTH_STATE)?;
        self.store.remove(KEY_OAUTH_VERIFIER)?;
        info!("login complete, credentials stored");
        self.set_phase(AuthPhase::Ready);
        Ok(token)
    }
}

impl PendingLogin<'_> {
    /// The URL to open in the external browser.
    #[must_use]
    pub const fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    /// Awaits the loopback redirect and completes the exchange.
    ///
    /// Dropping this future closes the listener, freeing the port for a
    /// subsequent attempt.
    ///
    /// # Errors
    ///
    /// Propagates listener and validation/exchange failures; the flow
    /// transitions to `Blocked` on any of them.
    pub async fn await_callback(self, timeout: Duration) -> Result<Token> {
        let callback =
            match loopback::await_callback(&self.host, self.port, &self.path, timeout).await {
                Ok(callback) => callback,
                Err(e) => {
                    self.flow.block(format!("loopback callback failed: {e}"));
                    return Err(e);
                }
            };
        self.flow.complete(callback).await
    }
}

/// Splits a configured redirect URI into loopback coordinates.
///
/// # Errors
///
/// Returns a configuration error unless the URI is `http`, the host is
/// `127.0.0.1` or `localhost`, and an explicit port is present.
fn parse_loopback_redirect(redirect_uri: &str) -> Result<(String, u16, String)> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| Error::InvalidConfig(format!("redirect URI is not a valid URL: {e}")))?;
    let host = url.host_str().unwrap_or_default().to_string();
    let is_loopback = url.scheme() == "http" && (host == "127.0.0.1" || host == "localhost");
    let Some(port) = url.port() else {
        return Err(Error::InvalidConfig(
            "redirect URI must carry an explicit port, e.g. http://127.0.0.1:8976/callback".into(),
        ));
    };
    if !is_loopback {
        return Err(Error::InvalidConfig(
            "redirect URI must be a loopback http URI (127.0.0.1 or localhost)".into(),
        ));
    }
    let path = if url.path().is_empty() {
        "/".to_string()
    } else {
        url.path().to_string()
    };
    Ok((host, port, path))
}
