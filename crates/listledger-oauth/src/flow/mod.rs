//! `OAuth2` authorization flow.

mod code;
mod loopback;
mod pkce;

pub use code::{AuthPhase, LoginFlow, PendingLogin};
pub use loopback::{CallbackParams, await_callback};
pub use pkce::{PkceChallenge, generate_state};

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{Token, TokenResponse, parse_error_body};

/// Common `OAuth2` client configuration.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from the provider's app registration.
    pub client_id: String,
    /// Redirect URI registered for the client (loopback for this app).
    pub redirect_uri: String,
    /// Provider configuration.
    pub provider: Provider,
    /// HTTP client.
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        provider: Provider,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            provider,
            http_client: reqwest::Client::new(),
        }
    }

    /// Exchanges an authorization code plus PKCE verifier for tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the response carries no
    /// usable `access_token`.
    pub(crate) async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Token> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &body));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        let access_token = parsed.access_token.trim().to_string();
        if access_token.is_empty() {
            return Err(Error::InvalidResponse(
                "exchange response carried no access_token".into(),
            ));
        }
        Ok(Token {
            access_token,
            refresh_token: parsed
                .refresh_token
                .map(|t| t.trim().to_string())
                .unwrap_or_default(),
        })
    }
}
