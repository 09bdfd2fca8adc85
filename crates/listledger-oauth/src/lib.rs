//! # listledger-oauth
//!
//! `OAuth2` authentication for the listledger timeline client.
//!
//! ## Features
//!
//! - **Authorization Code Flow with PKCE** for a single-user desktop-class
//!   client, including the loopback HTTP listener that receives the
//!   browser redirect
//! - **Token management**: persisted access/refresh token pair with
//!   single-flight refresh under concurrent callers
//! - **Injected persistence**: a small key-value store abstraction so no
//!   credential state lives in hidden globals
//!
//! ## Quick Start
//!
//! ```ignore
//! use listledger_oauth::{JsonFileStore, LoginFlow, OAuthClient, Provider, TokenStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(JsonFileStore::open("auth.json".as_ref())?);
//!     let provider = Provider::x()?;
//!     let tokens = Arc::new(TokenStore::new(
//!         "your_client_id",
//!         provider.token_url.clone(),
//!         store.clone(),
//!         "",
//!         "",
//!     ));
//!     let client = OAuthClient::new(
//!         "your_client_id",
//!         "http://127.0.0.1:8976/callback",
//!         provider,
//!     );
//!     let flow = LoginFlow::new(client, tokens, store, "tweet.read list.read offline.access");
//!
//!     let pending = flow.begin()?;
//!     opener::open(pending.authorize_url().as_str())?;
//!     let token = pending.await_callback(Duration::from_secs(180)).await?;
//!     println!("Access token: {}", token.access_token);
//!     Ok(())
//! }
//! ```
//!
//! ## Token Refresh
//!
//! ```ignore
//! // After a 401, hand the token that failed back to the store; only one
//! // network refresh happens per stale generation.
//! let fresh = token_store.refresh(&stale_token).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod store;
pub mod token;

pub use error::{Error, Result};
pub use flow::{AuthPhase, CallbackParams, LoginFlow, OAuthClient, PendingLogin, PkceChallenge};
pub use provider::Provider;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use token::{Token, TokenStore};
