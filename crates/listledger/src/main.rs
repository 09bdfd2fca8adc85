//! `listledger` - mirrors one curated X list into a local `SQLite` timeline.
//!
//! One invocation runs a single sync pass: authenticate if needed, fetch
//! the delta, persist it, enforce retention, and print the newest posts.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::DateTime;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use listledger_core::{
    AppConfig, FeedClient, HttpFetcher, RetentionPolicy, SyncEngine, TimelineRepository,
};
use listledger_oauth::{JsonFileStore, KeyValueStore, LoginFlow, OAuthClient, Provider, TokenStore};

/// How long the loopback listener waits for the browser redirect.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(180);

/// Posts shown after a sync pass.
const PREVIEW_ROWS: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "listledger=info,listledger_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load(&config_path()?)?;
    let data_dir = data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("cannot create data dir {}", data_dir.display()))?;
    let media_dir = data_dir.join("media");

    let state: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&data_dir.join("state.json"))?);
    let provider = Provider::x()?;
    let tokens = Arc::new(TokenStore::new(
        config.client_id.as_str(),
        provider.token_url.clone(),
        state.clone(),
        &config.access_token,
        &config.refresh_token,
    ));

    if !tokens.has_access_token() && !config.offline_mode {
        if !config.can_start_login() {
            bail!("no access token and no client_id/redirect URI to start a login");
        }
        login(&config, provider, tokens.clone(), state.clone()).await?;
    }

    let repo = TimelineRepository::open(&data_dir.join("timeline.db")).await?;
    let engine = SyncEngine::new(
        FeedClient::new(&config.api_base_url, tokens.clone())?,
        HttpFetcher::new(&media_dir),
        repo.clone(),
        RetentionPolicy::new(&media_dir),
        config.list_id.clone(),
        config.max_results,
        config.offline_mode,
    );

    match engine.sync().await {
        Ok(written) => info!(written, "sync finished"),
        Err(e) => {
            // Without any local data the failure leaves nothing to show.
            if repo.post_count().await? == 0 {
                return Err(e).context("sync failed before any post was stored");
            }
            warn!(error = %e, "sync failed, showing cached timeline");
        }
    }

    print_timeline(&repo).await?;
    Ok(())
}

/// Runs the browser-based login and waits for the loopback redirect.
async fn login(
    config: &AppConfig,
    provider: Provider,
    tokens: Arc<TokenStore>,
    state: Arc<dyn KeyValueStore>,
) -> anyhow::Result<()> {
    let client = OAuthClient::new(
        config.client_id.as_str(),
        config.auth_redirect_uri.as_str(),
        provider,
    );
    let flow = LoginFlow::new(client, tokens, state, config.auth_scopes.as_str());
    let pending = flow.begin()?;

    let url = pending.authorize_url().to_string();
    println!("Complete the login in your browser:\n  {url}");
    if let Err(e) = opener::open_browser(&url) {
        warn!(error = %e, "cannot open browser, visit the URL manually");
    }

    pending
        .await_callback(CALLBACK_TIMEOUT)
        .await
        .context("login did not complete")?;
    info!("login complete");
    Ok(())
}

async fn print_timeline(repo: &TimelineRepository) -> anyhow::Result<()> {
    let posts = repo.timeline().await?;
    println!("{} post(s) in the local timeline", posts.len());
    for entry in posts.iter().take(PREVIEW_ROWS) {
        let when = DateTime::from_timestamp_millis(entry.post.created_at)
            .map_or_else(|| "unknown time".to_string(), |dt| dt.to_rfc3339());
        let text = entry.post.text.replace('\n', " ");
        println!("  @{} [{when}] {text}", entry.post.author_handle);
    }
    Ok(())
}

/// Configuration path: first CLI argument, or the user config directory.
fn config_path() -> anyhow::Result<PathBuf> {
    if let Some(arg) = std::env::args().nth(1) {
        return Ok(PathBuf::from(arg));
    }
    dirs::config_dir()
        .map(|dir| dir.join("listledger").join("config.json"))
        .context("cannot determine the user config directory")
}

fn data_dir() -> anyhow::Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("listledger"))
        .context("cannot determine the user data directory")
}
