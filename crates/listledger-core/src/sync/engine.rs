use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::feed::{FeedPage, ListFeed, RawMedia, RawPost, RawUser};
use crate::timeline::{MediaAttachment, MediaKind, Post, TimelineRepository};

use super::media::MediaDownloader;
use super::order;
use super::retention::RetentionPolicy;

/// Page size for the very first fetch into empty storage, where the goal
/// is to fill the timeline in one request.
const INITIAL_PAGE_SIZE: u32 = 99;

/// Base of every post permalink.
const PERMALINK_BASE: &str = "https://x.com/i/web/status/";

/// Reconciles the remote list against local storage.
///
/// One `sync()` call fetches the pages that can contain unseen posts,
/// maps them to timeline rows with bookmarks carried forward, writes
/// them, and finishes by enforcing retention. Callers serialize their
/// own invocations; overlapping syncs are not supported.
pub struct SyncEngine<F, D> {
    feed: F,
    media: D,
    repo: TimelineRepository,
    retention: RetentionPolicy,
    list_id: String,
    page_size: u32,
    offline: bool,
}

impl<F: ListFeed, D: MediaDownloader> SyncEngine<F, D> {
    /// Wires the engine to its collaborators.
    #[must_use]
    pub fn new(
        feed: F,
        media: D,
        repo: TimelineRepository,
        retention: RetentionPolicy,
        list_id: impl Into<String>,
        page_size: u32,
        offline: bool,
    ) -> Self {
        Self {
            feed,
            media,
            repo,
            retention,
            list_id: list_id.into(),
            page_size,
            offline,
        }
    }

    /// Runs one sync pass and returns the number of posts written.
    ///
    /// Offline mode skips all network work but still enforces retention.
    /// A failure on the first page aborts the pass; a failure on a later
    /// page keeps whatever already accumulated.
    ///
    /// # Errors
    ///
    /// Returns an error when the first page fetch or a storage write fails.
    pub async fn sync(&self) -> Result<usize> {
        if self.offline {
            tracing::debug!("offline mode, retention only");
            self.retention.enforce(&self.repo).await?;
            return Ok(0);
        }

        let anchor = self.repo.latest_post_id().await?;
        let delta = self.fetch_delta(anchor.as_deref()).await?;
        if delta.posts.is_empty() {
            tracing::debug!("no new posts");
            self.retention.enforce(&self.repo).await?;
            return Ok(0);
        }

        let written = self.persist(&delta).await?;
        self.retention.enforce(&self.repo).await?;
        tracing::info!(written, "sync pass complete");
        Ok(written)
    }

    /// Fetches every page that can still contain posts newer than `anchor`.
    async fn fetch_delta(&self, anchor: Option<&str>) -> Result<Delta> {
        let initial = anchor.is_none();
        let page_size = if initial {
            INITIAL_PAGE_SIZE
        } else {
            self.page_size
        };

        let mut delta = Delta::default();
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = match self
                .feed
                .fetch_page(&self.list_id, page_size, next_token.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e) if !delta.posts.is_empty() => {
                    tracing::warn!(error = %e, "page fetch failed, keeping earlier pages");
                    break;
                }
                Err(e) => return Err(e),
            };

            if let Some(includes) = page.includes {
                for user in includes.users.unwrap_or_default() {
                    delta.users.insert(user.id.clone(), user);
                }
                for item in includes.media.unwrap_or_default() {
                    delta.media.insert(item.media_key.clone(), item);
                }
            }

            let raw = page.data.unwrap_or_default();
            let raw_count = raw.len();
            let fresh: Vec<RawPost> = match anchor {
                Some(anchor_id) => raw
                    .into_iter()
                    .filter(|post| order::is_newer(&post.id, anchor_id))
                    .collect(),
                None => raw,
            };
            // An empty page is still fully new: the next token may lead
            // to posts, and the seen-token guard stops any spin.
            let page_fully_new = fresh.len() == raw_count;
            delta.posts.extend(fresh);

            // Once a page contains anything at or below the anchor, the
            // remaining pages are older still.
            if initial || !page_fully_new {
                break;
            }
            let Some(token) = page
                .meta
                .and_then(|meta| meta.next_token)
                .filter(|token| !token.trim().is_empty())
            else {
                break;
            };
            if !seen_tokens.insert(token.clone()) {
                tracing::warn!("pagination token repeated, stopping");
                break;
            }
            next_token = Some(token);
        }
        Ok(delta)
    }

    async fn persist(&self, delta: &Delta) -> Result<usize> {
        let ids: Vec<String> = delta.posts.iter().map(|post| post.id.clone()).collect();
        let bookmarked: HashSet<String> = self
            .repo
            .bookmarked_ids_among(&ids)
            .await?
            .into_iter()
            .collect();
        let synced_at = Utc::now().timestamp_millis();

        let mut posts = Vec::with_capacity(delta.posts.len());
        let mut attachments = Vec::new();
        for raw in &delta.posts {
            let permalink = format!("{PERMALINK_BASE}{}", raw.id);
            let mut has_video = false;
            for key in raw
                .attachments
                .as_ref()
                .and_then(|a| a.media_keys.as_deref())
                .unwrap_or_default()
            {
                // A key with no matching include carries no usable data.
                let Some(item) = delta.media.get(key) else {
                    continue;
                };
                let Some(kind) = MediaKind::parse(&item.kind) else {
                    tracing::warn!(kind = %item.kind, "unrecognised media type");
                    continue;
                };
                if kind.is_video_like() {
                    has_video = true;
                    attachments.push(MediaAttachment {
                        post_id: raw.id.clone(),
                        kind,
                        local_path: None,
                        remote_url: Some(permalink.clone()),
                    });
                } else {
                    let source = item.url.as_deref().or(item.preview_image_url.as_deref());
                    let local_path = match source {
                        Some(url) => self.media.download(url, &raw.id, key).await,
                        None => None,
                    };
                    attachments.push(MediaAttachment {
                        post_id: raw.id.clone(),
                        kind,
                        local_path,
                        remote_url: source.map(str::to_string),
                    });
                }
            }

            let author = raw
                .author_id
                .as_deref()
                .and_then(|id| delta.users.get(id));
            posts.push(Post {
                id: raw.id.clone(),
                text: raw.text.clone(),
                author_name: author.map_or_else(|| "Unknown".to_string(), |u| u.name.clone()),
                author_handle: author
                    .map_or_else(|| "unknown".to_string(), |u| u.username.clone()),
                created_at: raw
                    .created_at
                    .as_deref()
                    .and_then(parse_epoch_millis)
                    .unwrap_or(0),
                permalink,
                has_video,
                is_bookmarked: bookmarked.contains(&raw.id),
                synced_at,
            });
        }

        self.repo.upsert_posts(&posts).await?;
        self.repo.delete_media_for_posts(&ids).await?;
        self.repo.insert_media(&attachments).await?;
        Ok(posts.len())
    }
}

/// Posts newer than the anchor plus the includes gathered alongside them.
#[derive(Default)]
struct Delta {
    posts: Vec<RawPost>,
    users: HashMap<String, RawUser>,
    media: HashMap<String, RawMedia>,
}

fn parse_epoch_millis(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}
