//! Timeline storage repository.
//!
//! One concurrent writer (the sync engine) and many readers. Every write
//! path bumps a revision on a watch channel so live-query consumers can
//! re-run [`TimelineRepository::timeline`] on change.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::watch;

use super::model::{MediaAttachment, MediaKind, Post, PostWithMedia};
use crate::Result;

/// Newest-first ordering by the numeral value of the id. Leading zeros
/// are stripped; a longer numeral is larger, equal lengths compare
/// lexicographically. Assumes ids are non-negative decimal numerals;
/// the expression must be revisited if the upstream id format changes.
const ORDER_NEWEST_FIRST: &str = "length(ltrim(id, '0')) DESC, ltrim(id, '0') DESC";

/// Repository for timeline posts and their media rows.
#[derive(Clone)]
pub struct TimelineRepository {
    pool: SqlitePool,
    changes: Arc<watch::Sender<u64>>,
}

impl TimelineRepository {
    /// Opens (or creates) the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema
    /// creation fails.
    pub async fn open(database_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Creates an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema
    /// creation fails.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let repo = Self {
            pool,
            changes: Arc::new(watch::channel(0).0),
        };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                author_name TEXT NOT NULL,
                author_handle TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                permalink TEXT NOT NULL,
                has_video INTEGER NOT NULL DEFAULT 0,
                is_bookmarked INTEGER NOT NULL DEFAULT 0,
                synced_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS media (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                local_path TEXT,
                remote_url TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(r"CREATE INDEX IF NOT EXISTS idx_media_post ON media(post_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Subscribes to write notifications. The value is a revision
    /// counter; re-query [`Self::timeline`] whenever it changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    /// Upserts posts in a single transaction. Conflict policy is replace:
    /// ids are globally unique and callers carry the bookmark flag
    /// forward explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upsert_posts(&self, posts: &[Post]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for post in posts {
            sqlx::query(
                r"
                INSERT INTO posts
                    (id, text, author_name, author_handle, created_at,
                     permalink, has_video, is_bookmarked, synced_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    author_name = excluded.author_name,
                    author_handle = excluded.author_handle,
                    created_at = excluded.created_at,
                    permalink = excluded.permalink,
                    has_video = excluded.has_video,
                    is_bookmarked = excluded.is_bookmarked,
                    synced_at = excluded.synced_at
                ",
            )
            .bind(&post.id)
            .bind(&post.text)
            .bind(&post.author_name)
            .bind(&post.author_handle)
            .bind(post.created_at)
            .bind(&post.permalink)
            .bind(post.has_video)
            .bind(post.is_bookmarked)
            .bind(post.synced_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        self.notify_changed();
        Ok(())
    }

    /// Deletes all media rows for the given post ids. Run before
    /// re-inserting media so a changed server payload cannot leave stale
    /// or duplicate rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete_media_for_posts(&self, post_ids: &[String]) -> Result<()> {
        if post_ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; post_ids.len()].join(", ");
        let sql = format!("DELETE FROM media WHERE post_id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in post_ids {
            query = query.bind(id);
        }
        query.execute(&self.pool).await?;
        self.notify_changed();
        Ok(())
    }

    /// Inserts media rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn insert_media(&self, media: &[MediaAttachment]) -> Result<()> {
        if media.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for item in media {
            sqlx::query(
                r"INSERT INTO media (post_id, kind, local_path, remote_url) VALUES (?, ?, ?, ?)",
            )
            .bind(&item.post_id)
            .bind(item.kind.as_str())
            .bind(&item.local_path)
            .bind(&item.remote_url)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        self.notify_changed();
        Ok(())
    }

    /// Returns the id of the newest post by numeral order, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn latest_post_id(&self) -> Result<Option<String>> {
        let sql = format!("SELECT id FROM posts ORDER BY {ORDER_NEWEST_FIRST} LIMIT 1");
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Number of persisted posts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn post_count(&self) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) AS count FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// Returns which of the given ids are currently bookmarked.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn bookmarked_ids_among(&self, post_ids: &[String]) -> Result<Vec<String>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; post_ids.len()].join(", ");
        let sql = format!(
            "SELECT id FROM posts WHERE id IN ({placeholders}) AND is_bookmarked = 1"
        );
        let mut query = sqlx::query(&sql);
        for id in post_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    /// Sets the bookmark flag for one post. This is the only write path
    /// the presentation layer owns.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set_bookmark(&self, post_id: &str, bookmarked: bool) -> Result<()> {
        sqlx::query(r"UPDATE posts SET is_bookmarked = ? WHERE id = ?")
            .bind(bookmarked)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        self.notify_changed();
        Ok(())
    }

    /// Keeps only the `limit` newest posts by numeral order; media rows
    /// cascade-delete with their post.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn trim_to_limit(&self, limit: i64) -> Result<()> {
        let sql = format!(
            "DELETE FROM posts WHERE id NOT IN \
             (SELECT id FROM posts ORDER BY {ORDER_NEWEST_FIRST} LIMIT ?)"
        );
        let result = sqlx::query(&sql).bind(limit).execute(&self.pool).await?;
        if result.rows_affected() > 0 {
            self.notify_changed();
        }
        Ok(())
    }

    /// Clears `local_path` on every media row pointing at the given file.
    /// The row itself is kept; its kind and remote URL stay informative.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear_local_path(&self, local_path: &str) -> Result<()> {
        sqlx::query(r"UPDATE media SET local_path = NULL WHERE local_path = ?")
            .bind(local_path)
            .execute(&self.pool)
            .await?;
        self.notify_changed();
        Ok(())
    }

    /// Current timeline snapshot: posts joined with their media, newest
    /// numeral first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn timeline(&self) -> Result<Vec<PostWithMedia>> {
        let sql = format!(
            "SELECT id, text, author_name, author_handle, created_at, \
             permalink, has_video, is_bookmarked, synced_at \
             FROM posts ORDER BY {ORDER_NEWEST_FIRST}"
        );
        let post_rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let media_rows =
            sqlx::query(r"SELECT post_id, kind, local_path, remote_url FROM media ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        let mut media_by_post: HashMap<String, Vec<MediaAttachment>> = HashMap::new();
        for row in &media_rows {
            let kind: String = row.get("kind");
            // Rows with an unknown kind are skipped rather than surfaced.
            let Some(kind) = MediaKind::parse(&kind) else {
                continue;
            };
            let attachment = MediaAttachment {
                post_id: row.get("post_id"),
                kind,
                local_path: row.get("local_path"),
                remote_url: row.get("remote_url"),
            };
            media_by_post
                .entry(attachment.post_id.clone())
                .or_default()
                .push(attachment);
        }

        Ok(post_rows
            .iter()
            .map(|row| {
                let post = Post {
                    id: row.get("id"),
                    text: row.get("text"),
                    author_name: row.get("author_name"),
                    author_handle: row.get("author_handle"),
                    created_at: row.get("created_at"),
                    permalink: row.get("permalink"),
                    has_video: row.get("has_video"),
                    is_bookmarked: row.get("is_bookmarked"),
                    synced_at: row.get("synced_at"),
                };
                let media = media_by_post.remove(&post.id).unwrap_or_default();
                PostWithMedia { post, media }
            })
            .collect())
    }
}
