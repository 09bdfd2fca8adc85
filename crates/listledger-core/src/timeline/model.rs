//! Timeline model types.

use serde::{Deserialize, Serialize};

/// Kind of a media attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    /// A downloadable still image.
    Photo,
    /// A video; never downloaded, linked via the post permalink.
    Video,
    /// An animated GIF; treated like video.
    AnimatedGif,
}

impl MediaKind {
    /// Wire/storage name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::AnimatedGif => "animated_gif",
        }
    }

    /// Parses the wire/storage name; unknown kinds yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "photo" => Some(Self::Photo),
            "video" => Some(Self::Video),
            "animated_gif" => Some(Self::AnimatedGif),
            _ => None,
        }
    }

    /// Whether the kind counts toward a post's `has_video` flag.
    #[must_use]
    pub const fn is_video_like(&self) -> bool {
        matches!(self, Self::Video | Self::AnimatedGif)
    }
}

/// A post in the mirrored timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Opaque numeric-string identifier; unique key.
    pub id: String,
    /// Post text.
    pub text: String,
    /// Author display name ("Unknown" when the author was not included).
    pub author_name: String,
    /// Author handle ("unknown" when the author was not included).
    pub author_handle: String,
    /// Creation time in epoch milliseconds (0 when absent upstream).
    pub created_at: i64,
    /// Canonical permalink.
    pub permalink: String,
    /// True when any attached media resolves to video/animated_gif.
    pub has_video: bool,
    /// Locally owned; survives re-sync.
    pub is_bookmarked: bool,
    /// When this row was last written by a sync, epoch milliseconds.
    pub synced_at: i64,
}

/// A media attachment belonging to exactly one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    /// Owning post id.
    pub post_id: String,
    /// Attachment kind.
    pub kind: MediaKind,
    /// Absolute path of the downloaded file; photos only, and only when
    /// the download succeeded.
    pub local_path: Option<String>,
    /// Source URL for photos; the post permalink for video kinds.
    pub remote_url: Option<String>,
}

/// A post joined with its media, as served to timeline consumers.
#[derive(Debug, Clone)]
pub struct PostWithMedia {
    /// The post row.
    pub post: Post,
    /// Its media rows.
    pub media: Vec<MediaAttachment>,
}
