//! Remote list feed access.

mod client;

pub use client::FeedClient;

use serde::Deserialize;

/// One page of the paginated list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedPage {
    /// Raw posts of this page.
    #[serde(default)]
    pub data: Option<Vec<RawPost>>,
    /// Expanded author/media records referenced by the posts.
    #[serde(default)]
    pub includes: Option<Includes>,
    /// Pagination metadata.
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

/// A post as served by the feed endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPost {
    /// Opaque numeric-string id.
    pub id: String,
    /// Post text.
    pub text: String,
    /// Id of the author within `includes.users`, when expanded.
    #[serde(default)]
    pub author_id: Option<String>,
    /// ISO-8601 creation timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Media attachment references.
    #[serde(default)]
    pub attachments: Option<Attachments>,
}

/// Media keys attached to a post.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachments {
    /// Keys into `includes.media`.
    #[serde(default)]
    pub media_keys: Option<Vec<String>>,
}

/// Expanded records included with a page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Includes {
    /// Author records keyed by `RawPost::author_id`.
    #[serde(default)]
    pub users: Option<Vec<RawUser>>,
    /// Media records keyed by media key.
    #[serde(default)]
    pub media: Option<Vec<RawMedia>>,
}

/// An included author record.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUser {
    /// Author id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Handle.
    pub username: String,
}

/// An included media record.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMedia {
    /// Key referenced from `attachments.media_keys`.
    pub media_key: String,
    /// Wire type: `photo`, `video`, or `animated_gif`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Full-resolution URL (photos).
    #[serde(default)]
    pub url: Option<String>,
    /// Preview image URL fallback.
    #[serde(default)]
    pub preview_image_url: Option<String>,
}

/// Pagination metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    /// Token for the next page, when more pages exist.
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Abstract fetch capability over the paginated list endpoint, so the
/// sync engine can be exercised against recorded fixtures.
pub trait ListFeed {
    /// Fetches one page of the list.
    fn fetch_page(
        &self,
        list_id: &str,
        page_size: u32,
        pagination_token: Option<&str>,
    ) -> impl std::future::Future<Output = crate::Result<FeedPage>> + Send;
}

/// Maps an auth/billing-class HTTP failure to a user-actionable message.
///
/// The feed endpoint reports both credential problems and plan/billing
/// problems through a small set of statuses; the body keywords separate
/// "log in again" from "your API access is capped". Returns `None` for
/// anything that should surface as a plain network error.
#[must_use]
pub fn classify_http_failure(status: u16, body: &str) -> Option<String> {
    let lower = body.to_lowercase();
    match status {
        401 => Some("authentication expired; log in again".to_string()),
        402 => Some("this API plan does not cover the list endpoint".to_string()),
        403 => {
            if lower.contains("client-not-enrolled") || lower.contains("usage-capped") {
                Some("API access is not enrolled or is usage-capped; check the developer plan".to_string())
            } else if lower.contains("suspended") {
                Some("the account or app is suspended".to_string())
            } else {
                Some("access to the list was refused; verify credentials and scopes".to_string())
            }
        }
        _ if lower.contains("invalid_token") || lower.contains("unauthorized") => {
            Some("authentication expired; log in again".to_string())
        }
        _ => None,
    }
}
