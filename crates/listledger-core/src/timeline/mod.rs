//! Local timeline storage.

mod model;
mod repository;

pub use model::{MediaAttachment, MediaKind, Post, PostWithMedia};
pub use repository::TimelineRepository;
