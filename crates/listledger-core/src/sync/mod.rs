//! Incremental synchronisation of the remote list into local storage.

mod engine;
mod media;
pub mod order;
mod retention;

pub use engine::SyncEngine;
pub use media::{HttpFetcher, MediaDownloader};
pub use retention::RetentionPolicy;
