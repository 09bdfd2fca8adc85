//! # listledger-core
//!
//! Core logic for the listledger timeline client.
//!
//! This crate provides:
//! - Configuration loading and validation
//! - The remote list feed client with 401 re-authentication
//! - Local timeline storage (`SQLite`) with a live-query subscription
//! - The incremental sync engine
//! - Retention enforcement for rows and cached media bytes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod feed;
pub mod sync;
pub mod timeline;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use feed::{FeedClient, FeedPage, ListFeed, classify_http_failure};
pub use sync::{HttpFetcher, MediaDownloader, RetentionPolicy, SyncEngine};
pub use timeline::{MediaAttachment, MediaKind, Post, PostWithMedia, TimelineRepository};
