//! Share-link resolution for Bilibili content.
//!
//! Feed in any share URL (or a bare `BV`/`av`/`ep`/`ss` id) and get back a
//! normalized [`Feed`](feed_types::Feed) record: author, rendered text,
//! playable media URLs, and the attached comment thread. The
//! [`FeedEngine`] classifies each input to one of five resolver variants
//! (video, dynamic post, live room, audio track, article), resolves batches
//! concurrently, and answers repeat lookups from a TTL cache.

pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
mod models;
pub mod muxer;
pub mod publish;
pub mod registry;
pub mod reply;
mod resolvers;
mod select;

pub use cache::{CacheStore, MemoryCache};
pub use client::BiliClient;
pub use config::ResolverConfig;
pub use context::ResolverContext;
pub use engine::{FeedEngine, Resolution};
pub use error::{CacheError, ResolveError};
pub use registry::{normalize_input, ResolverRegistry, Route, RouteKind};
