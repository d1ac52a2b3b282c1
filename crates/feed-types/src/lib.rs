//! Shared domain types for resolved feeds.
//!
//! A [`Feed`] is the normalized output of the resolution engine: author,
//! text, media references and top comments, independent of which upstream
//! content kind produced it. Everything renderable (markdown, filenames) is
//! derived on demand from the canonical fields.

pub mod markdown;
mod feed;
mod reply;

pub use feed::{Feed, Forward, MediaDimension, MediaType, VideoIds, CAPTION_LIMIT};
pub use reply::{Reply, ReplyContent, ReplyMember, ReplyThread};
