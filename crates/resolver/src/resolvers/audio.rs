//! Audio-track resolver: song metadata, playable CDN URLs, and comments.

use std::sync::LazyLock;

use feed_types::{markdown::escape_markdown, Feed, MediaType};
use regex::Regex;
use tracing::info;

use super::FeedResolver;
use crate::cache::{cache_aside, ttl};
use crate::context::ResolverContext;
use crate::error::ResolveError;
use crate::models::{AudioDetail, AudioMedia};
use crate::reply::ReplyResolver;

pub static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bilibili\.com/audio/au(\d+)").unwrap());

/// Upstream reply namespace for audio tracks.
const REPLY_TYPE: u32 = 14;

pub(crate) struct AudioResolver<'a> {
    ctx: &'a ResolverContext,
    raw_url: String,
}

impl<'a> AudioResolver<'a> {
    pub fn new(ctx: &'a ResolverContext, raw_url: impl Into<String>) -> Self {
        Self {
            ctx,
            raw_url: raw_url.into(),
        }
    }

    fn extract_audio_id(&self) -> Result<u64, ResolveError> {
        URL_REGEX
            .captures(&self.raw_url)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| ResolveError::LinkFormat {
                url: self.raw_url.clone(),
            })
    }
}

#[async_trait::async_trait]
impl FeedResolver for AudioResolver<'_> {
    async fn resolve(&self) -> Result<Feed, ResolveError> {
        info!(url = %self.raw_url, "resolving audio track");
        let audio_id = self.extract_audio_id()?;
        let ctx = self.ctx;

        let raw_url = self.raw_url.clone();
        let info_payload = cache_aside(
            ctx.cache.as_ref(),
            &format!("audio:info:{audio_id}"),
            ttl::AUDIO,
            || async move {
                let params = [("song_id", audio_id.to_string())];
                let response = ctx
                    .client
                    .api_get("/audio/music-service-c/songs/playing", &params)
                    .await?;
                match response.get("data") {
                    Some(data) if !data.is_null() => Ok(data.clone()),
                    _ => Err(ResolveError::shape_with_payload(
                        raw_url,
                        format!("no audio data for au{audio_id}"),
                        &response,
                    )),
                }
            },
        )
        .await?;
        let detail: AudioDetail = serde_json::from_value(info_payload.clone()).map_err(|e| {
            ResolveError::shape_with_payload(
                self.raw_url.clone(),
                format!("undecodable audio info: {e}"),
                &info_payload,
            )
        })?;

        let mut feed = Feed::new(format!("https://www.bilibili.com/audio/au{audio_id}"));
        feed.user = detail.author;
        feed.uid = detail.mid.to_string();
        feed.content = detail.intro;
        feed.extra_markdown = format!("[{}]({})", escape_markdown(&detail.title), feed.url);
        feed.media_thumb = Some(detail.cover_url);
        feed.media_title = Some(detail.title);
        feed.media_duration = detail.duration;

        let mid = detail.mid;
        let raw_url = self.raw_url.clone();
        let media_payload = cache_aside(
            ctx.cache.as_ref(),
            &format!("audio:media:{audio_id}"),
            ttl::AUDIO,
            || async move {
                let params = [
                    ("songid", audio_id.to_string()),
                    ("mid", mid.to_string()),
                    ("privilege", "2".to_string()),
                    ("quality", "3".to_string()),
                    ("platform", String::new()),
                ];
                let response = ctx
                    .client
                    .api_get("/audio/music-service-c/url", &params)
                    .await?;
                match response.get("data") {
                    Some(data) if !data.is_null() => Ok(data.clone()),
                    _ => Err(ResolveError::shape_with_payload(
                        raw_url,
                        format!("no audio media for au{audio_id}"),
                        &response,
                    )),
                }
            },
        )
        .await?;
        let media: AudioMedia = serde_json::from_value(media_payload.clone()).map_err(|e| {
            ResolveError::shape_with_payload(
                self.raw_url.clone(),
                format!("undecodable audio media: {e}"),
                &media_payload,
            )
        })?;

        feed.set_media(media.cdns, MediaType::Audio);
        feed.media_filesize = media.size;
        // Oversized tracks have to be downloaded and re-uploaded.
        feed.media_raw = media.size >= ctx.config.audio_raw_threshold;

        feed.replies = ReplyResolver::new(ctx).fetch(audio_id, REPLY_TYPE, None).await;
        Ok(feed)
    }
}
