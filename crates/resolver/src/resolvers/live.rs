//! Live-room resolver: room metadata plus the latest keyframe as an image.

use std::sync::LazyLock;

use feed_types::{markdown::escape_markdown, Feed, MediaType};
use regex::Regex;
use tracing::info;

use super::FeedResolver;
use crate::cache::{cache_aside, ttl};
use crate::context::ResolverContext;
use crate::error::ResolveError;
use crate::models::LiveRoom;

pub static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"live\.bilibili\.com[/\w]*/(\d+)").unwrap());

const ROOM_INFO_URL: &str =
    "https://api.live.bilibili.com/xlive/web-room/v1/index/getInfoByRoom";

pub(crate) struct LiveResolver<'a> {
    ctx: &'a ResolverContext,
    raw_url: String,
}

impl<'a> LiveResolver<'a> {
    pub fn new(ctx: &'a ResolverContext, raw_url: impl Into<String>) -> Self {
        Self {
            ctx,
            raw_url: raw_url.into(),
        }
    }

    fn extract_room_id(&self) -> Result<u64, ResolveError> {
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
impl FeedResolver for LiveResolver<'_> {
    async fn resolve(&self) -> Result<Feed, ResolveError> {
        info!(url = %self.raw_url, "resolving live room");
        let room_id = self.extract_room_id()?;

        let ctx = self.ctx;
        let raw_url = self.raw_url.clone();
        let payload = cache_aside(
            ctx.cache.as_ref(),
            &format!("live:{room_id}"),
            ttl::LIVE,
            || async move {
                let params = [("room_id", room_id.to_string())];
                let response = ctx.client.get_json(ROOM_INFO_URL, &params).await?;
                match response.get("data") {
                    Some(data) if !data.is_null() => Ok(data.clone()),
                    _ => Err(ResolveError::shape_with_payload(
                        raw_url,
                        format!("no live room data for {room_id}"),
                        &response,
                    )),
                }
            },
        )
        .await?;

        let room: LiveRoom = serde_json::from_value::<LiveRoom>(payload.clone()).map_err(|e| {
            ResolveError::shape_with_payload(
                self.raw_url.clone(),
                format!("undecodable live room: {e}"),
                &payload,
            )
        })?;

        let mut feed = Feed::new(format!("https://live.bilibili.com/{}", room.room_info.room_id));
        feed.user = room.anchor_info.base_info.uname;
        feed.uid = room.room_info.uid.to_string();
        feed.content = format!(
            "{} - {} - {}",
            room.room_info.title, room.room_info.area_name, room.room_info.parent_area_name
        );
        feed.extra_markdown = format!(
            "[{}的直播间]({})",
            escape_markdown(&feed.user),
            feed.url
        );
        let image = if room.room_info.keyframe.is_empty() {
            room.room_info.cover
        } else {
            room.room_info.keyframe
        };
        if !image.is_empty() {
            feed.set_media(vec![image], MediaType::Image);
        }
        Ok(feed)
    }
}
