//! Video resolver: series lookup, canonical metadata, comments, and
//! progressive/DASH stream selection under the upload budget.

use std::sync::LazyLock;

use feed_types::{
    markdown::escape_markdown, Feed, MediaDimension, MediaType, VideoIds, CAPTION_LIMIT,
};
use regex::Regex;
use tracing::{info, warn};
use url::Url;

use super::{fmt_duration, wan, FeedResolver};
use crate::cache::{cache_alias, cache_aside, ttl};
use crate::context::ResolverContext;
use crate::error::ResolveError;
use crate::models::{Episode, SeasonResult, VideoDetail};
use crate::reply::ReplyResolver;
use crate::select::StreamSelector;

static VIDEO_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:bilibili\.com(?:/video|/bangumi/play)?|b23\.tv|acg\.tv)/(?:(?P<bvid>BV\w{10})|av(?P<aid>\d+)|ep(?P<epid>\d+)|ss(?P<ssid>\d+))",
    )
    .unwrap()
});

static FESTIVAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"bilibili\.com/festival/\w+\?(?:.*&)?bvid=(?P<bvid>BV\w{10})").unwrap()
});

/// Upstream reply namespace for videos.
const REPLY_TYPE: u32 = 1;

/// Identifier a video link resolves through. Episode and season ids go
/// through a series lookup before the generic video path runs.
#[derive(Debug, Clone, PartialEq, Eq)]
enum VideoKey {
    Bvid(String),
    Aid(u64),
    Epid(u64),
    Ssid(u64),
}

pub(crate) struct VideoResolver<'a> {
    ctx: &'a ResolverContext,
    raw_url: String,
}

impl<'a> VideoResolver<'a> {
    pub fn new(ctx: &'a ResolverContext, raw_url: impl Into<String>) -> Self {
        Self {
            ctx,
            raw_url: raw_url.into(),
        }
    }

    /// Series links resolve season metadata to a concrete `aid`. Failure is
    /// terminal: typically a region lock, and there is no video without it.
    async fn resolve_season(&self, key: &VideoKey) -> Result<u64, ResolveError> {
        let ctx = self.ctx;
        let (cache_key, params) = match key {
            VideoKey::Epid(id) => (format!("bangumi:ep:{id}"), ("ep_id", id.to_string())),
            VideoKey::Ssid(id) => (format!("bangumi:ss:{id}"), ("season_id", id.to_string())),
            _ => unreachable!("resolve_season called for a direct video id"),
        };

        let raw_url = self.raw_url.clone();
        let payload = cache_aside(ctx.cache.as_ref(), &cache_key, ttl::BANGUMI, || async move {
            let response = ctx
                .client
                .api_get("/pgc/view/web/season", &[(params.0, params.1)])
                .await?;
            match response.get("result") {
                Some(result) if !result.is_null() => Ok(result.clone()),
                _ => Err(ResolveError::shape_with_payload(
                    raw_url,
                    "no season result (region lock?)",
                    &response,
                )),
            }
        })
        .await?;

        let season: SeasonResult = serde_json::from_value(payload.clone()).map_err(|e| {
            ResolveError::shape_with_payload(
                self.raw_url.clone(),
                format!("undecodable season: {e}"),
                &payload,
            )
        })?;
        let episode = pick_episode(&season, key).ok_or_else(|| {
            ResolveError::shape_with_payload(
                self.raw_url.clone(),
                "episode not found in season",
                &payload,
            )
        })?;
        if episode.aid == 0 {
            return Err(ResolveError::shape(
                self.raw_url.clone(),
                "episode carries no aid",
            ));
        }

        // The same payload answers both the episode and the season key.
        cache_alias(
            ctx.cache.as_ref(),
            &format!("bangumi:ep:{}", episode.id),
            &payload,
            ttl::BANGUMI,
        )
        .await;
        cache_alias(
            ctx.cache.as_ref(),
            &format!("bangumi:ss:{}", season.season_id),
            &payload,
            ttl::BANGUMI,
        )
        .await;
        Ok(episode.aid)
    }

    async fn fetch_detail(&self, key: &VideoKey) -> Result<VideoDetail, ResolveError> {
        let ctx = self.ctx;
        let (cache_key, params) = match key {
            VideoKey::Aid(aid) => (format!("video:aid:{aid}"), ("aid", aid.to_string())),
            VideoKey::Bvid(bvid) => (format!("video:bvid:{bvid}"), ("bvid", bvid.clone())),
            _ => unreachable!("series keys are resolved to an aid first"),
        };

        let raw_url = self.raw_url.clone();
        let payload = cache_aside(ctx.cache.as_ref(), &cache_key, ttl::VIDEO, || async move {
            let response = ctx
                .client
                .api_get("/x/web-interface/view", &[(params.0, params.1)])
                .await?;
            match response.get("data") {
                Some(data) if !data.is_null() => Ok(data.clone()),
                _ => Err(ResolveError::shape_with_payload(
                    raw_url,
                    "no video data (region lock?)",
                    &response,
                )),
            }
        })
        .await?;

        let detail: VideoDetail = serde_json::from_value(payload.clone()).map_err(|e| {
            ResolveError::shape_with_payload(
                self.raw_url.clone(),
                format!("undecodable video detail: {e}"),
                &payload,
            )
        })?;
        cache_alias(
            ctx.cache.as_ref(),
            &format!("video:aid:{}", detail.aid),
            &payload,
            ttl::VIDEO,
        )
        .await;
        cache_alias(
            ctx.cache.as_ref(),
            &format!("video:bvid:{}", detail.bvid),
            &payload,
            ttl::VIDEO,
        )
        .await;
        Ok(detail)
    }
}

#[async_trait::async_trait]
impl FeedResolver for VideoResolver<'_> {
    async fn resolve(&self) -> Result<Feed, ResolveError> {
        info!(url = %self.raw_url, "resolving video");
        let key = parse_video_key(&self.raw_url).ok_or_else(|| ResolveError::LinkFormat {
            url: self.raw_url.clone(),
        })?;
        let (page, seek_id) = parse_page_and_seek(&self.raw_url);

        let key = match key {
            VideoKey::Epid(_) | VideoKey::Ssid(_) => {
                VideoKey::Aid(self.resolve_season(&key).await?)
            }
            direct => direct,
        };
        let detail = self.fetch_detail(&key).await?;

        let (cid, dimension, page) = select_page(&detail, page);
        let mut feed = Feed::new(format!(
            "https://www.bilibili.com/video/av{}?p={page}",
            detail.aid
        ));
        feed.user = detail.owner.name.clone();
        feed.uid = detail.owner.mid.to_string();
        feed.video_ids = Some(VideoIds {
            aid: detail.aid,
            bvid: detail.bvid.clone(),
            cid,
        });
        feed.content = build_content(&detail, page);
        feed.extra_markdown = build_extra_markdown(&detail, &feed.url);
        feed.media_title = Some(detail.title.clone());
        feed.media_thumb = Some(detail.pic.clone());
        feed.media_dimension = dimension;
        feed.media_duration = detail.duration.unwrap_or(0);
        // Cover image is the fallback media when no rendition fits.
        feed.set_media(vec![detail.pic.clone()], MediaType::Image);

        feed.replies = ReplyResolver::new(self.ctx)
            .fetch(detail.aid, REPLY_TYPE, seek_id)
            .await;

        if cid == 0 {
            warn!(aid = detail.aid, "no cid, skipping stream selection");
            return Ok(feed);
        }
        if let Some(selected) = StreamSelector::new(self.ctx)
            .select(detail.aid, cid, &feed.url)
            .await
        {
            feed.set_media(selected.urls, MediaType::Video);
            feed.media_raw = selected.raw;
            feed.media_filesize = selected.size;
            if let Some(duration) = selected.duration {
                feed.media_duration = duration;
            }
        }
        Ok(feed)
    }
}

fn parse_video_key(url: &str) -> Option<VideoKey> {
    if let Some(caps) = FESTIVAL_RE.captures(url) {
        return Some(VideoKey::Bvid(caps["bvid"].to_string()));
    }
    let caps = VIDEO_URL_RE.captures(url)?;
    if let Some(bvid) = caps.name("bvid") {
        Some(VideoKey::Bvid(bvid.as_str().to_string()))
    } else if let Some(aid) = caps.name("aid") {
        aid.as_str().parse().ok().map(VideoKey::Aid)
    } else if let Some(epid) = caps.name("epid") {
        epid.as_str().parse().ok().map(VideoKey::Epid)
    } else {
        caps.name("ssid")?.as_str().parse().ok().map(VideoKey::Ssid)
    }
}

/// Sub-episode page (`?p=`) and comment seek id (query params or a
/// `#reply{id}` fragment).
fn parse_page_and_seek(raw_url: &str) -> (u32, Option<u64>) {
    let Ok(parsed) = Url::parse(raw_url) else {
        return (1, None);
    };
    let mut page = 1;
    let mut seek_id = None;
    let mut root_id = None;
    for (name, value) in parsed.query_pairs() {
        match name.as_ref() {
            "p" => page = value.parse().unwrap_or(1),
            "comment_secondary_id" => seek_id = value.parse().ok(),
            "comment_root_id" => root_id = value.parse().ok(),
            _ => {}
        }
    }
    let seek_id = seek_id.or(root_id).or_else(|| {
        parsed
            .fragment()
            .and_then(|f| f.strip_prefix("reply"))
            .and_then(|id| id.parse().ok())
    });
    (page.max(1), seek_id)
}

/// Pick the playable part for a multi-page upload; out-of-range pages fall
/// back to the first.
fn select_page(detail: &VideoDetail, page: u32) -> (u64, MediaDimension, u32) {
    if page != 1 {
        if let Some(part) = detail.pages.iter().find(|p| p.page == page) {
            let dimension = MediaDimension {
                width: part.dimension.width,
                height: part.dimension.height,
                rotate: part.dimension.rotate,
            };
            return (part.cid, dimension, page);
        }
    }
    let dimension = detail
        .pages
        .first()
        .map(|p| MediaDimension {
            width: p.dimension.width,
            height: p.dimension.height,
            rotate: p.dimension.rotate,
        })
        .unwrap_or_default();
    (detail.cid, dimension, 1)
}

/// Human-readable stat summary, matching the upstream client's wording.
fn build_content(detail: &VideoDetail, page: u32) -> String {
    let mut content = String::from("发布视频");
    if let Some(tname) = detail.tname.as_deref().filter(|t| !t.is_empty()) {
        content.push_str(&format!("-{tname}"));
    }
    if let Some(tname_v2) = detail.tname_v2.as_deref().filter(|t| !t.is_empty()) {
        content.push_str(&format!("-{tname_v2}"));
    }
    content.push('\n');
    if detail.pages.len() > 1 {
        content.push_str(&format!("第{page}P/共{}P\n", detail.pages.len()));
    }
    let stat = &detail.stat;
    if stat.now_rank > 0 {
        content.push_str(&format!("当前排行榜第{}位\n", stat.now_rank));
    } else if stat.his_rank > 0 {
        content.push_str(&format!("历史排行榜第{}位\n", stat.his_rank));
    }
    content.push_str(&format!(
        "播放量:{} 弹幕:{} 评论:{}\n",
        wan(stat.view),
        wan(stat.danmaku),
        wan(stat.reply)
    ));
    content.push_str(&format!(
        "点赞:{} 投币:{} 收藏:{} 转发:{}\n",
        wan(stat.like),
        wan(stat.coin),
        wan(stat.favorite),
        wan(stat.share)
    ));
    if let Some(pubdate) = detail.pubdate
        && let Some(ts) = chrono::DateTime::from_timestamp(pubdate, 0)
    {
        content.push_str(&format!("发布日期:{}\n", ts.format("%Y-%m-%d %H:%M:%S")));
    }
    if let Some(ctime) = detail.ctime.filter(|c| detail.pubdate != Some(*c))
        && let Some(ts) = chrono::DateTime::from_timestamp(ctime, 0)
    {
        content.push_str(&format!("上传日期:{}\n", ts.format("%Y-%m-%d %H:%M:%S")));
    }
    if let Some(duration) = detail.duration.filter(|d| *d > 0) {
        content.push_str(&format!("时长:{}\n", fmt_duration(duration)));
    }
    content
}

/// `[title](canonical)`, plus the description as an expandable quote when it
/// fits the caption budget.
fn build_extra_markdown(detail: &VideoDetail, canonical_url: &str) -> String {
    let mut extra = format!("[{}]({canonical_url})", escape_markdown(&detail.title));
    let desc = detail
        .desc
        .as_deref()
        .filter(|d| !d.is_empty() && *d != "-")
        .or(detail.dynamic.as_deref().filter(|d| !d.is_empty() && *d != "-"));
    if let Some(desc) = desc {
        let block = format!("\n**>{}||", escape_markdown(desc).replace('\n', "\n>"));
        if extra.len() + block.len() < CAPTION_LIMIT {
            extra.push_str(&block);
        }
    }
    extra
}

fn pick_episode<'s>(season: &'s SeasonResult, key: &VideoKey) -> Option<&'s Episode> {
    match key {
        VideoKey::Epid(epid) => season
            .episodes
            .iter()
            .find(|e| e.id == *epid)
            .or_else(|| {
                season
                    .section
                    .iter()
                    .flat_map(|s| s.episodes.iter())
                    .find(|e| e.id == *epid)
            }),
        // A bare season link lands on the latest episode.
        _ => season.episodes.last(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_video_key_variants() {
        assert_eq!(
            parse_video_key("https://www.bilibili.com/video/BV1xx411c7mD"),
            Some(VideoKey::Bvid("BV1xx411c7mD".into()))
        );
        assert_eq!(
            parse_video_key("https://b23.tv/av170001"),
            Some(VideoKey::Aid(170001))
        );
        assert_eq!(
            parse_video_key("https://www.bilibili.com/bangumi/play/ep374717"),
            Some(VideoKey::Epid(374717))
        );
        assert_eq!(
            parse_video_key("https://www.bilibili.com/bangumi/play/ss33802"),
            Some(VideoKey::Ssid(33802))
        );
        assert_eq!(
            parse_video_key("https://www.bilibili.com/festival/2021bnj?bvid=BV1xx411c7mD"),
            Some(VideoKey::Bvid("BV1xx411c7mD".into()))
        );
        assert_eq!(parse_video_key("https://example.com/xyz"), None);
    }

    #[test]
    fn test_parse_page_and_seek() {
        assert_eq!(
            parse_page_and_seek("https://www.bilibili.com/video/av1?p=3"),
            (3, None)
        );
        assert_eq!(
            parse_page_and_seek("https://www.bilibili.com/video/av1?comment_root_id=77"),
            (1, Some(77))
        );
        assert_eq!(
            parse_page_and_seek(
                "https://www.bilibili.com/video/av1?comment_root_id=77&comment_secondary_id=88"
            ),
            (1, Some(88))
        );
        assert_eq!(
            parse_page_and_seek("https://www.bilibili.com/video/av1#reply99"),
            (1, Some(99))
        );
    }

    fn detail() -> VideoDetail {
        serde_json::from_value(json!({
            "aid": 170001, "bvid": "BV17x411w7KC", "cid": 279786,
            "title": "title", "pic": "https://x/p.jpg",
            "owner": {"name": "owner", "mid": 2},
            "pages": [
                {"page": 1, "cid": 279786, "dimension": {"width": 1920, "height": 1080, "rotate": 0}},
                {"page": 2, "cid": 279787, "dimension": {"width": 1280, "height": 720, "rotate": 0}}
            ],
            "stat": {"view": 20000, "like": 3},
            "duration": 330
        }))
        .unwrap()
    }

    #[test]
    fn test_select_page() {
        let detail = detail();
        let (cid, dim, page) = select_page(&detail, 2);
        assert_eq!((cid, page), (279787, 2));
        assert_eq!(dim.width, 1280);
        // Out-of-range page falls back to the first part.
        let (cid, _, page) = select_page(&detail, 9);
        assert_eq!((cid, page), (279786, 1));
    }

    #[test]
    fn test_video_ids_follow_selected_page() {
        let detail = detail();
        let (cid, _, _) = select_page(&detail, 2);
        let ids = VideoIds {
            aid: detail.aid,
            bvid: detail.bvid.clone(),
            cid,
        };
        assert_eq!(ids.aid, 170001);
        assert_eq!(ids.bvid, "BV17x411w7KC");
        // cid tracks the requested part, not the default first page.
        assert_eq!(ids.cid, 279787);
    }

    #[test]
    fn test_build_content_mentions_pages_and_stats() {
        let content = build_content(&detail(), 2);
        assert!(content.contains("第2P/共2P"));
        assert!(content.contains("播放量:2.00万"));
        assert!(content.contains("时长:0:05:30"));
    }

    #[test]
    fn test_build_extra_markdown_skips_placeholder_desc() {
        let mut d = detail();
        d.desc = Some("-".into());
        let extra = build_extra_markdown(&d, "https://www.bilibili.com/video/av170001?p=1");
        assert_eq!(extra, "[title](https://www.bilibili.com/video/av170001?p=1)");
        d.desc = Some("line1\nline2".into());
        let extra = build_extra_markdown(&d, "https://www.bilibili.com/video/av170001?p=1");
        assert!(extra.contains("\n**>line1\n>line2||"));
    }

    #[test]
    fn test_pick_episode() {
        let season: SeasonResult = serde_json::from_value(json!({
            "season_id": 1,
            "episodes": [{"id": 10, "aid": 100}, {"id": 11, "aid": 101}],
            "section": [{"episodes": [{"id": 12, "aid": 102}]}]
        }))
        .unwrap();
        assert_eq!(pick_episode(&season, &VideoKey::Epid(12)).unwrap().aid, 102);
        assert_eq!(pick_episode(&season, &VideoKey::Ssid(1)).unwrap().aid, 101);
        assert!(pick_episode(&season, &VideoKey::Epid(99)).is_none());
    }
}
