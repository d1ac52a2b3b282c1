//! Dynamic-post (opus) resolver.
//!
//! The polymer detail payload is open-ended: a module list whose entries each
//! carry one `module_*` key, and a `module_dynamic` major card tagged with a
//! `MDL_DYN_TYPE_*` discriminant. The payload stays `serde_json::Value` and
//! is walked defensively; absent pieces degrade the feed instead of failing
//! it.

use std::sync::LazyLock;

use feed_types::{Feed, Forward, MediaType};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::info;

use super::FeedResolver;
use crate::cache::{cache_aside, ttl};
use crate::client::DESKTOP_BUILD;
use crate::context::ResolverContext;
use crate::error::ResolveError;
use crate::reply::ReplyResolver;

pub static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:www|t|h|m)\.bilibili\.com/(?:[^/?]+/)*?(\d+)(?:[/?].*)?").unwrap()
});

const DETAIL_PATH: &str = "/x/polymer/web-dynamic/desktop/v1/detail";

pub(crate) struct OpusResolver<'a> {
    ctx: &'a ResolverContext,
    raw_url: String,
}

impl<'a> OpusResolver<'a> {
    pub fn new(ctx: &'a ResolverContext, raw_url: impl Into<String>) -> Self {
        Self {
            ctx,
            raw_url: raw_url.into(),
        }
    }

    fn extract_dynamic_id(&self) -> Result<u64, ResolveError> {
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
impl FeedResolver for OpusResolver<'_> {
    async fn resolve(&self) -> Result<Feed, ResolveError> {
        info!(url = %self.raw_url, "resolving dynamic post");
        let dynamic_id = self.extract_dynamic_id()?;

        let ctx = self.ctx;
        let raw_url = self.raw_url.clone();
        let payload = cache_aside(
            ctx.cache.as_ref(),
            &format!("opus:dynamic_id:{dynamic_id}"),
            ttl::OPUS,
            || async move {
                let params = [
                    ("id", dynamic_id.to_string()),
                    ("build", DESKTOP_BUILD.to_string()),
                ];
                let response = ctx.client.api_get(DETAIL_PATH, &params).await?;
                match response.get("data") {
                    Some(data) if data.get("item").is_some_and(|i| !i.is_null()) => {
                        Ok(data.clone())
                    }
                    _ => Err(ResolveError::shape_with_payload(
                        raw_url,
                        format!("no dynamic item for {dynamic_id}"),
                        &response,
                    )),
                }
            },
        )
        .await?;

        let item = payload.get("item").cloned().unwrap_or(Value::Null);
        let modules = flatten_modules(item.get("modules"));

        let mut feed = Feed::new(format!("https://t.bilibili.com/{dynamic_id}"));
        if let Some(author) = modules.get("module_author").and_then(|m| m.get("user")) {
            feed.user = json_str(author.get("name"));
            feed.uid = author
                .get("mid")
                .and_then(Value::as_u64)
                .unwrap_or(0)
                .to_string();
        }
        feed.content = desc_text(modules.get("module_desc"));
        if let Some(major) = modules.get("module_dynamic") {
            apply_major(&mut feed, major, 0);
        }
        feed.extra_markdown = format!(
            "[{}的动态]({})",
            feed_types::markdown::escape_markdown(&feed.user),
            feed.url
        );

        if let Some((oid, reply_type)) = reply_target(&item) {
            feed.replies = ReplyResolver::new(ctx).fetch(oid, reply_type, None).await;
        }
        Ok(feed)
    }
}

/// Merge the module list (one `module_*` key per entry) into a single map.
fn flatten_modules(modules: Option<&Value>) -> Map<String, Value> {
    let mut merged = Map::new();
    let Some(Value::Array(entries)) = modules else {
        return merged;
    };
    for entry in entries {
        if let Value::Object(fields) = entry {
            for (key, value) in fields {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

fn desc_text(desc: Option<&Value>) -> String {
    json_str(desc.and_then(|d| d.get("text")))
}

fn json_str(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Payload key carrying each major card's body.
fn major_payload_key(major_type: &str) -> Option<&'static str> {
    Some(match major_type {
        "MDL_DYN_TYPE_ARCHIVE" => "dyn_archive",
        "MDL_DYN_TYPE_PGC" => "dyn_pgc",
        "MDL_DYN_TYPE_ARTICLE" => "dyn_article",
        "MDL_DYN_TYPE_MUSIC" => "dyn_music",
        "MDL_DYN_TYPE_COMMON" => "dyn_common",
        "MDL_DYN_TYPE_LIVE" => "dyn_live",
        "MDL_DYN_TYPE_UGC_SEASON" => "dyn_ugc_season",
        "MDL_DYN_TYPE_DRAW" => "dyn_draw",
        "MDL_DYN_TYPE_OPUS" => "dyn_opus",
        "MDL_DYN_TYPE_FORWARD" => "dyn_forward",
        _ => return None,
    })
}

/// Fold one major card into the feed. Forward cards recurse a single level
/// into the forwarded item for media; deeper nesting is ignored.
fn apply_major(feed: &mut Feed, major: &Value, depth: u8) {
    let Some(major_type) = major.get("type").and_then(Value::as_str) else {
        return;
    };
    let Some(key) = major_payload_key(major_type) else {
        return;
    };
    let Some(body) = major.get(key) else {
        return;
    };

    match major_type {
        "MDL_DYN_TYPE_FORWARD" => {
            if depth > 0 {
                return;
            }
            let inner = flatten_modules(body.pointer("/item/modules"));
            let mut forward = Forward::default();
            if let Some(user) = inner.get("module_author").and_then(|m| m.get("user")) {
                forward.user = json_str(user.get("name"));
                forward.uid = user.get("mid").and_then(Value::as_u64).unwrap_or(0);
            }
            forward.content = desc_text(inner.get("module_desc"));
            feed.forward = Some(forward);
            if feed.media_type.is_none()
                && let Some(inner_major) = inner.get("module_dynamic")
            {
                apply_major(feed, inner_major, depth + 1);
            }
        }
        "MDL_DYN_TYPE_DRAW" => {
            let images: Vec<String> = body
                .get("items")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.get("src").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if !images.is_empty() {
                feed.set_media(images, MediaType::Image);
            }
        }
        _ => {
            if let Some(cover) = body.get("cover").and_then(Value::as_str) {
                feed.set_media(vec![cover.to_string()], MediaType::Image);
            }
        }
    }
}

/// Comment namespace for the post's `rtype`, plus the comment oid taken
/// from `basic.rid_str`. Unknown rtypes get no comment thread.
fn reply_target(item: &Value) -> Option<(u64, u32)> {
    let basic = item.get("basic")?;
    let rtype = basic.get("rtype").and_then(Value::as_u64)?;
    let reply_type = match rtype {
        2 => 11,
        16 => 5,
        64 => 12,
        256 => 14,
        8 | 512 => 1,
        4000..4200 => 1,
        1 | 4 => 17,
        4200..4300 | 2048..2100 => 17,
        _ => return None,
    };
    let oid = basic.get("rid_str").and_then(Value::as_str)?.parse().ok()?;
    Some((oid, reply_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dynamic_id_extraction() {
        let id = |url: &str| {
            URL_REGEX
                .captures(url)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        };
        assert_eq!(
            id("https://t.bilibili.com/1054063189035974663"),
            Some("1054063189035974663".into())
        );
        assert_eq!(
            id("https://www.bilibili.com/opus/1054063189035974663?spm=333"),
            Some("1054063189035974663".into())
        );
        assert_eq!(id("https://live.bilibili.com/"), None);
    }

    #[test]
    fn test_flatten_modules_merges_entries() {
        let modules = json!([
            {"module_author": {"user": {"name": "a", "mid": 1}}},
            {"module_desc": {"text": "hello"}}
        ]);
        let merged = flatten_modules(Some(&modules));
        assert!(merged.contains_key("module_author"));
        assert_eq!(desc_text(merged.get("module_desc")), "hello");
    }

    #[test]
    fn test_draw_major_collects_images() {
        let mut feed = Feed::new("https://t.bilibili.com/1");
        let major = json!({
            "type": "MDL_DYN_TYPE_DRAW",
            "dyn_draw": {"items": [{"src": "https://i/1.jpg"}, {"src": "https://i/2.jpg"}]}
        });
        apply_major(&mut feed, &major, 0);
        assert_eq!(feed.media_urls.len(), 2);
        assert_eq!(feed.media_type, Some(MediaType::Image));
    }

    #[test]
    fn test_archive_major_takes_cover() {
        let mut feed = Feed::new("https://t.bilibili.com/1");
        let major = json!({
            "type": "MDL_DYN_TYPE_ARCHIVE",
            "dyn_archive": {"cover": "https://i/c.jpg", "aid": "170001", "title": "t"}
        });
        apply_major(&mut feed, &major, 0);
        assert_eq!(feed.media_urls, vec!["https://i/c.jpg"]);
    }

    #[test]
    fn test_forward_major_fills_forward_and_recurses_once() {
        let mut feed = Feed::new("https://t.bilibili.com/1");
        let major = json!({
            "type": "MDL_DYN_TYPE_FORWARD",
            "dyn_forward": {"item": {"modules": [
                {"module_author": {"user": {"name": "orig", "mid": 7}}},
                {"module_desc": {"text": "origin text"}},
                {"module_dynamic": {
                    "type": "MDL_DYN_TYPE_DRAW",
                    "dyn_draw": {"items": [{"src": "https://i/f.jpg"}]}
                }}
            ]}}
        });
        apply_major(&mut feed, &major, 0);
        let forward = feed.forward.as_ref().unwrap();
        assert_eq!(forward.user, "orig");
        assert_eq!(forward.uid, 7);
        assert_eq!(forward.content, "origin text");
        assert_eq!(feed.media_urls, vec!["https://i/f.jpg"]);
    }

    #[test]
    fn test_reply_target_mapping() {
        let item = |rtype: u64| {
            json!({"basic": {"rtype": rtype, "rid_str": "42"}})
        };
        assert_eq!(reply_target(&item(2)), Some((42, 11)));
        assert_eq!(reply_target(&item(64)), Some((42, 12)));
        assert_eq!(reply_target(&item(8)), Some((42, 1)));
        assert_eq!(reply_target(&item(4100)), Some((42, 1)));
        assert_eq!(reply_target(&item(4)), Some((42, 17)));
        assert_eq!(reply_target(&item(2050)), Some((42, 17)));
        assert_eq!(reply_target(&item(999_999)), None);
    }
}
