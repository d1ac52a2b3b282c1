//! Column-article resolver.
//!
//! Articles carry their state embedded in the page HTML rather than behind a
//! JSON API. The body is too long for a caption, so it is re-published to
//! the mirror and the feed links the permalink; both the page state and the
//! permalink are cached independently.

use std::sync::LazyLock;

use feed_types::{markdown::escape_markdown, Feed, MediaType};
use regex::Regex;
use serde_json::{json, Value};
use tracing::info;

use super::FeedResolver;
use crate::cache::{cache_aside, ttl};
use crate::context::ResolverContext;
use crate::error::ResolveError;
use crate::publish::PageDraft;
use crate::reply::ReplyResolver;

pub static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bilibili\.com/read/(?:cv|mobile/|mobile\?id=)(\d+)").unwrap());

static INITIAL_STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"window\.__INITIAL_STATE__=(.*?);\(function\(\)").unwrap()
});
static IMG_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<img[^>]*?(?:data-)?src="([^"]+)""#).unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Upstream reply namespace for articles.
const REPLY_TYPE: u32 = 12;

pub(crate) struct ArticleResolver<'a> {
    ctx: &'a ResolverContext,
    raw_url: String,
}

impl<'a> ArticleResolver<'a> {
    pub fn new(ctx: &'a ResolverContext, raw_url: impl Into<String>) -> Self {
        Self {
            ctx,
            raw_url: raw_url.into(),
        }
    }

    fn extract_read_id(&self) -> Result<u64, ResolveError> {
        URL_REGEX
            .captures(&self.raw_url)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| ResolveError::LinkFormat {
                url: self.raw_url.clone(),
            })
    }

    /// Mirror permalink for the article body, cached per article so repeat
    /// shares never re-publish.
    async fn mirror_url(
        &self,
        read_id: u64,
        read_info: &Value,
        feed: &Feed,
    ) -> Result<String, ResolveError> {
        let ctx = self.ctx;
        let payload = cache_aside(
            ctx.cache.as_ref(),
            &format!("read:graphurl:{read_id}"),
            ttl::READ,
            || async move {
                let body = read_info
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let author_url = format!("https://space.bilibili.com/{}", feed.uid);
                let draft = PageDraft {
                    title: feed.media_title.as_deref().unwrap_or_default(),
                    author_name: &feed.user,
                    author_url: &author_url,
                    nodes: article_nodes(body),
                };
                ctx.publisher.publish(draft).await.map(Value::String)
            },
        )
        .await?;
        payload
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ResolveError::shape(self.raw_url.clone(), "bad cached mirror url"))
    }
}

#[async_trait::async_trait]
impl FeedResolver for ArticleResolver<'_> {
    async fn resolve(&self) -> Result<Feed, ResolveError> {
        info!(url = %self.raw_url, "resolving article");
        let read_id = self.extract_read_id()?;
        let url = format!("https://www.bilibili.com/read/cv{read_id}");

        let ctx = self.ctx;
        let raw_url = self.raw_url.clone();
        let page_url = url.clone();
        let state = cache_aside(
            ctx.cache.as_ref(),
            &format!("read:page:{read_id}"),
            ttl::READ,
            || async move {
                let page = ctx.client.get_text(&page_url).await?;
                extract_initial_state(&page).ok_or_else(|| {
                    ResolveError::shape(raw_url, format!("no page state for cv{read_id}"))
                })
            },
        )
        .await?;

        let read_info = state.get("readInfo").cloned().ok_or_else(|| {
            ResolveError::shape_with_payload(self.raw_url.clone(), "no readInfo", &state)
        })?;

        let mut feed = Feed::new(url);
        if let Some(author) = read_info.get("author") {
            feed.user = author
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            feed.uid = author
                .get("mid")
                .and_then(Value::as_u64)
                .unwrap_or(0)
                .to_string();
        }
        feed.content = read_info
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        feed.media_title = read_info
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(images) = article_images(&read_info) {
            feed.set_media(images, MediaType::Image);
        }

        let mirror = self.mirror_url(read_id, &read_info, &feed).await?;
        feed.extra_markdown = format!(
            "[{}]({mirror})",
            escape_markdown(feed.media_title.as_deref().unwrap_or_default())
        );

        feed.replies = ReplyResolver::new(ctx).fetch(read_id, REPLY_TYPE, None).await;
        Ok(feed)
    }
}

/// Pull the embedded `window.__INITIAL_STATE__` object out of the page.
fn extract_initial_state(page: &str) -> Option<Value> {
    let raw = INITIAL_STATE_RE.captures(page)?.get(1)?.as_str();
    serde_json::from_str(raw).ok()
}

/// Banner first, image list otherwise.
fn article_images(read_info: &Value) -> Option<Vec<String>> {
    if let Some(banner) = read_info
        .get("banner_url")
        .and_then(Value::as_str)
        .filter(|b| !b.is_empty())
    {
        return Some(vec![banner.to_string()]);
    }
    let urls: Vec<String> = read_info
        .get("image_urls")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    (!urls.is_empty()).then_some(urls)
}

/// Convert an article body into mirror page nodes.
///
/// New-style bodies are delta JSON; their first op's insert text becomes one
/// paragraph per line. Legacy bodies are HTML; images keep their sources and
/// everything else is flattened to text paragraphs.
fn article_nodes(body: &str) -> Vec<Value> {
    if let Ok(delta) = serde_json::from_str::<Value>(body) {
        if let Some(insert) = delta
            .pointer("/ops/0/insert")
            .and_then(Value::as_str)
        {
            return insert.split('\n').map(|line| json!(line)).collect();
        }
    }
    html_nodes(body)
}

fn html_nodes(body: &str) -> Vec<Value> {
    let mut nodes = Vec::new();
    for caps in IMG_SRC_RE.captures_iter(body) {
        nodes.push(json!({"tag": "img", "attrs": {"src": &caps[1]}}));
    }
    for line in TAG_RE.replace_all(body, "\n").split('\n') {
        let line = line.trim();
        if !line.is_empty() {
            nodes.push(json!({"tag": "p", "children": [line]}));
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_id_extraction() {
        let id = |url: &str| {
            URL_REGEX
                .captures(url)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        };
        assert_eq!(
            id("https://www.bilibili.com/read/cv5041424"),
            Some("5041424".into())
        );
        assert_eq!(
            id("https://www.bilibili.com/read/mobile/5041424"),
            Some("5041424".into())
        );
        assert_eq!(
            id("https://www.bilibili.com/read/mobile?id=5041424"),
            Some("5041424".into())
        );
        assert_eq!(id("https://www.bilibili.com/video/av1"), None);
    }

    #[test]
    fn test_extract_initial_state() {
        let page = r#"<script>window.__INITIAL_STATE__={"readInfo":{"title":"t"}};(function(){}())</script>"#;
        let state = extract_initial_state(page).unwrap();
        assert_eq!(state.pointer("/readInfo/title").unwrap(), "t");
        assert!(extract_initial_state("<html></html>").is_none());
    }

    #[test]
    fn test_article_images_prefers_banner() {
        let info = serde_json::json!({
            "banner_url": "https://i/b.jpg",
            "image_urls": ["https://i/1.jpg"]
        });
        assert_eq!(article_images(&info), Some(vec!["https://i/b.jpg".into()]));
        let info = serde_json::json!({"banner_url": "", "image_urls": ["https://i/1.jpg"]});
        assert_eq!(article_images(&info), Some(vec!["https://i/1.jpg".into()]));
        assert_eq!(article_images(&serde_json::json!({})), None);
    }

    #[test]
    fn test_article_nodes_from_delta_json() {
        let body = r#"{"ops":[{"insert":"line one\nline two"}]}"#;
        let nodes = article_nodes(body);
        assert_eq!(nodes, vec![json!("line one"), json!("line two")]);
    }

    #[test]
    fn test_article_nodes_from_html() {
        let body = r#"<h1>Title</h1><p>Body text</p><img data-src="https://i/x.jpg">"#;
        let nodes = article_nodes(body);
        assert!(nodes.contains(&json!({"tag": "img", "attrs": {"src": "https://i/x.jpg"}})));
        assert!(nodes.contains(&json!({"tag": "p", "children": ["Title"]})));
        assert!(nodes.contains(&json!({"tag": "p", "children": ["Body text"]})));
    }
}
