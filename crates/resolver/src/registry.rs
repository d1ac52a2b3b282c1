//! URL classification: one ordered pass of shape rules, first match wins.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::client::BiliClient;
use crate::error::ResolveError;

/// Resolver variant a URL dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Video,
    Opus,
    Live,
    Audio,
    Article,
    /// Known non-content URL (API, blackboard, user space): no feed, no error.
    Ignored,
}

/// Classification result: the variant plus the URL it should parse, which is
/// the post-redirect canonical URL when a redirect hop was needed.
#[derive(Debug, Clone)]
pub struct Route {
    pub kind: RouteKind,
    pub url: String,
}

static SHORT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|/)(?:BV\w{10}|av\d+|ep\d+|ss\d+)").unwrap());
static OPUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:www|t|h|m)\.bilibili\.com/(?:[^/?]+/)*?(?:\d+)(?:[/?].*)?").unwrap()
});
static LIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"live\.bilibili\.com[/\w]*/(\d+)").unwrap());
static AUDIO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bilibili\.com/audio/au(\d+)").unwrap());
static READ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bilibili\.com/read/(?:cv|mobile/|mobile\?id=)(\d+)").unwrap());
static VIDEO_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"video|bangumi/play|festival").unwrap());
static NON_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:api|www\.bilibili\.com/blackboard|space\.bilibili\.com)").unwrap()
});

/// Make a raw input fetchable: bare short video ids go through `b23.tv`,
/// scheme-less URLs get one.
pub fn normalize_input(input: &str) -> String {
    let input = input.trim();
    if !input.contains('/') && SHORT_ID_RE.is_match(input) {
        return format!("https://b23.tv/{input}");
    }
    if input.starts_with("http:") || input.starts_with("https:") {
        input.to_string()
    } else {
        format!("http://{input}")
    }
}

/// Classifies an input URL into exactly one resolver variant.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolverRegistry;

impl ResolverRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Rules that need no network: explicit content-id shapes.
    fn classify_direct(url: &str) -> Option<RouteKind> {
        if SHORT_ID_RE.is_match(url) {
            Some(RouteKind::Video)
        } else if OPUS_RE.is_match(url) {
            Some(RouteKind::Opus)
        } else if LIVE_RE.is_match(url) {
            Some(RouteKind::Live)
        } else if AUDIO_RE.is_match(url) {
            Some(RouteKind::Audio)
        } else if READ_RE.is_match(url) {
            Some(RouteKind::Article)
        } else {
            None
        }
    }

    /// Rules applied to a canonical URL obtained after redirect resolution.
    fn classify_redirected(url: &str) -> Option<RouteKind> {
        if VIDEO_PATH_RE.is_match(url) {
            Some(RouteKind::Video)
        } else if OPUS_RE.is_match(url) {
            Some(RouteKind::Opus)
        } else if url.contains("live") {
            Some(RouteKind::Live)
        } else if url.contains("audio") {
            Some(RouteKind::Audio)
        } else if url.contains("read") {
            Some(RouteKind::Article)
        } else if NON_CONTENT_RE.is_match(url) {
            Some(RouteKind::Ignored)
        } else {
            None
        }
    }

    /// Classify a normalized URL, following redirects once when no direct
    /// rule matches (short links, app share links).
    pub async fn classify(&self, client: &BiliClient, url: &str) -> Result<Route, ResolveError> {
        if let Some(kind) = Self::classify_direct(url) {
            return Ok(Route {
                kind,
                url: url.to_string(),
            });
        }

        let resolved = client.resolve_redirect(url).await?;
        debug!(from = url, to = %resolved, "redirect resolved");
        match Self::classify_redirected(&resolved) {
            Some(kind) => Ok(Route {
                kind,
                url: resolved,
            }),
            None => Err(ResolveError::LinkFormat {
                url: url.to_string(),
            }),
        }
    }
}
