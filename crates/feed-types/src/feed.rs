use serde::{Deserialize, Serialize};

use crate::markdown::{clean_tag_style, escape_markdown, filename, shrink_line, user_link};
use crate::reply::ReplyThread;

/// Message-caption budget shared with the delivery layer.
pub const CAPTION_LIMIT: usize = 1024;

/// Kind of media a feed carries. Absence (text-only feed) is `Option::None`
/// on [`Feed::media_type`]; a non-empty `media_urls` always has a kind.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
}

/// Pixel dimensions reported by upstream, including the rotation flag
/// vertical uploads use.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaDimension {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub rotate: u32,
}

/// Forwarded-post payload nested inside an opus feed. One level deep: a
/// forwarded post's own forward flag is not expanded further.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Forward {
    pub user: String,
    pub uid: u64,
    pub content: String,
}

/// Identifiers a resolved video carries alongside its canonical URL: the
/// numeric `aid`, the `BV` string form, and the `cid` of the selected part.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoIds {
    pub aid: u64,
    pub bvid: String,
    pub cid: u64,
}

/// Normalized record for one resolved share link.
///
/// Created empty by a resolver, filled progressively as upstream calls
/// succeed, and handed out as-is; a resolution that cannot complete its
/// primary metadata abandons the feed and returns an error value instead.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Feed {
    pub user: String,
    pub uid: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub media_type: Option<MediaType>,
    /// Media must be downloaded and re-uploaded rather than relayed by URL.
    pub media_raw: bool,
    pub media_thumb: Option<String>,
    /// Duration in seconds, when the media kind has one.
    pub media_duration: u64,
    pub media_dimension: MediaDimension,
    pub media_title: Option<String>,
    /// Reported byte size of the selected media, 0 when unknown.
    pub media_filesize: u64,
    /// Video identifiers, present only on video feeds.
    #[serde(default)]
    pub video_ids: Option<VideoIds>,
    /// Title/link block in MarkdownV2, already escaped.
    pub extra_markdown: String,
    pub forward: Option<Forward>,
    pub replies: ReplyThread,
    /// Canonical URL derived from the resolved identifier, never from the
    /// raw input string.
    pub url: String,
}

impl Feed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Replace the media references, keeping the kind in lockstep.
    pub fn set_media(&mut self, urls: Vec<String>, media_type: MediaType) {
        self.media_urls = urls;
        self.media_type = Some(media_type);
    }

    pub fn user_markdown(&self) -> String {
        user_link(&self.user, &self.uid)
    }

    /// Plain content with the forward block folded in.
    pub fn text(&self) -> String {
        let mut out = String::new();
        if let Some(forward) = &self.forward {
            if !forward.user.is_empty() {
                out.push_str(&format!("//@{}:\n", forward.user));
            }
            out.push_str(&forward.content);
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push_str(&self.content);
        shrink_line(&out)
    }

    /// Escaped MarkdownV2 content. For a forwarded post the inner text comes
    /// first with a `//@user:` attribution, then the outer commentary.
    pub fn content_markdown(&self) -> String {
        let mut out = String::new();
        if let Some(forward) = &self.forward {
            if forward.uid > 0 {
                out.push_str(&format!(
                    "//{}:\n",
                    user_link(&forward.user, &forward.uid.to_string())
                ));
            } else if !forward.user.is_empty() {
                out.push_str(&format!("//@{}:\n", escape_markdown(&forward.user)));
            }
            out.push_str(&escape_markdown(&forward.content));
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push_str(&escape_markdown(&self.content));
        if !out.ends_with('\n') {
            out.push('\n');
        }
        shrink_line(&out)
    }

    /// Plain-text rendering of the attached comment thread.
    pub fn comment(&self) -> String {
        let mut out = String::new();
        if let Some(target) = &self.replies.target {
            out.push_str(&format!(
                "💬> @{}:\n{}\n",
                target.member.uname, target.content.message
            ));
        }
        for item in &self.replies.top {
            out.push_str(&format!(
                "🔝> @{}:\n{}\n",
                item.member.uname, item.content.message
            ));
        }
        shrink_line(&out)
    }

    /// MarkdownV2 rendering of the attached comment thread.
    pub fn comment_markdown(&self) -> String {
        let mut out = String::new();
        if let Some(target) = &self.replies.target {
            out.push_str(&format!(
                "💬\\> {}:\n{}\n",
                user_link(&target.member.uname, &target.member.mid.to_string()),
                escape_markdown(&target.content.message)
            ));
        }
        for item in &self.replies.top {
            out.push_str(&format!(
                "🔝\\> {}:\n{}\n",
                user_link(&item.member.uname, &item.member.mid.to_string()),
                escape_markdown(&item.content.message)
            ));
        }
        shrink_line(&out)
    }

    /// Full MarkdownV2 caption: title link, author, then content and
    /// comments as expandable quotes, stopping before the budget is blown.
    pub fn caption(&self) -> String {
        let mut out = if self.extra_markdown.is_empty() {
            format!("{}\n", escape_markdown(&self.url))
        } else {
            format!("{}\n", self.extra_markdown)
        };
        let user_markdown = self.user_markdown();
        if !user_markdown.is_empty() && !append_within_limit(&mut out, &format!("{user_markdown}:"))
        {
            return out;
        }
        for block in [self.content_markdown(), self.comment_markdown()] {
            if block.is_empty() {
                continue;
            }
            let quoted = format!(
                "\n**>{}||",
                clean_tag_style(&block).replace('\n', "\n>")
            );
            if !append_within_limit(&mut out, &quoted) {
                return out;
            }
        }
        out
    }

    pub fn media_filenames(&self) -> Vec<String> {
        self.media_urls.iter().map(|u| filename(u)).collect()
    }

    pub fn thumb_filename(&self) -> Option<String> {
        self.media_thumb.as_deref().map(filename)
    }
}

fn append_within_limit(out: &mut String, block: &str) -> bool {
    if out.len() + block.len() < CAPTION_LIMIT {
        out.push_str(block);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::{Reply, ReplyContent, ReplyMember};

    #[test]
    fn test_content_markdown_plain() {
        let mut feed = Feed::new("https://t.bilibili.com/1");
        feed.content = "hello_world".into();
        assert_eq!(feed.content_markdown(), "hello\\_world");
    }

    #[test]
    fn test_content_markdown_forward_order() {
        let mut feed = Feed::new("https://t.bilibili.com/1");
        feed.content = "Y".into();
        feed.forward = Some(Forward {
            user: "A".into(),
            uid: 0,
            content: "X".into(),
        });
        let md = feed.content_markdown();
        assert!(md.starts_with("//@A:\nX"), "got {md:?}");
        assert!(md.ends_with('Y'), "got {md:?}");
    }

    #[test]
    fn test_content_markdown_forward_with_uid_links_user() {
        let mut feed = Feed::new("https://t.bilibili.com/1");
        feed.content = "outer".into();
        feed.forward = Some(Forward {
            user: "A".into(),
            uid: 9,
            content: "inner".into(),
        });
        let md = feed.content_markdown();
        assert!(md.starts_with("//[@A](https://space.bilibili.com/9):\ninner"));
    }

    #[test]
    fn test_video_ids_round_trip_and_default_absent() {
        let mut feed = Feed::new("https://www.bilibili.com/video/av170001?p=1");
        feed.video_ids = Some(VideoIds {
            aid: 170001,
            bvid: "BV17x411w7KC".into(),
            cid: 279786,
        });
        let json = serde_json::to_string(&feed).unwrap();
        let back: Feed = serde_json::from_str(&json).unwrap();
        assert_eq!(back.video_ids, feed.video_ids);

        // Records serialized before the field existed read back as None.
        let mut legacy_json: serde_json::Value = serde_json::from_str(&json).unwrap();
        legacy_json.as_object_mut().unwrap().remove("video_ids");
        let legacy: Feed = serde_json::from_value(legacy_json).unwrap();
        assert!(legacy.video_ids.is_none());
    }

    #[test]
    fn test_media_invariant_helper() {
        let mut feed = Feed::new("https://live.bilibili.com/6");
        feed.set_media(vec!["https://x/cover.jpg".into()], MediaType::Image);
        assert!(!feed.media_urls.is_empty());
        assert_eq!(feed.media_type, Some(MediaType::Image));
    }

    #[test]
    fn test_comment_markdown_orders_target_first() {
        let mut feed = Feed::new("https://www.bilibili.com/video/av1");
        feed.replies = ReplyThread {
            top: vec![Reply {
                rpid: 1,
                member: ReplyMember {
                    uname: "top".into(),
                    mid: 1,
                },
                content: ReplyContent {
                    message: "t".into(),
                },
                replies: vec![],
            }],
            target: Some(Reply {
                rpid: 2,
                member: ReplyMember {
                    uname: "sought".into(),
                    mid: 2,
                },
                content: ReplyContent {
                    message: "s".into(),
                },
                replies: vec![],
            }),
        };
        let md = feed.comment_markdown();
        let target_at = md.find("sought").unwrap();
        let top_at = md.find("top").unwrap();
        assert!(target_at < top_at);
    }

    #[test]
    fn test_caption_composition_and_budget() {
        let mut feed = Feed::new("https://t.bilibili.com/1");
        feed.user = "poster".into();
        feed.uid = "9".into();
        feed.content = "#tag# body".into();
        feed.extra_markdown = "[poster的动态](https://t.bilibili.com/1)".into();
        let caption = feed.caption();
        assert!(caption.starts_with("[poster的动态](https://t.bilibili.com/1)\n"));
        assert!(caption.contains("[@poster](https://space.bilibili.com/9):"));
        // Tag style refined inside the quote block.
        assert!(caption.contains(r"\#tag "), "got {caption:?}");
        assert!(!caption.contains(r"\#tag\#"), "got {caption:?}");

        feed.content = "长".repeat(CAPTION_LIMIT);
        let capped = feed.caption();
        assert!(capped.len() < CAPTION_LIMIT);
        assert!(!capped.contains("**>"));
    }

    #[test]
    fn test_caption_falls_back_to_escaped_url() {
        let mut feed = Feed::new("https://live.bilibili.com/6?x=1");
        feed.extra_markdown.clear();
        assert!(feed.caption().starts_with("https://live\\.bilibili\\.com/6?x\\=1\n"));
    }

    #[test]
    fn test_media_filenames() {
        let mut feed = Feed::new("u");
        feed.set_media(
            vec!["https://cdn/abc.mp4?sig=1".into(), "https://cdn/def.m4a".into()],
            MediaType::Video,
        );
        assert_eq!(feed.media_filenames(), vec!["abc.mp4", "def.m4a"]);
    }
}
