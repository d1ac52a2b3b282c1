//! Pure text helpers for Telegram-flavoured MarkdownV2 output.

use regex::Regex;
use std::sync::LazyLock;

static ESCAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([_*\[\]()~`>\#\+\-=|{}\.!\\])").unwrap());

// Inner text is anything but an escaped `#`: plain chars, or a backslash
// followed by a non-`#`.
static CN_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\#((?:[^\\]|\\[^#])+?)\\#").unwrap());

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/([^/]*\.\w{3,4})(?:$|\?)").unwrap());

/// Unescape the handful of HTML entities upstream text actually contains.
fn unescape_html(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Escape text for MarkdownV2, unescaping HTML entities first.
pub fn escape_markdown(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    ESCAPE_RE
        .replace_all(&unescape_html(text), r"\$1")
        .into_owned()
}

/// Collapse CRLF pairs and blank runs, trimming surrounding whitespace.
pub fn shrink_line(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    text.trim().replace("\r\n", "\n").replace("\n\n", "\n")
}

/// Refine cn tag style display: `#abc#` -> `#abc` (on escaped text).
pub fn clean_tag_style(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    CN_TAG_RE.replace_all(content, r"\#$1 ").into_owned()
}

/// `[@user](https://space.bilibili.com/{uid})`, empty when either part is missing.
pub fn user_link(user: &str, uid: &str) -> String {
    if user.is_empty() || uid.is_empty() {
        return String::new();
    }
    format!(
        "[@{}](https://space.bilibili.com/{uid})",
        escape_markdown(user)
    )
}

/// Extract the trailing file name from a media URL, falling back to the URL itself.
pub fn filename(url: &str) -> String {
    FILENAME_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| url.to_string(), |m| m.as_str().to_string())
}
