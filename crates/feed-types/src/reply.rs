use serde::{Deserialize, Serialize};

/// Author of a single comment.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ReplyMember {
    #[serde(default)]
    pub uname: String,
    #[serde(default)]
    pub mid: u64,
}

/// Body of a single comment.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ReplyContent {
    #[serde(default)]
    pub message: String,
}

/// One comment, with its direct children (upstream nests exactly one level).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Reply {
    #[serde(default)]
    pub rpid: u64,
    #[serde(default)]
    pub member: ReplyMember,
    #[serde(default)]
    pub content: ReplyContent,
    #[serde(default)]
    pub replies: Vec<Reply>,
}

/// Resolved comment thread attached to a feed: pinned/top replies plus an
/// optionally sought-out target comment. Always optional decoration; the
/// empty thread is the failure mode.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ReplyThread {
    #[serde(default)]
    pub top: Vec<Reply>,
    #[serde(default)]
    pub target: Option<Reply>,
}

impl ReplyThread {
    pub fn is_empty(&self) -> bool {
        self.top.is_empty() && self.target.is_none()
    }
}
