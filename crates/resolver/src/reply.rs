//! Comment-thread resolution.
//!
//! Comments are optional decoration on a feed: every failure path here
//! collapses to the empty thread instead of propagating.

use feed_types::{Reply, ReplyThread};
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::{cache_aside, ttl};
use crate::context::ResolverContext;
use crate::models::ReplyData;

pub struct ReplyResolver<'a> {
    ctx: &'a ResolverContext,
}

impl<'a> ReplyResolver<'a> {
    pub fn new(ctx: &'a ResolverContext) -> Self {
        Self { ctx }
    }

    /// Fetch the top replies for `(oid, reply_type)`, optionally seeking one
    /// target comment by id among top-level replies and their direct
    /// children (two levels, not deeper).
    pub async fn fetch(&self, oid: u64, reply_type: u32, seek_id: Option<u64>) -> ReplyThread {
        info!(oid, reply_type, ?seek_id, "resolving comment thread");
        let cache_key = match seek_id {
            Some(seek) => format!("reply:{oid}:{reply_type}:{seek}"),
            None => format!("reply:{oid}:{reply_type}"),
        };

        let ctx = self.ctx;
        let payload = cache_aside(ctx.cache.as_ref(), &cache_key, ttl::REPLY, || async {
            let mut params = vec![
                ("oid", oid.to_string()),
                ("type", reply_type.to_string()),
            ];
            if let Some(seek) = seek_id {
                params.push(("seek_rpid", seek.to_string()));
            }
            let response = ctx.client.api_get("/x/v2/reply/main", &params).await?;
            match response.get("data") {
                Some(data) if !data.is_null() => Ok(build_thread(data, seek_id)),
                _ => Ok(Value::Null),
            }
        })
        .await;

        match payload {
            Ok(value) => serde_json::from_value(value).unwrap_or_default(),
            Err(e) => {
                warn!(oid, reply_type, error = %e, "comment fetch failed, continuing without");
                ReplyThread::default()
            }
        }
    }
}

/// Reduce the upstream reply payload to the `{top, target}` shape we cache.
fn build_thread(data: &Value, seek_id: Option<u64>) -> Value {
    let parsed: ReplyData = serde_json::from_value(data.clone()).unwrap_or_default();
    let target = seek_id.and_then(|seek| find_reply(parsed.replies.as_deref(), seek));
    let thread = ReplyThread {
        top: parsed.top_replies.unwrap_or_default(),
        target,
    };
    serde_json::to_value(thread).unwrap_or(Value::Null)
}

fn find_reply(replies: Option<&[Reply]>, seek_id: u64) -> Option<Reply> {
    let replies = replies?;
    for reply in replies {
        if reply.rpid == seek_id {
            return Some(reply.clone());
        }
        for child in &reply.replies {
            if child.rpid == seek_id {
                return Some(child.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Value {
        json!({
            "top_replies": [
                {"rpid": 1, "member": {"uname": "a", "mid": 10}, "content": {"message": "top"}}
            ],
            "replies": [
                {"rpid": 2, "member": {"uname": "b", "mid": 20}, "content": {"message": "root"},
                 "replies": [
                    {"rpid": 3, "member": {"uname": "c", "mid": 30}, "content": {"message": "child"}}
                 ]}
            ]
        })
    }

    #[test]
    fn test_target_found_in_children() {
        let thread: ReplyThread = serde_json::from_value(build_thread(&tree(), Some(3))).unwrap();
        let target = thread.target.unwrap();
        assert_eq!(target.rpid, 3);
        assert_eq!(target.content.message, "child");
        assert_eq!(thread.top.len(), 1);
    }

    #[test]
    fn test_target_found_at_top_level() {
        let thread: ReplyThread = serde_json::from_value(build_thread(&tree(), Some(2))).unwrap();
        assert_eq!(thread.target.unwrap().rpid, 2);
    }

    #[test]
    fn test_missing_seek_id_yields_no_target() {
        let thread: ReplyThread = serde_json::from_value(build_thread(&tree(), Some(99))).unwrap();
        assert!(thread.target.is_none());
        assert_eq!(thread.top.len(), 1);
    }

    #[test]
    fn test_no_seek_id_keeps_top_only() {
        let thread: ReplyThread = serde_json::from_value(build_thread(&tree(), None)).unwrap();
        assert!(thread.target.is_none());
        assert_eq!(thread.top[0].rpid, 1);
    }
}
