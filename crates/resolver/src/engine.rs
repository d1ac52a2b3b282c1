//! Engine façade: classify, dispatch, and fan out over many inputs at once.

use futures::future::join_all;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use feed_types::Feed;

use crate::config::ResolverConfig;
use crate::context::ResolverContext;
use crate::error::ResolveError;
use crate::registry::{normalize_input, ResolverRegistry, RouteKind};
use crate::resolvers::article::ArticleResolver;
use crate::resolvers::audio::AudioResolver;
use crate::resolvers::live::LiveResolver;
use crate::resolvers::opus::OpusResolver;
use crate::resolvers::video::VideoResolver;
use crate::resolvers::FeedResolver;

/// Outcome of one input URL.
#[derive(Debug, Clone)]
pub enum Resolution {
    Feed(Box<Feed>),
    /// Recognized non-content URL (API, blackboard, user space). Not an
    /// error: there is simply nothing to render.
    Skipped,
    Failed(ResolveError),
}

impl Resolution {
    pub fn as_feed(&self) -> Option<&Feed> {
        match self {
            Resolution::Feed(feed) => Some(feed),
            _ => None,
        }
    }
}

/// Entry point: one engine per process, shared across requests.
pub struct FeedEngine {
    ctx: ResolverContext,
    registry: ResolverRegistry,
}

impl FeedEngine {
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_context(ResolverContext::new(config))
    }

    pub fn with_context(ctx: ResolverContext) -> Self {
        Self {
            ctx,
            registry: ResolverRegistry::new(),
        }
    }

    pub fn context(&self) -> &ResolverContext {
        &self.ctx
    }

    /// Resolve one input, raw or normalized.
    pub async fn resolve(&self, input: &str) -> Resolution {
        let url = normalize_input(input);
        let route = match self.registry.classify(&self.ctx.client, &url).await {
            Ok(route) => route,
            Err(e) => {
                warn!(input, error = %e, "classification failed");
                return Resolution::Failed(e);
            }
        };

        let outcome = match route.kind {
            RouteKind::Ignored => {
                info!(url = %route.url, "non-content url, skipping");
                return Resolution::Skipped;
            }
            RouteKind::Video => VideoResolver::new(&self.ctx, &route.url).resolve().await,
            RouteKind::Opus => OpusResolver::new(&self.ctx, &route.url).resolve().await,
            RouteKind::Live => LiveResolver::new(&self.ctx, &route.url).resolve().await,
            RouteKind::Audio => AudioResolver::new(&self.ctx, &route.url).resolve().await,
            RouteKind::Article => ArticleResolver::new(&self.ctx, &route.url).resolve().await,
        };
        match outcome {
            Ok(feed) => Resolution::Feed(Box::new(feed)),
            Err(e) => {
                warn!(url = %route.url, error = %e, "resolution failed");
                Resolution::Failed(e)
            }
        }
    }

    /// Resolve a batch concurrently.
    ///
    /// Outputs keep the input order, one per input. Duplicate inputs (after
    /// normalization) are resolved once and the outcome is copied into every
    /// matching slot.
    pub async fn resolve_all<S: AsRef<str>>(&self, inputs: &[S]) -> Vec<Resolution> {
        let (unique, slots) = dedupe_inputs(inputs);
        let outcomes = join_all(unique.iter().map(|url| self.resolve(url))).await;
        slots.into_iter().map(|i| outcomes[i].clone()).collect()
    }
}

/// Normalized unique inputs plus, per original input, the index of its
/// unique representative.
fn dedupe_inputs<S: AsRef<str>>(inputs: &[S]) -> (Vec<String>, Vec<usize>) {
    let mut unique = Vec::new();
    let mut seen: FxHashMap<String, usize> = FxHashMap::default();
    let mut slots = Vec::with_capacity(inputs.len());
    for input in inputs {
        let url = normalize_input(input.as_ref());
        let index = *seen.entry(url.clone()).or_insert_with(|| {
            unique.push(url);
            unique.len() - 1
        });
        slots.push(index);
    }
    (unique, slots)
}
