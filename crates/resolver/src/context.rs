use std::sync::Arc;

use crate::cache::{CacheStore, MemoryCache};
use crate::client::BiliClient;
use crate::config::ResolverConfig;
use crate::publish::{Publisher, TelegraphPublisher};

/// Shared collaborators handed into every resolver call.
///
/// Passed explicitly instead of living in globals so tests can swap the
/// cache or the publisher per instance.
#[derive(Clone)]
pub struct ResolverContext {
    pub client: BiliClient,
    pub cache: Arc<dyn CacheStore>,
    pub config: Arc<ResolverConfig>,
    pub publisher: Arc<dyn Publisher>,
}

impl ResolverContext {
    pub fn new(config: ResolverConfig) -> Self {
        let client = BiliClient::new(&config);
        Self {
            client,
            cache: Arc::new(MemoryCache::new()),
            config: Arc::new(config),
            publisher: Arc::new(TelegraphPublisher::from_env()),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }
}
