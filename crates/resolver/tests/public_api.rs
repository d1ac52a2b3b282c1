//! Offline checks against the public crate surface.

use std::time::Duration;

use bili_resolver::{normalize_input, CacheStore, MemoryCache, ResolverConfig};
use feed_types::{Feed, MediaType};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("bili_resolver=debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn cache_store_round_trip_via_trait_object() {
    init_tracing();
    let cache: Box<dyn CacheStore> = Box::new(MemoryCache::new());
    assert!(
        cache
            .set_if_absent("video:aid:1", b"{}".to_vec(), Duration::from_secs(60))
            .await
            .unwrap()
    );
    assert_eq!(cache.get("video:aid:1").await.unwrap(), Some(b"{}".to_vec()));
    cache.delete("video:aid:1").await.unwrap();
    assert_eq!(cache.get("video:aid:1").await.unwrap(), None);
}

#[test]
fn normalization_is_stable() {
    // Normalizing an already-normalized input is a no-op, so deduplication
    // never depends on how many times an input went through the front door.
    for input in ["BV1xx411c7mD", "b23.tv/abc", "https://live.bilibili.com/6"] {
        let once = normalize_input(input);
        assert_eq!(normalize_input(&once), once);
    }
}

#[test]
fn default_config_is_usable() {
    let config = ResolverConfig::default();
    assert!(!config.api_prefixes.is_empty());
    assert!(config.video_size_budget > 0);
    assert_eq!(config.video_codec, "avc");
}

#[test]
fn feed_rendering_survives_serde() {
    let mut feed = Feed::new("https://www.bilibili.com/video/av170001?p=1");
    feed.user = "uploader".into();
    feed.uid = "2".into();
    feed.content = "hello [world]".into();
    feed.set_media(vec!["https://cdn/v.mp4".into()], MediaType::Video);

    let json = serde_json::to_string(&feed).unwrap();
    let back: Feed = serde_json::from_str(&json).unwrap();
    assert_eq!(back.content_markdown(), feed.content_markdown());
    assert_eq!(back.media_urls, feed.media_urls);
    assert_eq!(back.media_type, Some(MediaType::Video));
}
