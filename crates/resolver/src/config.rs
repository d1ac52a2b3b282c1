use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Engine-wide knobs, environment-overridable the way the original
/// deployment expects.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// API prefixes tried in order; the official endpoint is always the
    /// final fallback.
    pub api_prefixes: Vec<String>,
    /// Optional UPOS CDN mirror domains for media probing.
    pub upos_domains: Vec<String>,
    /// Byte budget for a playable upload. Renditions at or above this are
    /// rejected.
    pub video_size_budget: u64,
    /// Audio at or above this size must be downloaded rather than relayed
    /// by URL.
    pub audio_raw_threshold: u64,
    /// Preferred DASH video codec prefix ("avc" unless overridden; hev/av01
    /// shrink files but break older clients).
    pub video_codec: String,
    /// Per-request timeout for upstream calls.
    pub http_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_prefixes: vec!["https://api.bilibili.com".to_string()],
            upos_domains: Vec::new(),
            video_size_budget: 50 * MIB,
            audio_raw_threshold: 20 * MIB,
            video_codec: "avc".to_string(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl ResolverConfig {
    /// Build a config from the environment: `BILI_API` (comma-separated
    /// prefixes), `UPOS_DOMAIN`, `VIDEO_SIZE_LIMIT`, `VIDEO_CODEC`, and
    /// `LOCAL_MODE` (raises both size limits to the local-server caps).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if std::env::var("LOCAL_MODE").is_ok_and(|v| !v.is_empty() && v != "0") {
            config.video_size_budget = 2000 * MIB;
            config.audio_raw_threshold = 2000 * MIB;
        }
        if let Ok(limit) = std::env::var("VIDEO_SIZE_LIMIT")
            && let Ok(limit) = limit.parse::<u64>()
        {
            config.video_size_budget = limit;
        }
        if let Ok(apis) = std::env::var("BILI_API") {
            let mut prefixes: Vec<String> = apis
                .split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            prefixes.extend(config.api_prefixes);
            config.api_prefixes = prefixes;
        }
        if let Ok(domains) = std::env::var("UPOS_DOMAIN") {
            config.upos_domains = domains
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(codec) = std::env::var("VIDEO_CODEC") {
            config.video_codec = codec;
        }
        config
    }
}
