//! The five feed resolver variants, one module per upstream content shape.

pub(crate) mod article;
pub(crate) mod audio;
pub(crate) mod live;
pub(crate) mod opus;
pub(crate) mod video;

use async_trait::async_trait;
use feed_types::Feed;

use crate::error::ResolveError;

/// One resolver variant: raw URL in, populated feed or error value out.
#[async_trait]
pub(crate) trait FeedResolver {
    async fn resolve(&self) -> Result<Feed, ResolveError>;
}

/// Compact count display: 12345 -> "1.23万".
pub(crate) fn wan(num: u64) -> String {
    if num >= 10_000 {
        format!("{:.2}万", num as f64 / 10_000.0)
    } else {
        num.to_string()
    }
}

/// `H:MM:SS`, hours unpadded.
pub(crate) fn fmt_duration(secs: u64) -> String {
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wan() {
        assert_eq!(wan(9_999), "9999");
        assert_eq!(wan(12_345), "1.23万");
    }

    #[test]
    fn test_fmt_duration() {
        assert_eq!(fmt_duration(330), "0:05:30");
        assert_eq!(fmt_duration(3_725), "1:02:05");
    }
}
