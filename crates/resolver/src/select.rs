//! Adaptive rendition selection for video feeds.
//!
//! Two stages, progressive first: walk the progressive quality tiers in
//! strictly descending order and take the first rendition that is both under
//! the byte budget and reachable; then make one DASH attempt with a higher
//! quality ceiling, which replaces the progressive pick when a qualifying
//! audio/video pair exists. Exhausting both stages is not an error; the
//! feed keeps the cover thumbnail as its media.

use tracing::{error, info};

use crate::context::ResolverContext;
use crate::models::{DashStreams, DashTrack, Durl, PlayData};

/// Progressive tiers probed in order: 720p, 480p, 360p.
const PROGRESSIVE_TIERS: [u32; 3] = [64, 32, 16];

/// Quality ceiling for the DASH manifest request.
const DASH_QN_CEILING: u32 = 125;

const PLAYURL_PATH: &str = "/x/player/playurl";

/// Outcome of stream selection.
#[derive(Debug, Clone)]
pub(crate) struct SelectedStream {
    /// One progressive URL, or `[video, audio]` DASH track URLs.
    pub urls: Vec<String>,
    /// DASH pairs must be downloaded and muxed; progressive can be relayed.
    pub raw: bool,
    /// Playback seconds, when the playurl payload reports them.
    pub duration: Option<u64>,
    pub size: u64,
}

pub(crate) struct StreamSelector<'a> {
    ctx: &'a ResolverContext,
}

impl<'a> StreamSelector<'a> {
    pub fn new(ctx: &'a ResolverContext) -> Self {
        Self { ctx }
    }

    /// Run both stages for `(aid, cid)`. `referer` is the canonical video
    /// URL; rendition CDNs reject probes without it.
    pub async fn select(&self, aid: u64, cid: u64, referer: &str) -> Option<SelectedStream> {
        let progressive = self.probe_progressive(aid, cid, referer).await;
        match self.probe_dash(aid, cid, referer).await {
            Some(mut dash) => {
                // Keep the better duration estimate from the progressive stage.
                if dash.duration.is_none() {
                    dash.duration = progressive.as_ref().and_then(|p| p.duration);
                }
                Some(dash)
            }
            None => progressive,
        }
    }

    async fn fetch_play_data(&self, params: &[(&str, String)]) -> Option<PlayData> {
        let response = match self.ctx.client.api_get(PLAYURL_PATH, params).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "playurl request failed");
                return None;
            }
        };
        match response.get("data") {
            Some(data) if !data.is_null() => serde_json::from_value(data.clone())
                .map_err(|e| error!(error = %e, "undecodable playurl payload"))
                .ok(),
            _ => None,
        }
    }

    /// Walk tiers descending; first under-budget, reachable rendition wins.
    async fn probe_progressive(
        &self,
        aid: u64,
        cid: u64,
        referer: &str,
    ) -> Option<SelectedStream> {
        for qn in PROGRESSIVE_TIERS {
            let params = [
                ("avid", aid.to_string()),
                ("cid", cid.to_string()),
                ("qn", qn.to_string()),
            ];
            let Some(data) = self.fetch_play_data(&params).await else {
                continue;
            };
            let Some(durl) = progressive_candidate(&data, self.ctx.config.video_size_budget)
            else {
                continue;
            };
            if let Some(url) = self.first_reachable(durl, referer).await {
                info!(qn, size = durl.size, "selected progressive rendition");
                return Some(SelectedStream {
                    urls: vec![url],
                    raw: false,
                    duration: Some(durl.length.div_ceil(1000)),
                    size: durl.size,
                });
            }
        }
        None
    }

    /// Probe the primary URL, then its backups, returning the first that
    /// answers 2xx.
    async fn first_reachable(&self, durl: &Durl, referer: &str) -> Option<String> {
        let (size, url) = self.ctx.client.probe(&durl.url, referer).await;
        if size > 0 {
            return Some(url);
        }
        for backup in durl.backup_url.as_deref().unwrap_or_default() {
            let (size, url) = self.ctx.client.probe(backup, referer).await;
            if size > 0 {
                return Some(url);
            }
        }
        None
    }

    /// One DASH attempt: first reachable audio, then the best video whose
    /// combined probed size stays under budget.
    async fn probe_dash(&self, aid: u64, cid: u64, referer: &str) -> Option<SelectedStream> {
        let params = [
            ("avid", aid.to_string()),
            ("cid", cid.to_string()),
            ("qn", DASH_QN_CEILING.to_string()),
            ("fnver", "0".to_string()),
            ("fnval", "4048".to_string()),
            ("fourk", "1".to_string()),
            ("voice_balance", "1".to_string()),
        ];
        let data = self.fetch_play_data(&params).await?;
        let Some(dash) = data.dash else {
            return None;
        };
        let (video_tracks, audio_tracks) = sorted_tracks(&dash, &self.ctx.config.video_codec);
        if video_tracks.is_empty() || audio_tracks.is_empty() {
            error!("no usable dash tracks");
            return None;
        }

        let mut chosen_audio = None;
        for track in audio_tracks {
            let (size, url) = self.ctx.client.probe(&track.base_url, referer).await;
            if size > 0 {
                chosen_audio = Some((size, url));
                break;
            }
        }
        let (audio_size, audio_url) = chosen_audio?;

        for track in video_tracks {
            let (video_size, video_url) = self.ctx.client.probe(&track.base_url, referer).await;
            if video_size > 0 && audio_size + video_size < self.ctx.config.video_size_budget {
                info!(
                    quality = track.id,
                    size = audio_size + video_size,
                    "selected dash pair"
                );
                return Some(SelectedStream {
                    urls: vec![video_url, audio_url],
                    raw: true,
                    duration: None,
                    size: audio_size + video_size,
                });
            }
        }
        None
    }
}

/// The single progressive rendition, if its reported size fits the budget.
fn progressive_candidate(data: &PlayData, budget: u64) -> Option<&Durl> {
    data.durl
        .first()
        .filter(|durl| durl.size > 0 && durl.size < budget)
}

/// Codec-filtered video tracks and all audio tracks, each sorted by quality
/// id descending.
fn sorted_tracks<'d>(
    dash: &'d DashStreams,
    codec_prefix: &str,
) -> (Vec<&'d DashTrack>, Vec<&'d DashTrack>) {
    let mut video: Vec<&DashTrack> = dash
        .video
        .iter()
        .filter(|t| t.codecs.starts_with(codec_prefix))
        .collect();
    video.sort_by(|a, b| b.id.cmp(&a.id));
    let mut audio: Vec<&DashTrack> = dash.audio.iter().collect();
    audio.sort_by(|a, b| b.id.cmp(&a.id));
    (video, audio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn play_data(size: u64) -> PlayData {
        serde_json::from_value::<PlayData>(json!({
            "durl": [{"url": "https://cdn/v.mp4", "size": size, "length": 65_500}]
        }))
        .unwrap()
    }

    #[test]
    fn test_progressive_candidate_respects_budget() {
        assert!(progressive_candidate(&play_data(100), 101).is_some());
        assert!(progressive_candidate(&play_data(100), 100).is_none());
        assert!(progressive_candidate(&play_data(0), 100).is_none());
    }

    #[test]
    fn test_tier_order_is_strictly_descending() {
        assert!(PROGRESSIVE_TIERS.windows(2).all(|w| w[0] > w[1]));
        assert!(DASH_QN_CEILING > PROGRESSIVE_TIERS[0]);
    }

    #[test]
    fn test_sorted_tracks_filters_codec_and_sorts_desc() {
        let dash: DashStreams = serde_json::from_value(json!({
            "video": [
                {"id": 32, "baseUrl": "https://cdn/v32.m4s", "codecs": "avc1.64001F"},
                {"id": 80, "baseUrl": "https://cdn/v80h.m4s", "codecs": "hev1.1.6"},
                {"id": 64, "baseUrl": "https://cdn/v64.m4s", "codecs": "avc1.640028"}
            ],
            "audio": [
                {"id": 30216, "baseUrl": "https://cdn/a-lo.m4s"},
                {"id": 30280, "baseUrl": "https://cdn/a-hi.m4s"}
            ]
        }))
        .unwrap();
        let (video, audio) = sorted_tracks(&dash, "avc");
        assert_eq!(
            video.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![64, 32]
        );
        assert_eq!(audio[0].id, 30280);
    }

    #[test]
    fn test_duration_rounds_up_from_millis() {
        let data = play_data(10);
        assert_eq!(data.durl[0].length.div_ceil(1000), 66);
    }
}
