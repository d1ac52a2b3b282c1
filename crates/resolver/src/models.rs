//! Typed views over the upstream JSON payloads.
//!
//! Only the closed, load-bearing shapes get structs; open-ended payloads
//! (the opus module list, the article initial state) stay `serde_json::Value`
//! and are walked defensively where they are consumed.

#![allow(dead_code)]

use feed_types::Reply;
use serde::Deserialize;

#[derive(Deserialize, Debug, Default)]
pub(crate) struct Owner {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mid: u64,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct Dimension {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub rotate: u32,
}

#[derive(Deserialize, Debug)]
pub(crate) struct VideoPage {
    pub page: u32,
    pub cid: u64,
    #[serde(default)]
    pub dimension: Dimension,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct VideoStat {
    #[serde(default)]
    pub view: u64,
    #[serde(default)]
    pub danmaku: u64,
    #[serde(default)]
    pub reply: u64,
    #[serde(default)]
    pub like: u64,
    #[serde(default)]
    pub coin: u64,
    #[serde(default)]
    pub favorite: u64,
    #[serde(default)]
    pub share: u64,
    #[serde(default)]
    pub now_rank: u64,
    #[serde(default)]
    pub his_rank: u64,
}

/// `/x/web-interface/view` data.
#[derive(Deserialize, Debug)]
pub(crate) struct VideoDetail {
    pub aid: u64,
    pub bvid: String,
    pub cid: u64,
    pub title: String,
    pub pic: String,
    #[serde(default)]
    pub owner: Owner,
    #[serde(default)]
    pub pages: Vec<VideoPage>,
    #[serde(default)]
    pub stat: VideoStat,
    #[serde(default)]
    pub tname: Option<String>,
    #[serde(default)]
    pub tname_v2: Option<String>,
    #[serde(default)]
    pub pubdate: Option<i64>,
    #[serde(default)]
    pub ctime: Option<i64>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub dynamic: Option<String>,
}

/// One episode inside a season payload.
#[derive(Deserialize, Debug)]
pub(crate) struct Episode {
    pub id: u64,
    #[serde(default)]
    pub aid: u64,
    #[serde(default)]
    pub bvid: String,
    #[serde(default)]
    pub cid: u64,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct SeasonSection {
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

/// `/pgc/view/web/season` result.
#[derive(Deserialize, Debug)]
pub(crate) struct SeasonResult {
    pub season_id: u64,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub section: Vec<SeasonSection>,
}

/// One progressive rendition from `/x/player/playurl`.
#[derive(Deserialize, Debug)]
pub(crate) struct Durl {
    pub url: String,
    #[serde(default)]
    pub size: u64,
    /// Milliseconds.
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub backup_url: Option<Vec<String>>,
}

/// One DASH track (audio or video).
#[derive(Deserialize, Debug)]
pub(crate) struct DashTrack {
    /// Quality tier id; higher is better within a track kind.
    pub id: u32,
    #[serde(rename = "baseUrl", alias = "base_url")]
    pub base_url: String,
    #[serde(default)]
    pub codecs: String,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct DashStreams {
    #[serde(default)]
    pub video: Vec<DashTrack>,
    #[serde(default)]
    pub audio: Vec<DashTrack>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct PlayData {
    #[serde(default)]
    pub durl: Vec<Durl>,
    #[serde(default)]
    pub dash: Option<DashStreams>,
}

/// `getInfoByRoom` data.
#[derive(Deserialize, Debug)]
pub(crate) struct LiveRoom {
    pub room_info: LiveRoomInfo,
    pub anchor_info: LiveAnchorInfo,
}

#[derive(Deserialize, Debug)]
pub(crate) struct LiveRoomInfo {
    pub room_id: u64,
    pub uid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub area_name: String,
    #[serde(default)]
    pub parent_area_name: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub keyframe: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct LiveAnchorInfo {
    pub base_info: LiveAnchorBase,
}

#[derive(Deserialize, Debug)]
pub(crate) struct LiveAnchorBase {
    #[serde(default)]
    pub uname: String,
}

/// `songs/playing` data.
#[derive(Deserialize, Debug)]
pub(crate) struct AudioDetail {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub cover_url: String,
    #[serde(default)]
    pub duration: u64,
    pub mid: u64,
}

/// Audio `/url` data.
#[derive(Deserialize, Debug)]
pub(crate) struct AudioMedia {
    #[serde(default)]
    pub cdns: Vec<String>,
    #[serde(default)]
    pub size: u64,
}

/// `/x/v2/reply/main` data.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct ReplyData {
    #[serde(default)]
    pub top_replies: Option<Vec<Reply>>,
    #[serde(default)]
    pub replies: Option<Vec<Reply>>,
}
