use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SourceError;
use crate::source::Post;

pub const SIDECAR_PREFIX: &str = "custom_metadata";
pub const SIDECAR_EXTENSION: &str = "json";
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column names of a sidecar, in the order they are written.
pub const SIDECAR_KEYS: [&str; 11] = [
    "Date UTC", "Caption hashtags", "Caption", "Caption mentions", "Owner username", "Tagged users",
    "Is pinned", "Likes count", "Video view count", "Comments count", "Video duration",
];

/// Per-post metadata as persisted in a `custom_metadata_<shortcode>.json` sidecar.
/// Field order is the on-disk key order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PostMetadata {
    #[serde(rename = "Date UTC")]
    pub date_utc: String,
    #[serde(rename = "Caption hashtags", default)]
    pub caption_hashtags: Vec<String>,
    #[serde(rename = "Caption")]
    pub caption: Option<String>,
    #[serde(rename = "Caption mentions", default)]
    pub caption_mentions: Vec<String>,
    #[serde(rename = "Owner username")]
    pub owner_username: String,
    #[serde(rename = "Tagged users", default)]
    pub tagged_users: Vec<String>,
    #[serde(rename = "Is pinned", default)]
    pub is_pinned: bool,
    #[serde(rename = "Likes count", default)]
    pub likes_count: u64,
    #[serde(rename = "Video view count", default)]
    pub video_view_count: u64,
    #[serde(rename = "Comments count", default)]
    pub comments_count: u64,
    #[serde(rename = "Video duration", default)]
    pub video_duration: f64,
}

impl From<&Post> for PostMetadata {
    fn from(post: &Post) -> Self {
        let (video_view_count, video_duration) = if post.is_video {
            (post.video_view_count.unwrap_or(0), post.video_duration.unwrap_or(0.0).max(0.0))
        } else {
            (0, 0.0)
        };
        Self {
            date_utc: post.date_utc.format(DATE_FORMAT).to_string(),
            caption_hashtags: post.caption_hashtags.clone(),
            caption: post.caption.clone(),
            caption_mentions: post.caption_mentions.clone(),
            owner_username: post.owner_username.clone(),
            tagged_users: post.tagged_users.clone(),
            is_pinned: post.is_pinned,
            likes_count: post.likes,
            video_view_count,
            comments_count: post.comments,
            video_duration,
        }
    }
}

pub fn sidecar_file_name(shortcode: &str) -> String {
    format!("{}_{}.{}", SIDECAR_PREFIX, shortcode, SIDECAR_EXTENSION)
}

/// Pretty JSON with 4-space indentation; non-ASCII is written as is.
pub fn to_pretty_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Writes the sidecar for `shortcode` into `target_dir`, creating the directory if needed.
pub fn write_sidecar(metadata: &PostMetadata, target_dir: &Path, shortcode: &str) -> Result<PathBuf, SourceError> {
    fs::create_dir_all(target_dir).map_err(|source| SourceError::Write { path: target_dir.to_path_buf(), source })?;
    let path = target_dir.join(sidecar_file_name(shortcode));
    let bytes = to_pretty_json(metadata)
        .map_err(|source| SourceError::Serialize { shortcode: shortcode.to_string(), source })?;
    fs::write(&path, bytes).map_err(|source| SourceError::Write { path: path.clone(), source })?;
    Ok(path)
}
