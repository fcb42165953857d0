//! The content-source seam and the downloader that persists what a source yields.
//!
//! Remote fetching lives outside this crate. `JsonlPostSource` replays a profile
//! dump (one JSON post per line, optionally gzipped) so a download can be run
//! offline against previously exported data.

use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::SourceError;
use crate::metadata::{self, PostMetadata, DATE_FORMAT};

const DIR_DATE_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub created_at_utc: String,
    pub owner_username: String,
    pub text: String,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub answers: Vec<Comment>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Post {
    pub shortcode: String,
    #[serde(deserialize_with = "deserialize_date_utc")]
    pub date_utc: NaiveDateTime,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub caption_hashtags: Vec<String>,
    #[serde(default)]
    pub caption_mentions: Vec<String>,
    pub owner_username: String,
    #[serde(default)]
    pub tagged_users: Vec<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub video_view_count: Option<u64>,
    #[serde(default)]
    pub video_duration: Option<f64>,
    #[serde(default)]
    pub media: Vec<PathBuf>,
    #[serde(default)]
    pub comment_list: Vec<Comment>,
}

/// Accepts `YYYY-MM-DD HH:MM:SS` (naive UTC) or RFC 3339.
pub fn parse_date_utc(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc).naive_utc()))
}

fn deserialize_date_utc<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_date_utc(&raw).ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp '{}'", raw)))
}

pub type PostIter<'a> = Box<dyn Iterator<Item = Post> + 'a>;

/// Yields a profile's posts in the order the source provides them.
pub trait ContentSource {
    fn profile(&self) -> &str;
    fn posts(&self) -> Result<PostIter<'_>, SourceError>;
}

pub struct JsonlPostSource {
    path: PathBuf,
    profile: String,
}

impl JsonlPostSource {
    pub fn new(path: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        Self { path: path.into(), profile: profile.into() }
    }
}

impl ContentSource for JsonlPostSource {
    fn profile(&self) -> &str {
        &self.profile
    }

    fn posts(&self) -> Result<PostIter<'_>, SourceError> {
        let file = File::open(&self.path).map_err(|source| SourceError::Open { path: self.path.clone(), source })?;
        let reader: Box<dyn BufRead> = if self.path.extension().map_or(false, |ext| ext == "gz") {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let path = self.path.as_path();
        let posts = reader.lines().enumerate()
            .map_while(move |(line_num, line_result)| match line_result {
                Ok(line) => Some((line_num, line)),
                Err(e) => {
                    warn!("Error reading line {} from {}, stopping: {}", line_num + 1, path.display(), e);
                    None
                }
            })
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(move |(line_num, line)| match serde_json::from_str::<Post>(&line) {
                Ok(post) => Some(post),
                Err(e) => {
                    warn!("Error parsing post from {}:{}: {}", path.display(), line_num + 1, e);
                    None
                }
            });
        Ok(Box::new(posts))
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub target: PathBuf,
    pub download_comments: bool,
    pub save_custom_metadata: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self { target: PathBuf::from("."), download_comments: true, save_custom_metadata: true }
    }
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub posts: usize,
    pub sidecars: Vec<PathBuf>,
    pub media_files: usize,
    pub missing_media: Vec<PathBuf>,
}

pub struct Downloader<S> {
    source: S,
    options: DownloadOptions,
}

impl<S: ContentSource> Downloader<S> {
    pub fn new(source: S, options: DownloadOptions) -> Self {
        Self { source, options }
    }

    /// `<target>/<profile>_<YYYY-MM-DD_HH-MM-SS>_UTC`
    pub fn post_dir(&self, post: &Post) -> PathBuf {
        self.options.target.join(format!("{}_{}_UTC", self.source.profile(), post.date_utc.format(DIR_DATE_FORMAT)))
    }

    /// Persists up to `limit` posts in source order; `None` takes all.
    pub fn download_posts(&self, limit: Option<usize>) -> Result<DownloadReport, SourceError> {
        info!("Downloading posts of {}", self.source.profile());
        let mut report = DownloadReport::default();
        for post in self.source.posts()?.take(limit.unwrap_or(usize::MAX)) {
            self.download_post(&post, &mut report)?;
        }
        Ok(report)
    }

    /// Persists the `limit` most (or least, when `descending` is false) liked posts.
    pub fn download_posts_sorted_by_likes(
        &self,
        limit: Option<usize>,
        descending: bool,
    ) -> Result<DownloadReport, SourceError> {
        info!("Downloading posts of {} sorted by likes", self.source.profile());
        let mut posts: Vec<Post> = self.source.posts()?.collect();
        if descending {
            posts.sort_by(|a, b| b.likes.cmp(&a.likes));
        } else {
            posts.sort_by_key(|p| p.likes);
        }
        posts.truncate(limit.unwrap_or(usize::MAX));

        let mut report = DownloadReport::default();
        for post in &posts {
            self.download_post(post, &mut report)?;
        }
        Ok(report)
    }

    pub fn download_post(&self, post: &Post, report: &mut DownloadReport) -> Result<(), SourceError> {
        let dir = self.post_dir(post);
        fs::create_dir_all(&dir).map_err(|source| SourceError::Write { path: dir.clone(), source })?;
        debug!("Saving post {} to {}", post.shortcode, dir.display());

        let numbered = post.media.len() > 1;
        for (i, media) in post.media.iter().enumerate() {
            if !media.is_file() {
                warn!("Media file {} for post {} not found, skipping", media.display(), post.shortcode);
                report.missing_media.push(media.clone());
                continue;
            }
            let dest = dir.join(media_file_name(&post.shortcode, media, numbered.then_some(i + 1)));
            fs::copy(media, &dest).map_err(|source| SourceError::Write { path: dest.clone(), source })?;
            report.media_files += 1;
        }

        if self.options.download_comments {
            let path = dir.join(format!("{}_comments.json", post.shortcode));
            let bytes = metadata::to_pretty_json(&post.comment_list)
                .map_err(|source| SourceError::Serialize { shortcode: post.shortcode.clone(), source })?;
            fs::write(&path, bytes).map_err(|source| SourceError::Write { path: path.clone(), source })?;
        }

        if self.options.save_custom_metadata {
            let sidecar = metadata::write_sidecar(&PostMetadata::from(post), &dir, &post.shortcode)?;
            report.sidecars.push(sidecar);
        }

        report.posts += 1;
        Ok(())
    }
}

fn media_file_name(shortcode: &str, media: &Path, index: Option<usize>) -> String {
    let ext = media.extension().map_or_else(|| "bin".to_string(), |e| e.to_string_lossy().into_owned());
    match index {
        Some(n) => format!("{}_{}.{}", shortcode, n, ext),
        None => format!("{}.{}", shortcode, ext),
    }
}
