use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use post_metadata_aggregator::source::PostIter;
use post_metadata_aggregator::{
    aggregate, ContentSource, DownloadOptions, Downloader, JsonlPostSource, Post, PostMetadata, SourceError,
};
use serde_json::json;
use tempfile::TempDir;

struct MemorySource {
    profile: String,
    posts: Vec<Post>,
}

impl ContentSource for MemorySource {
    fn profile(&self) -> &str {
        &self.profile
    }

    fn posts(&self) -> Result<PostIter<'_>, SourceError> {
        Ok(Box::new(self.posts.clone().into_iter()))
    }
}

fn post(shortcode: &str, date: &str, likes: u64) -> Post {
    serde_json::from_value(json!({
        "shortcode": shortcode,
        "date_utc": date,
        "caption": format!("post {}", shortcode),
        "caption_hashtags": ["cat"],
        "owner_username": "someone",
        "likes": likes,
        "comments": 1,
        "comment_list": [{"id": "1", "created_at_utc": date, "owner_username": "fan", "text": "nice"}],
    }))
    .unwrap()
}

fn memory_source() -> MemorySource {
    MemorySource {
        profile: "someone".to_string(),
        posts: vec![
            post("A", "2020-01-01 00:00:00", 5),
            post("B", "2020-01-02 00:00:00", 50),
            post("C", "2020-01-03 00:00:00", 20),
        ],
    }
}

fn options(target: &Path) -> DownloadOptions {
    DownloadOptions { target: target.to_path_buf(), ..DownloadOptions::default() }
}

#[test]
fn download_writes_sidecar_and_comments_per_post() {
    let dir = TempDir::new().unwrap();
    let downloader = Downloader::new(memory_source(), options(dir.path()));

    let report = downloader.download_posts(None).unwrap();
    assert_eq!(report.posts, 3);
    assert_eq!(report.sidecars.len(), 3);

    let post_dir = dir.path().join("someone_2020-01-01_00-00-00_UTC");
    let sidecar_text = fs::read_to_string(post_dir.join("custom_metadata_A.json")).unwrap();
    let sidecar: PostMetadata = serde_json::from_str(&sidecar_text).unwrap();
    assert_eq!(sidecar.date_utc, "2020-01-01 00:00:00");
    assert_eq!(sidecar.caption.as_deref(), Some("post A"));
    assert_eq!(sidecar.likes_count, 5);
    assert_eq!(sidecar.video_duration, 0.0);

    let comments_text = fs::read_to_string(post_dir.join("A_comments.json")).unwrap();
    let comments: serde_json::Value = serde_json::from_str(&comments_text).unwrap();
    assert_eq!(comments[0]["text"], "nice");
}

#[test]
fn limit_takes_exactly_that_many_posts() {
    let dir = TempDir::new().unwrap();
    let report = Downloader::new(memory_source(), options(dir.path())).download_posts(Some(2)).unwrap();
    assert_eq!(report.posts, 2);
    assert!(!dir.path().join("someone_2020-01-03_00-00-00_UTC").exists());
}

#[test]
fn sorted_by_likes_picks_most_liked_first() {
    let dir = TempDir::new().unwrap();
    let downloader = Downloader::new(memory_source(), options(dir.path()));

    let report = downloader.download_posts_sorted_by_likes(Some(2), true).unwrap();
    let names: Vec<String> = report
        .sidecars
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["custom_metadata_B.json", "custom_metadata_C.json"]);

    let dir = TempDir::new().unwrap();
    let report = Downloader::new(memory_source(), options(dir.path()))
        .download_posts_sorted_by_likes(Some(1), false)
        .unwrap();
    assert!(report.sidecars[0].ends_with("custom_metadata_A.json"));
}

#[test]
fn disabled_outputs_are_not_written() {
    let dir = TempDir::new().unwrap();
    let opts = DownloadOptions {
        target: dir.path().to_path_buf(),
        download_comments: false,
        save_custom_metadata: false,
    };
    let report = Downloader::new(memory_source(), opts).download_posts(Some(1)).unwrap();
    assert_eq!(report.posts, 1);
    assert!(report.sidecars.is_empty());
    let post_dir = dir.path().join("someone_2020-01-01_00-00-00_UTC");
    assert_eq!(fs::read_dir(post_dir).unwrap().count(), 0);
}

#[test]
fn media_is_copied_and_missing_media_reported() {
    let media_dir = TempDir::new().unwrap();
    let photo = media_dir.path().join("raw.jpg");
    fs::write(&photo, b"jpeg").unwrap();
    let missing = media_dir.path().join("gone.mp4");

    let mut p = post("M", "2021-05-05 10:00:00", 1);
    p.media = vec![photo, missing.clone()];
    let source = MemorySource { profile: "someone".to_string(), posts: vec![p] };

    let dir = TempDir::new().unwrap();
    let report = Downloader::new(source, options(dir.path())).download_posts(None).unwrap();
    assert_eq!(report.media_files, 1);
    assert_eq!(report.missing_media, vec![missing]);
    let copied = dir.path().join("someone_2021-05-05_10-00-00_UTC").join("M_1.jpg");
    assert_eq!(fs::read(copied).unwrap(), b"jpeg");
}

#[test]
fn gzipped_dump_is_replayed_and_bad_lines_skipped() {
    let dir = TempDir::new().unwrap();
    let dump = dir.path().join("posts.jsonl.gz");
    let mut encoder = GzEncoder::new(fs::File::create(&dump).unwrap(), Compression::default());
    let video = json!({
        "shortcode": "X1",
        "date_utc": "2019-03-04T05:06:07Z",
        "owner_username": "someone",
        "is_video": true,
        "video_view_count": 10,
        "video_duration": 4.5,
    });
    writeln!(encoder, "{}", video).unwrap();
    writeln!(encoder).unwrap();
    writeln!(encoder, "{{broken").unwrap();
    let photo = json!({"shortcode": "X2", "date_utc": "2019-03-05 00:00:00", "owner_username": "someone"});
    writeln!(encoder, "{}", photo).unwrap();
    encoder.finish().unwrap();

    let source = JsonlPostSource::new(&dump, "someone");
    let shortcodes: Vec<String> = source.posts().unwrap().map(|p| p.shortcode).collect();
    assert_eq!(shortcodes, ["X1", "X2"]);

    let target = dir.path().join("downloads");
    let report = Downloader::new(source, options(&target)).download_posts(None).unwrap();
    assert_eq!(report.posts, 2);

    let sidecar = target.join("someone_2019-03-04_05-06-07_UTC").join("custom_metadata_X1.json");
    let meta: PostMetadata = serde_json::from_str(&fs::read_to_string(sidecar).unwrap()).unwrap();
    assert_eq!(meta.video_view_count, 10);
    assert_eq!(meta.video_duration, 4.5);
}

#[test]
fn missing_dump_is_an_error() {
    let dir = TempDir::new().unwrap();
    let source = JsonlPostSource::new(dir.path().join("absent.jsonl"), "someone");
    assert!(matches!(source.posts(), Err(SourceError::Open { .. })));
}

#[test]
fn downloaded_profile_aggregates_into_wire_contract_columns() {
    let dir = TempDir::new().unwrap();
    Downloader::new(memory_source(), options(dir.path())).download_posts(None).unwrap();
    let out = dir.path().join("metadata.csv");

    let report = aggregate(dir.path(), &out).unwrap();
    assert_eq!(report.rows_written, 3);
    assert_eq!(report.columns, post_metadata_aggregator::metadata::SIDECAR_KEYS);

    let mut reader = csv::Reader::from_path(&out).unwrap();
    let captions: Vec<String> = reader.records().map(|r| r.unwrap()[2].to_string()).collect();
    assert_eq!(captions, ["post A", "post B", "post C"]);
}
